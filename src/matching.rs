//! Gated assignment of detections to tracks.
//!
//! The feasible pairs (cost under the gate) form a bipartite graph; each
//! connected component is solved independently with a classical Hungarian
//! assignment. Splitting by component turns the worst-case cubic solve into
//! a sum of small ones when tracks cluster spatially, and a node with no
//! feasible edge falls out as a singleton without touching the solver.

use std::collections::VecDeque;

use nalgebra::DMatrix;

use crate::distances::{cost_matrix, DistanceType, GATE_BOUND};
use crate::tracked_object::TrackedObject;
use crate::Result;

/// Costs closer to zero than this are treated as zero by the Hungarian
/// potentials.
const ZERO_EPS: f64 = 1e-10;

/// Outcome of one matching pass.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Accepted (track index, detection index) pairs.
    pub assignments: Vec<(usize, usize)>,
    /// Track indices left without a detection.
    pub unassigned_tracks: Vec<usize>,
    /// Detection indices left without a track.
    pub unassigned_detections: Vec<usize>,
}

/// Match detections to tracks under a gated cost threshold.
///
/// A pair is only ever accepted when its cost is strictly under
/// `threshold`; everything else comes back unassigned.
pub fn match_tracks(
    tracks: &[TrackedObject],
    detections: &[TrackedObject],
    distance_type: DistanceType,
    threshold: f64,
) -> Result<MatchResult> {
    let mut result = MatchResult::default();

    if tracks.is_empty() || detections.is_empty() {
        result.unassigned_tracks = (0..tracks.len()).collect();
        result.unassigned_detections = (0..detections.len()).collect();
        return Ok(result);
    }

    let gate = threshold.min(GATE_BOUND);
    let costs = cost_matrix(tracks, detections, distance_type, gate)?;

    for component in connected_components(&costs, gate) {
        if component.tracks.is_empty() {
            result.unassigned_detections.extend(component.detections);
            continue;
        }
        if component.detections.is_empty() {
            result.unassigned_tracks.extend(component.tracks);
            continue;
        }

        let sub = DMatrix::from_fn(component.tracks.len(), component.detections.len(), |r, c| {
            costs[(component.tracks[r], component.detections[c])]
        });

        let row_match = hungarian(&sub);
        let mut matched_cols = vec![false; component.detections.len()];
        for (local_row, &matched) in row_match.iter().enumerate() {
            let track_idx = component.tracks[local_row];
            match matched {
                Some(local_col) if sub[(local_row, local_col)] < gate => {
                    result
                        .assignments
                        .push((track_idx, component.detections[local_col]));
                    matched_cols[local_col] = true;
                }
                _ => result.unassigned_tracks.push(track_idx),
            }
        }
        for (local_col, &used) in matched_cols.iter().enumerate() {
            if !used {
                result
                    .unassigned_detections
                    .push(component.detections[local_col]);
            }
        }
    }

    result.assignments.sort_unstable();
    result.unassigned_tracks.sort_unstable();
    result.unassigned_detections.sort_unstable();
    Ok(result)
}

#[derive(Debug, Default)]
struct Component {
    tracks: Vec<usize>,
    detections: Vec<usize>,
}

// Breadth-first sweep over the union adjacency: track nodes first, then
// detection nodes shifted by the track count.
fn connected_components(costs: &DMatrix<f64>, gate: f64) -> Vec<Component> {
    let (n_tracks, n_detections) = costs.shape();
    let total = n_tracks + n_detections;

    let mut graph: Vec<Vec<usize>> = vec![Vec::new(); total];
    for i in 0..n_tracks {
        for j in 0..n_detections {
            if costs[(i, j)] < gate {
                graph[i].push(n_tracks + j);
                graph[n_tracks + j].push(i);
            }
        }
    }

    let mut visited = vec![false; total];
    let mut components = Vec::new();

    for start in 0..total {
        if visited[start] {
            continue;
        }
        visited[start] = true;

        let mut component = Component::default();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            if node < n_tracks {
                component.tracks.push(node);
            } else {
                component.detections.push(node - n_tracks);
            }
            for &neighbor in &graph[node] {
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    queue.push_back(neighbor);
                }
            }
        }
        components.push(component);
    }

    components
}

/// Minimum-cost assignment (Kuhn-Munkres) on a rectangular matrix.
///
/// Returns, for every row, the column it was assigned to. The matrix is
/// padded to square with zeros; matches landing in the padding come back as
/// `None`.
fn hungarian(costs: &DMatrix<f64>) -> Vec<Option<usize>> {
    let (rows, cols) = costs.shape();
    if rows == 0 {
        return Vec::new();
    }
    if cols == 0 {
        return vec![None; rows];
    }

    let n = rows.max(cols);
    let mut cost = DMatrix::zeros(n, n);
    cost.view_mut((0, 0), (rows, cols)).copy_from(costs);

    // Reduce rows then columns so every row and column holds a zero.
    for i in 0..n {
        let row_min = cost.row(i).min();
        for j in 0..n {
            cost[(i, j)] -= row_min;
        }
    }
    for j in 0..n {
        let col_min = cost.column(j).min();
        for i in 0..n {
            cost[(i, j)] -= col_min;
        }
    }

    let mut row_match: Vec<Option<usize>> = vec![None; n];
    let mut col_match: Vec<Option<usize>> = vec![None; n];

    // Greedy seed over the initial zeros.
    for i in 0..n {
        for j in 0..n {
            if cost[(i, j)].abs() < ZERO_EPS && row_match[i].is_none() && col_match[j].is_none() {
                row_match[i] = Some(j);
                col_match[j] = Some(i);
            }
        }
    }

    loop {
        let unmatched: Vec<usize> = (0..n).filter(|&i| row_match[i].is_none()).collect();
        if unmatched.is_empty() {
            break;
        }

        // Search for an augmenting path of zero edges from any unmatched row.
        let mut augmented = false;
        for &start in &unmatched {
            let mut parent_col: Vec<Option<usize>> = vec![None; n];
            let mut visited_col = vec![false; n];
            let mut queue = VecDeque::from([start]);
            let mut end_col = None;

            'bfs: while let Some(row) = queue.pop_front() {
                for col in 0..n {
                    if !visited_col[col] && cost[(row, col)].abs() < ZERO_EPS {
                        visited_col[col] = true;
                        parent_col[col] = Some(row);
                        match col_match[col] {
                            None => {
                                end_col = Some(col);
                                break 'bfs;
                            }
                            Some(next_row) => queue.push_back(next_row),
                        }
                    }
                }
            }

            if let Some(mut col) = end_col {
                // Flip the matching along the path.
                loop {
                    let row = parent_col[col].expect("path endpoint has a parent");
                    let previous = row_match[row];
                    row_match[row] = Some(col);
                    col_match[col] = Some(row);
                    match previous {
                        Some(previous_col) => col = previous_col,
                        None => break,
                    }
                }
                augmented = true;
                break;
            }
        }

        if !augmented {
            // No augmenting path: adjust the potentials to create new zeros.
            // Rows reachable from unmatched rows through alternating paths
            // are covered, along with the columns they reach.
            let mut row_covered = vec![false; n];
            let mut col_covered = vec![false; n];
            for &start in &unmatched {
                let mut stack = vec![start];
                while let Some(row) = stack.pop() {
                    if row_covered[row] {
                        continue;
                    }
                    row_covered[row] = true;
                    for col in 0..n {
                        if cost[(row, col)].abs() < ZERO_EPS && !col_covered[col] {
                            col_covered[col] = true;
                            if let Some(matched_row) = col_match[col] {
                                stack.push(matched_row);
                            }
                        }
                    }
                }
            }

            let mut delta = f64::INFINITY;
            for i in 0..n {
                if !row_covered[i] {
                    continue;
                }
                for j in 0..n {
                    if !col_covered[j] {
                        delta = delta.min(cost[(i, j)]);
                    }
                }
            }
            if !delta.is_finite() || delta <= 0.0 {
                break;
            }

            for i in 0..n {
                for j in 0..n {
                    if row_covered[i] && !col_covered[j] {
                        cost[(i, j)] -= delta;
                    } else if !row_covered[i] && col_covered[j] {
                        cost[(i, j)] += delta;
                    }
                }
            }
        }
    }

    row_match.truncate(rows);
    row_match.iter().map(|&m| m.filter(|&c| c < cols)).collect()
}
