//! Track-to-detection distance functions and the gated cost matrix.

use crate::classification;
use crate::tracked_object::TrackedObject;
use crate::Result;
use nalgebra::DMatrix;

/// Cost standing in for infeasible pairs. Finite so the Hungarian
/// potentials stay numerically stable, large enough never to be preferred.
pub const GATE_BOUND: f64 = 100.0;

/// Which distance the associator runs on.
///
/// The threshold supplied alongside is in the units of the chosen metric:
/// metres for the Euclidean family, standard deviations for the Mahalanobis
/// family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DistanceType {
    /// Straight-line distance between positions.
    Euclidean,
    /// Innovation residual under the track's predicted measurement
    /// covariance.
    Mahalanobis,
    /// Euclidean, inflated by classification disagreement.
    #[default]
    MultiClassEuclidean,
    /// Mahalanobis, inflated by classification disagreement.
    MceMahalanobis,
}

/// Distance between a track state and a detection under `distance_type`.
pub fn distance(
    distance_type: DistanceType,
    track: &TrackedObject,
    detection: &TrackedObject,
) -> Result<f64> {
    match distance_type {
        DistanceType::Euclidean => Ok(euclidean(track, detection)),
        DistanceType::Mahalanobis => Ok(mahalanobis(track, detection)),
        DistanceType::MultiClassEuclidean => {
            let scale = 1.0 + classification::distance(&track.classification, &detection.classification)?;
            Ok(euclidean(track, detection) * scale)
        }
        DistanceType::MceMahalanobis => {
            let scale = 1.0 + classification::distance(&track.classification, &detection.classification)?;
            Ok(mahalanobis(track, detection) * scale)
        }
    }
}

/// Gated cost matrix, tracks along rows and detections along columns.
///
/// Cells at or above `threshold` are marked infeasible with [`GATE_BOUND`].
pub fn cost_matrix(
    tracks: &[TrackedObject],
    detections: &[TrackedObject],
    distance_type: DistanceType,
    threshold: f64,
) -> Result<DMatrix<f64>> {
    let mut costs = DMatrix::from_element(tracks.len(), detections.len(), GATE_BOUND);
    for (i, track) in tracks.iter().enumerate() {
        for (j, detection) in detections.iter().enumerate() {
            let d = distance(distance_type, track, detection)?;
            if d < threshold {
                costs[(i, j)] = d;
            }
        }
    }
    Ok(costs)
}

fn euclidean(track: &TrackedObject, detection: &TrackedObject) -> f64 {
    (track.position() - detection.position()).norm()
}

fn mahalanobis(track: &TrackedObject, detection: &TrackedObject) -> f64 {
    let residual = detection.measurement_vector() - &track.predicted_measurement_mean;
    let d_sq = (residual.transpose() * &track.predicted_measurement_cov_inv * &residual)[(0, 0)];
    d_sq.max(0.0).sqrt()
}
