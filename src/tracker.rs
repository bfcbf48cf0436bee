//! Per-stream tracking pipeline: one `track` call per detection frame.

use tracing::debug;

use crate::distances::DistanceType;
use crate::matching::match_tracks;
use crate::track_manager::{TrackManager, TrackManagerConfig};
use crate::tracked_object::TrackedObject;
use crate::{Error, Result};

/// Default gate threshold, in the units of the configured distance.
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 5.0;

/// Default top-1 classification score separating high- from low-confidence
/// detections.
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.5;

/// Multi-object tracker for one camera stream.
///
/// Synchronous and strictly causal: each `track` call runs to completion
/// before the next frame is admitted, and only past frames inform the
/// estimates.
pub struct MultipleObjectTracker {
    manager: TrackManager,
    distance_type: DistanceType,
    distance_threshold: f64,
    last_timestamp: Option<f64>,
}

impl MultipleObjectTracker {
    /// Create a tracker with the default association distance
    /// (multi-class Euclidean, gate 5 m).
    pub fn new(config: TrackManagerConfig) -> Result<Self> {
        Self::with_distance(config, DistanceType::default(), DEFAULT_DISTANCE_THRESHOLD)
    }

    /// Create a tracker with an explicit association distance.
    pub fn with_distance(
        config: TrackManagerConfig,
        distance_type: DistanceType,
        distance_threshold: f64,
    ) -> Result<Self> {
        if distance_threshold <= 0.0 {
            return Err(Error::InvalidConfig(
                "distance threshold must be positive".to_string(),
            ));
        }
        Ok(Self {
            manager: TrackManager::new(config)?,
            distance_type,
            distance_threshold,
            last_timestamp: None,
        })
    }

    /// Ingest one frame of detections using the configured distance.
    ///
    /// `timestamp` is seconds on the caller's monotonic clock;
    /// `score_threshold` splits detections into high and low confidence by
    /// their top-1 classification score.
    pub fn track(
        &mut self,
        objects: Vec<TrackedObject>,
        timestamp: f64,
        score_threshold: f64,
    ) -> Result<()> {
        self.track_with(
            objects,
            timestamp,
            self.distance_type,
            self.distance_threshold,
            score_threshold,
        )
    }

    /// Ingest one frame of detections with per-call distance settings.
    ///
    /// Association runs in four phases, each consuming what the previous
    /// ones left unclaimed: reliable tracks bid on high-confidence
    /// detections first, then on low-confidence ones, then unreliable
    /// tracks and finally the suspended pool see the remaining
    /// high-confidence detections. Known good tracks therefore have first
    /// claim, and the suspended pool is only consulted for revival.
    /// High-confidence detections that survive every phase become new
    /// tracks; low-confidence leftovers are dropped.
    pub fn track_with(
        &mut self,
        objects: Vec<TrackedObject>,
        timestamp: f64,
        distance_type: DistanceType,
        distance_threshold: f64,
        score_threshold: f64,
    ) -> Result<()> {
        if distance_threshold <= 0.0 {
            return Err(Error::InvalidArgument(
                "distance threshold must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&score_threshold) {
            return Err(Error::InvalidArgument(format!(
                "score threshold {} outside [0, 1]",
                score_threshold
            )));
        }
        // Validate the whole frame up front: on failure the manager state
        // is untouched.
        let expected_classes = self
            .manager
            .classification_len()
            .or_else(|| objects.first().map(|object| object.classification.len()));
        for object in &objects {
            object.validate()?;
            if let Some(expected) = expected_classes {
                if object.classification.len() != expected {
                    return Err(Error::InvalidArgument(format!(
                        "classification has {} classes, this run uses {}",
                        object.classification.len(),
                        expected
                    )));
                }
            }
        }

        if objects.is_empty() {
            self.manager.predict_to(timestamp);
            self.manager.correct();
            self.last_timestamp = Some(timestamp);
            return Ok(());
        }

        let (mut objects, low_score_objects) = split_by_score(objects, score_threshold);

        let delta_t = self
            .last_timestamp
            .map_or(0.0, |last| (timestamp - last).max(0.0));
        self.manager.predict(delta_t);

        // Phase A: reliable tracks bid on high-confidence detections.
        let tracks = self.manager.get_reliable_tracks();
        let result = match_tracks(&tracks, &objects, distance_type, distance_threshold)?;
        for &(track_idx, object_idx) in &result.assignments {
            self.manager
                .set_measurement(tracks[track_idx].id, objects[object_idx].clone())?;
        }

        // Phase B: reliable tracks left over bid on low-confidence
        // detections.
        let remaining_tracks: Vec<TrackedObject> = result
            .unassigned_tracks
            .iter()
            .map(|&i| tracks[i].clone())
            .collect();
        let low_result = match_tracks(
            &remaining_tracks,
            &low_score_objects,
            distance_type,
            distance_threshold,
        )?;
        for &(track_idx, object_idx) in &low_result.assignments {
            self.manager.set_measurement(
                remaining_tracks[track_idx].id,
                low_score_objects[object_idx].clone(),
            )?;
        }

        // Phase C: unreliable tracks see the high-confidence detections
        // nobody claimed yet.
        objects = filter_by_index(objects, &result.unassigned_detections);
        let unreliable_tracks = self.manager.get_unreliable_tracks();
        let result = match_tracks(&unreliable_tracks, &objects, distance_type, distance_threshold)?;
        for &(track_idx, object_idx) in &result.assignments {
            self.manager
                .set_measurement(unreliable_tracks[track_idx].id, objects[object_idx].clone())?;
        }

        // Phase D: what is still unclaimed is offered to the suspended
        // pool for revival.
        objects = filter_by_index(objects, &result.unassigned_detections);
        let suspended_tracks = self.manager.get_suspended_tracks();
        let result = match_tracks(&suspended_tracks, &objects, distance_type, distance_threshold)?;
        for &(track_idx, object_idx) in &result.assignments {
            self.manager
                .set_measurement(suspended_tracks[track_idx].id, objects[object_idx].clone())?;
        }

        self.manager.correct();

        // Birth: every high-confidence detection that survived all four
        // phases starts a track of its own.
        for &object_idx in &result.unassigned_detections {
            let id = self
                .manager
                .create_track(objects[object_idx].clone(), timestamp)?;
            debug!(track_id = id, "track born from unassigned detection");
        }

        self.last_timestamp = Some(timestamp);
        Ok(())
    }

    /// Tracks corrected often enough to expose downstream.
    pub fn get_reliable_tracks(&self) -> Vec<TrackedObject> {
        self.manager.get_reliable_tracks()
    }

    /// All tracks, active and suspended.
    pub fn get_tracks(&self) -> Vec<TrackedObject> {
        self.manager.get_tracks()
    }

    /// Timestamp of the last ingested frame, seconds.
    pub fn timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Recompute the frame-based lifecycle parameters for a camera frame
    /// rate.
    pub fn update_tracker_params(&mut self, frame_rate: u32) -> Result<()> {
        if frame_rate == 0 {
            return Err(Error::InvalidConfig(
                "frame rate must be positive".to_string(),
            ));
        }
        self.manager.update_frame_rate(frame_rate);
        Ok(())
    }

    /// The lifecycle manager behind this tracker.
    pub fn manager(&self) -> &TrackManager {
        &self.manager
    }
}

// Partition detections by top-1 classification score, preserving order.
fn split_by_score(
    objects: Vec<TrackedObject>,
    score_threshold: f64,
) -> (Vec<TrackedObject>, Vec<TrackedObject>) {
    objects
        .into_iter()
        .partition(|object| object.top_score() >= score_threshold)
}

// Keep only the elements at `indices`, in index order.
fn filter_by_index(objects: Vec<TrackedObject>, indices: &[usize]) -> Vec<TrackedObject> {
    let mut keep = vec![false; objects.len()];
    for &i in indices {
        keep[i] = true;
    }
    objects
        .into_iter()
        .zip(keep)
        .filter_map(|(object, keep)| keep.then_some(object))
        .collect()
}
