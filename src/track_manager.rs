//! Track lifecycle: birth, aging, suspension, reactivation, deletion.
//!
//! The manager exclusively owns every estimator. Exposed tracks are
//! returned by value, so callers never hold references into manager state.

use std::collections::BTreeMap;

use nalgebra::DMatrix;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tracing::{debug, info};

use crate::filter::MultiModelEstimator;
use crate::motion::{MotionModel, MEASUREMENT_DIM, STATE_DIM};
use crate::tracked_object::{TrackId, TrackedObject, INVALID_ID};
use crate::{Error, Result};

/// Tracker configuration.
///
/// The lifecycle knobs are time-based; [`update_frame_rate`] converts them
/// to the frame counts the manager actually runs on.
///
/// [`update_frame_rate`]: TrackManagerConfig::update_frame_rate
#[derive(Debug, Clone)]
pub struct TrackManagerConfig {
    /// Grace period before a track may become reliable, seconds.
    pub max_unreliable_time: f64,
    /// Missed-frame budget for dynamic tracks, seconds.
    pub non_measurement_time_dynamic: f64,
    /// Missed-frame budget for static tracks before suspension, seconds.
    pub non_measurement_time_static: f64,

    /// Corrected frames required before a track is reliable.
    pub max_unreliable_frames: u32,
    /// Missed frames tolerated by a dynamic track before deletion.
    pub non_measurement_frames_dynamic: u32,
    /// Missed frames tolerated by a static track before suspension.
    pub non_measurement_frames_static: u32,

    /// Head start granted on reactivation: a reactivated track resumes
    /// this many corrected frames short of reliable.
    pub reactivation_frames: u32,

    /// Planar speed separating static from dynamic tracks, m/s.
    pub static_speed_threshold: f64,

    /// Process noise covariance Q, 12x12.
    pub default_process_noise: DMatrix<f64>,
    /// Measurement noise covariance R, 7x7.
    pub default_measurement_noise: DMatrix<f64>,
    /// Initial state covariance P0, 12x12.
    pub init_state_covariance: DMatrix<f64>,

    /// Motion models each track runs, in priority order.
    pub motion_models: Vec<MotionModel>,

    /// When set, detection ids are ignored and the manager assigns
    /// monotonically increasing ids at birth.
    pub auto_id_generation: bool,
}

impl Default for TrackManagerConfig {
    fn default() -> Self {
        Self {
            max_unreliable_time: 0.3333,
            non_measurement_time_dynamic: 0.2666,
            non_measurement_time_static: 0.5333,
            max_unreliable_frames: 3,
            non_measurement_frames_dynamic: 8,
            non_measurement_frames_static: 16,
            reactivation_frames: 1,
            static_speed_threshold: 0.2,
            default_process_noise: DMatrix::identity(STATE_DIM, STATE_DIM) * 1e-4,
            default_measurement_noise: DMatrix::identity(MEASUREMENT_DIM, MEASUREMENT_DIM) * 2e-1,
            init_state_covariance: DMatrix::identity(STATE_DIM, STATE_DIM),
            motion_models: vec![
                MotionModel::ConstantVelocity,
                MotionModel::ConstantAcceleration,
                MotionModel::ConstantTurnRate,
            ],
            auto_id_generation: true,
        }
    }
}

impl TrackManagerConfig {
    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.motion_models.is_empty() {
            return Err(Error::InvalidConfig("empty motion-model set".to_string()));
        }
        if self.max_unreliable_time <= 0.0
            || self.non_measurement_time_dynamic <= 0.0
            || self.non_measurement_time_static <= 0.0
        {
            return Err(Error::InvalidConfig(
                "time-based parameters must be positive".to_string(),
            ));
        }
        if self.static_speed_threshold < 0.0 {
            return Err(Error::InvalidConfig(
                "static speed threshold must be non-negative".to_string(),
            ));
        }
        if self.default_process_noise.shape() != (STATE_DIM, STATE_DIM)
            || self.init_state_covariance.shape() != (STATE_DIM, STATE_DIM)
        {
            return Err(Error::InvalidConfig(format!(
                "state covariances must be {0}x{0}",
                STATE_DIM
            )));
        }
        if self.default_measurement_noise.shape() != (MEASUREMENT_DIM, MEASUREMENT_DIM) {
            return Err(Error::InvalidConfig(format!(
                "measurement covariance must be {0}x{0}",
                MEASUREMENT_DIM
            )));
        }
        Ok(())
    }

    /// Recompute the frame-based parameters for a camera frame rate.
    pub fn update_frame_rate(&mut self, frame_rate: u32) {
        self.max_unreliable_frames = (frame_rate as f64 * self.max_unreliable_time).ceil() as u32;
        self.non_measurement_frames_dynamic =
            (frame_rate as f64 * self.non_measurement_time_dynamic).ceil() as u32;
        self.non_measurement_frames_static =
            (frame_rate as f64 * self.non_measurement_time_static).ceil() as u32;
        info!(
            frame_rate,
            max_unreliable_frames = self.max_unreliable_frames,
            non_measurement_frames_dynamic = self.non_measurement_frames_dynamic,
            non_measurement_frames_static = self.non_measurement_frames_static,
            "updated frame-based tracker parameters"
        );
    }
}

/// Owns all estimators and drives the per-track lifecycle.
#[derive(Debug)]
pub struct TrackManager {
    config: TrackManagerConfig,
    active: BTreeMap<TrackId, MultiModelEstimator>,
    suspended: BTreeMap<TrackId, MultiModelEstimator>,
    measurements: BTreeMap<TrackId, TrackedObject>,
    non_measurement_frames: BTreeMap<TrackId, u32>,
    tracked_frames: BTreeMap<TrackId, u32>,
    next_id: TrackId,
}

impl TrackManager {
    /// Create a manager with a validated configuration.
    pub fn new(config: TrackManagerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            active: BTreeMap::new(),
            suspended: BTreeMap::new(),
            measurements: BTreeMap::new(),
            non_measurement_frames: BTreeMap::new(),
            tracked_frames: BTreeMap::new(),
            next_id: 0,
        })
    }

    /// Current configuration.
    pub fn config(&self) -> &TrackManagerConfig {
        &self.config
    }

    /// Birth a track from a detection.
    ///
    /// With `auto_id_generation` (or a detection carrying `INVALID_ID`) the
    /// manager assigns the next id.
    pub fn create_track(&mut self, mut object: TrackedObject, timestamp: f64) -> Result<TrackId> {
        if self.config.auto_id_generation || object.id == INVALID_ID {
            self.next_id += 1;
            object.id = self.next_id;
        }

        let estimator = MultiModelEstimator::new(
            &object,
            timestamp,
            &self.config.default_process_noise,
            &self.config.default_measurement_noise,
            &self.config.init_state_covariance,
            &self.config.motion_models,
        )?;

        let id = object.id;
        self.active.insert(id, estimator);
        self.non_measurement_frames.insert(id, 0);
        self.tracked_frames.insert(id, 0);
        debug!(track_id = id, "track created");
        Ok(id)
    }

    /// Remove a track entirely, whether active or suspended.
    pub fn delete_track(&mut self, id: TrackId) {
        if self.is_suspended(id) {
            let _ = self.reactivate_track(id);
        }
        self.active.remove(&id);
        self.non_measurement_frames.remove(&id);
        self.tracked_frames.remove(&id);
        debug!(track_id = id, "track deleted");
    }

    /// Freeze an active track for possible later reactivation.
    pub fn suspend_track(&mut self, id: TrackId) -> Result<()> {
        let estimator = self.active.remove(&id).ok_or(Error::UnknownTrack(id))?;
        self.suspended.insert(id, estimator);
        self.non_measurement_frames.remove(&id);
        debug!(track_id = id, "track suspended");
        Ok(())
    }

    /// Thaw a suspended track back into the active set.
    ///
    /// The track resumes `reactivation_frames` short of reliable, so one
    /// bad match cannot immediately re-demote it.
    pub fn reactivate_track(&mut self, id: TrackId) -> Result<()> {
        let estimator = self.suspended.remove(&id).ok_or(Error::UnknownTrack(id))?;
        self.active.insert(id, estimator);
        self.non_measurement_frames.insert(id, 0);
        self.tracked_frames.insert(
            id,
            self.config
                .max_unreliable_frames
                .saturating_sub(self.config.reactivation_frames),
        );
        debug!(track_id = id, "track reactivated");
        Ok(())
    }

    /// Advance every active estimator by `delta_t` seconds and open a new
    /// measurement window.
    pub fn predict(&mut self, delta_t: f64) {
        let mut estimators: Vec<&mut MultiModelEstimator> = self.active.values_mut().collect();

        #[cfg(feature = "rayon")]
        estimators
            .par_iter_mut()
            .for_each(|estimator| estimator.predict(delta_t));
        #[cfg(not(feature = "rayon"))]
        for estimator in estimators.iter_mut() {
            estimator.predict(delta_t);
        }

        self.measurements.clear();
    }

    /// Advance every active estimator to `timestamp` (seconds) using each
    /// track's own last prediction time.
    pub fn predict_to(&mut self, timestamp: f64) {
        let mut estimators: Vec<&mut MultiModelEstimator> = self.active.values_mut().collect();

        #[cfg(feature = "rayon")]
        estimators
            .par_iter_mut()
            .for_each(|estimator| estimator.predict_to(timestamp));
        #[cfg(not(feature = "rayon"))]
        for estimator in estimators.iter_mut() {
            estimator.predict_to(timestamp);
        }

        self.measurements.clear();
    }

    /// Apply the measurement window: correct matched tracks, age the rest,
    /// then run the lifecycle sweep (reactivation, deletion, suspension).
    pub fn correct(&mut self) {
        // Filter updates are data-parallel over a materialized snapshot;
        // the measurement map is read-only inside the region.
        let measurements = &self.measurements;
        let updates: Vec<(TrackId, &mut MultiModelEstimator)> = self
            .active
            .iter_mut()
            .filter(|(id, _)| measurements.contains_key(*id))
            .map(|(id, estimator)| (*id, estimator))
            .collect();

        #[cfg(feature = "rayon")]
        let outcomes: Vec<(TrackId, bool)> = updates
            .into_par_iter()
            .map(|(id, estimator)| (id, estimator.correct(&measurements[&id]).is_ok()))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let outcomes: Vec<(TrackId, bool)> = updates
            .into_iter()
            .map(|(id, estimator)| (id, estimator.correct(&measurements[&id]).is_ok()))
            .collect();

        // Counter updates run serially. A degenerate correction counts as a
        // missed frame.
        let corrected: BTreeMap<TrackId, bool> = outcomes.into_iter().collect();
        let active_ids: Vec<TrackId> = self.active.keys().copied().collect();
        for id in active_ids {
            if corrected.get(&id).copied().unwrap_or(false) {
                self.non_measurement_frames.insert(id, 0);
                *self.tracked_frames.entry(id).or_insert(0) += 1;
            } else {
                *self.non_measurement_frames.entry(id).or_insert(0) += 1;
            }
        }

        // Suspended tracks holding a measurement come back to life.
        let reactivation_list: Vec<TrackId> = self
            .suspended
            .keys()
            .filter(|id| self.measurements.contains_key(*id))
            .copied()
            .collect();
        for id in reactivation_list {
            if self.reactivate_track(id).is_ok() {
                let measurements = &self.measurements;
                if let Some(estimator) = self.active.get_mut(&id) {
                    if let Err(err) = estimator.correct(&measurements[&id]) {
                        debug!(track_id = id, %err, "reactivation correction degenerate");
                    }
                }
            }
        }

        // Lifecycle sweep over the aged tracks.
        let mut deletion_list = Vec::new();
        let mut suspend_list = Vec::new();
        for (&id, &missed) in &self.non_measurement_frames {
            if self.is_reliable(id) {
                let dynamic = self
                    .active
                    .get(&id)
                    .map(|estimator| {
                        estimator
                            .current_state()
                            .is_dynamic(self.config.static_speed_threshold)
                    })
                    .unwrap_or(false);
                if dynamic {
                    if missed > self.config.non_measurement_frames_dynamic {
                        deletion_list.push(id);
                    }
                } else if missed > self.config.non_measurement_frames_static {
                    suspend_list.push(id);
                }
            } else if missed > self.config.non_measurement_frames_dynamic {
                deletion_list.push(id);
            }
        }
        for id in deletion_list {
            self.delete_track(id);
        }
        for id in suspend_list {
            let _ = self.suspend_track(id);
        }
    }

    /// Stage a measurement for `id`, replacing any earlier one this frame.
    pub fn set_measurement(&mut self, id: TrackId, measurement: TrackedObject) -> Result<()> {
        if !self.has_id(id) {
            return Err(Error::UnknownTrack(id));
        }
        self.measurements.insert(id, measurement);
        Ok(())
    }

    /// State snapshot of one track, active or suspended.
    pub fn get_track(&self, id: TrackId) -> Result<TrackedObject> {
        self.active
            .get(&id)
            .or_else(|| self.suspended.get(&id))
            .map(MultiModelEstimator::current_state)
            .ok_or(Error::UnknownTrack(id))
    }

    /// All tracks, active then suspended.
    pub fn get_tracks(&self) -> Vec<TrackedObject> {
        self.active
            .values()
            .chain(self.suspended.values())
            .map(MultiModelEstimator::current_state)
            .collect()
    }

    /// Active tracks corrected often enough to trust.
    pub fn get_reliable_tracks(&self) -> Vec<TrackedObject> {
        self.active
            .iter()
            .filter(|(&id, _)| self.is_reliable(id))
            .map(|(_, estimator)| estimator.current_state())
            .collect()
    }

    /// Active tracks still inside the grace period.
    pub fn get_unreliable_tracks(&self) -> Vec<TrackedObject> {
        self.active
            .iter()
            .filter(|(&id, _)| !self.is_reliable(id))
            .map(|(_, estimator)| estimator.current_state())
            .collect()
    }

    /// Frozen tracks awaiting reactivation.
    pub fn get_suspended_tracks(&self) -> Vec<TrackedObject> {
        self.suspended
            .values()
            .map(MultiModelEstimator::current_state)
            .collect()
    }

    /// Reliable tracks coasting on predictions for more than half the
    /// dynamic missed-frame budget.
    pub fn get_drifting_tracks(&self) -> Vec<TrackedObject> {
        self.active
            .iter()
            .filter(|(&id, _)| {
                self.is_reliable(id)
                    && self
                        .non_measurement_frames
                        .get(&id)
                        .is_some_and(|&missed| {
                            missed > self.config.non_measurement_frames_dynamic / 2
                        })
            })
            .map(|(_, estimator)| estimator.current_state())
            .collect()
    }

    /// Whether `id` is known, active or suspended.
    pub fn has_id(&self, id: TrackId) -> bool {
        self.active.contains_key(&id) || self.suspended.contains_key(&id)
    }

    /// Whether `id` has been corrected often enough to trust.
    pub fn is_reliable(&self, id: TrackId) -> bool {
        self.tracked_frames
            .get(&id)
            .is_some_and(|&frames| frames >= self.config.max_unreliable_frames)
    }

    /// Whether `id` is currently frozen.
    pub fn is_suspended(&self, id: TrackId) -> bool {
        self.suspended.contains_key(&id)
    }

    /// Recompute the frame-based lifecycle parameters.
    pub fn update_frame_rate(&mut self, frame_rate: u32) {
        self.config.update_frame_rate(frame_rate);
    }

    // Class-vector length this run settled on, from any live track.
    pub(crate) fn classification_len(&self) -> Option<usize> {
        self.active
            .values()
            .chain(self.suspended.values())
            .next()
            .map(|estimator| estimator.current_state().classification.len())
    }
}
