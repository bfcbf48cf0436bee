//! Multi-model estimator: one UKF per configured motion model.
//!
//! Every filter advances on predict and updates on correct; the "current"
//! model is re-selected each corrected frame as the one with the smallest
//! recent innovation norm, ties going to the earlier entry in the configured
//! model list. The exposed track state is reconstituted from the current
//! filter.

use std::collections::VecDeque;

use nalgebra::DMatrix;
use tracing::debug;

use super::ukf::{UkfParams, UnscentedKalmanFilter};
use crate::classification;
use crate::motion::MotionModel;
use crate::tracked_object::{unwrap_near, TrackedObject, TrackId};
use crate::{Error, Result};

/// Corrected frames of innovation history considered for model selection.
const INNOVATION_WINDOW: usize = 5;

/// Owns the filter bank for one track.
#[derive(Debug, Clone)]
pub struct MultiModelEstimator {
    filters: Vec<UnscentedKalmanFilter>,
    innovation_history: Vec<VecDeque<f64>>,
    degenerate: Vec<bool>,
    current: usize,
    track: TrackedObject,
    last_timestamp: f64,
}

impl MultiModelEstimator {
    /// Create an estimator from the birth detection.
    pub fn new(
        object: &TrackedObject,
        timestamp: f64,
        process_noise_cov: &DMatrix<f64>,
        measurement_noise_cov: &DMatrix<f64>,
        init_state_cov: &DMatrix<f64>,
        models: &[MotionModel],
    ) -> Result<Self> {
        if models.is_empty() {
            return Err(Error::InvalidConfig("empty motion-model set".to_string()));
        }

        let initial_state = object.state_vector();
        let filters = models
            .iter()
            .map(|&model| {
                UnscentedKalmanFilter::new(
                    model,
                    initial_state.clone(),
                    init_state_cov.clone(),
                    process_noise_cov.clone(),
                    measurement_noise_cov.clone(),
                    UkfParams::default(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let mut track = object.clone();
        track.classification = classification::normalize(&object.classification);

        let mut estimator = Self {
            innovation_history: vec![VecDeque::with_capacity(INNOVATION_WINDOW); filters.len()],
            degenerate: vec![false; filters.len()],
            filters,
            current: 0,
            track,
            last_timestamp: timestamp,
        };
        estimator.refresh_snapshot();
        Ok(estimator)
    }

    /// Advance every filter by `dt` seconds.
    ///
    /// A filter whose prediction degenerates is flagged and sits out the
    /// correction this frame; the others carry the track.
    pub fn predict(&mut self, dt: f64) {
        for (i, filter) in self.filters.iter_mut().enumerate() {
            self.degenerate[i] = false;
            if let Err(err) = filter.predict(dt) {
                self.degenerate[i] = true;
                debug!(
                    track_id = self.track.id,
                    model = ?filter.model(),
                    %err,
                    "prediction degenerate, correction suppressed this frame"
                );
            }
        }
        self.last_timestamp += dt;
        self.refresh_snapshot();
    }

    /// Advance every filter up to `timestamp` (seconds).
    pub fn predict_to(&mut self, timestamp: f64) {
        let dt = (timestamp - self.last_timestamp).max(0.0);
        self.predict(dt);
        self.last_timestamp = timestamp;
    }

    /// Apply a measurement to every live filter and re-select the current
    /// model.
    ///
    /// Fails with `FilterDegenerate` only when every filter rejected the
    /// update; the caller then treats the frame as missed.
    pub fn correct(&mut self, measurement: &TrackedObject) -> Result<()> {
        if measurement.classification.len() != self.track.classification.len() {
            return Err(Error::InvalidArgument(format!(
                "classification has {} classes, track expects {}",
                measurement.classification.len(),
                self.track.classification.len()
            )));
        }

        let mut z = measurement.measurement_vector();
        // Keep the measured heading on the branch nearest the prediction so
        // a pi-crossing does not read as a full turn.
        let predicted_yaw = self.filters[self.current].measurement_estimate()[6];
        z[6] = unwrap_near(z[6], predicted_yaw);

        let mut any_corrected = false;
        for i in 0..self.filters.len() {
            if self.degenerate[i] {
                continue;
            }
            let innovation = self.filters[i].innovation_distance(&z);
            match self.filters[i].correct(&z) {
                Ok(()) => {
                    any_corrected = true;
                    let history = &mut self.innovation_history[i];
                    if history.len() == INNOVATION_WINDOW {
                        history.pop_front();
                    }
                    history.push_back(innovation);
                }
                Err(err) => {
                    self.degenerate[i] = true;
                    debug!(
                        track_id = self.track.id,
                        model = ?self.filters[i].model(),
                        %err,
                        "correction degenerate"
                    );
                }
            }
        }

        if !any_corrected {
            return Err(Error::FilterDegenerate(
                "every motion model degenerated this frame".to_string(),
            ));
        }

        self.select_model();
        self.track.classification = classification::combine(
            &self.track.classification,
            &classification::normalize(&measurement.classification),
        )?;
        self.track.vz = measurement.vz;
        self.refresh_snapshot();
        Ok(())
    }

    /// Snapshot of the current state, by value.
    pub fn current_state(&self) -> TrackedObject {
        self.track.clone()
    }

    /// Identity of the owned track.
    pub fn id(&self) -> TrackId {
        self.track.id
    }

    /// Motion model currently explaining the track best.
    pub fn current_model(&self) -> MotionModel {
        self.filters[self.current].model()
    }

    /// Timestamp of the last predict, seconds.
    pub fn last_timestamp(&self) -> f64 {
        self.last_timestamp
    }

    // Smallest mean innovation over the recent window wins; ties keep the
    // earlier (higher-priority) model.
    fn select_model(&mut self) {
        let mut best = self.current;
        let mut best_score = f64::INFINITY;
        for i in 0..self.filters.len() {
            if self.degenerate[i] || self.innovation_history[i].is_empty() {
                continue;
            }
            let history = &self.innovation_history[i];
            let score = history.iter().sum::<f64>() / history.len() as f64;
            if score < best_score {
                best_score = score;
                best = i;
            }
        }
        self.current = best;
    }

    fn refresh_snapshot(&mut self) {
        let filter = &self.filters[self.current];
        self.track.apply_state_vector(filter.state());
        self.track.predicted_measurement_mean = filter.measurement_estimate().clone();
        self.track.predicted_measurement_cov = filter.innovation_cov().clone();
        self.track.predicted_measurement_cov_inv = filter.innovation_cov_inv().clone();
        self.track.error_covariance = filter.error_cov().clone();
    }
}
