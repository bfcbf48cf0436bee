//! TrackedObject: one object snapshot, used both as detection and track state.

use crate::motion::{state, MEASUREMENT_DIM, STATE_DIM};
use crate::{Error, Result};
use nalgebra::{DMatrix, DVector, Vector3};
use std::f64::consts::PI;

/// Track identifier.
pub type TrackId = u64;

/// Sentinel id meaning "no identity yet"; assigned by the manager at birth.
pub const INVALID_ID: TrackId = TrackId::MAX;

/// Wrap an angle into (-pi, pi].
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(2.0 * PI);
    if wrapped > PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}

/// Shift `angle` by whole turns so it lands on the branch nearest `reference`.
pub fn unwrap_near(angle: f64, reference: f64) -> f64 {
    angle - 2.0 * PI * ((angle - reference + PI) / (2.0 * PI)).floor()
}

/// A snapshot of an object in the scene.
///
/// Incoming detections and outgoing track states share this type: a
/// detection is a snapshot with measured fields filled in, a track state is
/// a snapshot reconstituted from the current filter. The filter exposure
/// matrices (`predicted_measurement_*`, `error_covariance`) are populated on
/// track snapshots and support Mahalanobis gating downstream.
#[derive(Clone, Debug)]
pub struct TrackedObject {
    /// Identity; `INVALID_ID` until the manager assigns one.
    pub id: TrackId,

    /// Position in the world frame, metres.
    pub x: f64,
    pub y: f64,
    pub z: f64,

    /// Extent, metres.
    pub length: f64,
    pub width: f64,
    pub height: f64,

    /// Velocity, m/s.
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,

    /// Heading in (-pi, pi].
    pub yaw: f64,
    /// Heading of the previous frame, kept for unwrapping.
    pub previous_yaw: f64,
    /// Turn rate, rad/s.
    pub yaw_rate: f64,

    /// Probability vector over the run's class set; may sum to less than
    /// one (the remainder is unknown mass).
    pub classification: DVector<f64>,

    /// Predicted measurement mean (7x1) of the current filter.
    pub predicted_measurement_mean: DVector<f64>,
    /// Innovation covariance (7x7) of the current filter.
    pub predicted_measurement_cov: DMatrix<f64>,
    /// Pseudo-inverse of the innovation covariance.
    pub predicted_measurement_cov_inv: DMatrix<f64>,
    /// State error covariance (12x12) of the current filter.
    pub error_covariance: DMatrix<f64>,
}

impl Default for TrackedObject {
    fn default() -> Self {
        Self {
            id: INVALID_ID,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            length: 0.0,
            width: 0.0,
            height: 0.0,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            yaw: 0.0,
            previous_yaw: 0.0,
            yaw_rate: 0.0,
            classification: DVector::from_element(1, 1.0),
            predicted_measurement_mean: DVector::zeros(MEASUREMENT_DIM),
            predicted_measurement_cov: DMatrix::zeros(MEASUREMENT_DIM, MEASUREMENT_DIM),
            predicted_measurement_cov_inv: DMatrix::zeros(MEASUREMENT_DIM, MEASUREMENT_DIM),
            error_covariance: DMatrix::zeros(STATE_DIM, STATE_DIM),
        }
    }
}

impl TrackedObject {
    /// Position as a vector.
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Highest class probability; zero for an empty classification.
    pub fn top_score(&self) -> f64 {
        self.classification.iter().cloned().fold(0.0, f64::max)
    }

    /// Whether the planar speed exceeds `speed_threshold` (m/s).
    pub fn is_dynamic(&self, speed_threshold: f64) -> bool {
        self.vx.hypot(self.vy) > speed_threshold
    }

    /// The 12-component filter state this snapshot describes.
    ///
    /// Detections carry no acceleration estimate; those components start
    /// at zero.
    pub fn state_vector(&self) -> DVector<f64> {
        let mut s = DVector::zeros(STATE_DIM);
        s[state::X] = self.x;
        s[state::Y] = self.y;
        s[state::VX] = self.vx;
        s[state::VY] = self.vy;
        s[state::Z] = self.z;
        s[state::LENGTH] = self.length;
        s[state::WIDTH] = self.width;
        s[state::HEIGHT] = self.height;
        s[state::YAW] = self.yaw;
        s[state::YAW_RATE] = self.yaw_rate;
        s
    }

    /// The 7-component measurement this snapshot provides.
    pub fn measurement_vector(&self) -> DVector<f64> {
        DVector::from_vec(vec![
            self.x,
            self.y,
            self.z,
            self.length,
            self.width,
            self.height,
            self.yaw,
        ])
    }

    /// Overwrite the kinematic fields from a filter state vector.
    ///
    /// The yaw is wrapped into (-pi, pi]; the heading the snapshot held
    /// before the update moves to `previous_yaw`.
    pub fn apply_state_vector(&mut self, s: &DVector<f64>) {
        self.previous_yaw = self.yaw;
        self.x = s[state::X];
        self.y = s[state::Y];
        self.vx = s[state::VX];
        self.vy = s[state::VY];
        self.z = s[state::Z];
        self.length = s[state::LENGTH];
        self.width = s[state::WIDTH];
        self.height = s[state::HEIGHT];
        self.yaw = wrap_angle(s[state::YAW]);
        self.yaw_rate = s[state::YAW_RATE];
    }

    /// Check that this snapshot is a usable detection.
    pub fn validate(&self) -> Result<()> {
        if !(self.x.is_finite() && self.y.is_finite() && self.z.is_finite()) {
            return Err(Error::InvalidArgument(format!(
                "non-finite position ({}, {}, {})",
                self.x, self.y, self.z
            )));
        }
        if self.length < 0.0 || self.width < 0.0 || self.height < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "negative size ({}, {}, {})",
                self.length, self.width, self.height
            )));
        }
        if !(self.length.is_finite() && self.width.is_finite() && self.height.is_finite()) {
            return Err(Error::InvalidArgument("non-finite size".to_string()));
        }
        if self.classification.is_empty() {
            return Err(Error::InvalidArgument("empty classification".to_string()));
        }
        if self.classification.iter().any(|p| !p.is_finite()) {
            return Err(Error::InvalidArgument(
                "non-finite classification".to_string(),
            ));
        }
        Ok(())
    }
}
