//! Motion models: state-transition and measurement functions.
//!
//! All models share one 12-component state vector
//! `[x, y, vx, vy, ax, ay, z, length, width, height, yaw, yaw_rate]`
//! and project to a 7-component measurement
//! `[x, y, z, length, width, height, yaw]`. They differ only in the
//! transition. Process and measurement noise are additive and applied by the
//! filter, not here.
//!
//! See "Comparison and evaluation of advanced motion models for vehicle
//! tracking" for the model family.

use nalgebra::DVector;

/// Dimensionality of the state vector.
pub const STATE_DIM: usize = 12;

/// Dimensionality of the measurement vector.
pub const MEASUREMENT_DIM: usize = 7;

/// State vector component indices.
pub mod state {
    pub const X: usize = 0;
    pub const Y: usize = 1;
    pub const VX: usize = 2;
    pub const VY: usize = 3;
    pub const AX: usize = 4;
    pub const AY: usize = 5;
    pub const Z: usize = 6;
    pub const LENGTH: usize = 7;
    pub const WIDTH: usize = 8;
    pub const HEIGHT: usize = 9;
    pub const YAW: usize = 10;
    pub const YAW_RATE: usize = 11;
}

/// Below this turn rate the constant-turn model degrades to straight-line
/// motion to avoid the 1/omega singularity.
const YAW_RATE_EPSILON: f64 = 1e-6;

/// A motion hypothesis: how the state evolves over `dt` seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MotionModel {
    /// Constant position: pose carried over, acceleration zeroed.
    ConstantPosition,
    /// Constant velocity: linear position update, acceleration zeroed.
    ConstantVelocity,
    /// Constant acceleration: quadratic position update.
    ConstantAcceleration,
    /// Constant turn rate and velocity: coupled nonlinear (x, y, yaw) update.
    ConstantTurnRate,
}

impl MotionModel {
    /// Propagate a state vector through this model over `dt` seconds.
    pub fn transition(&self, x: &DVector<f64>, dt: f64) -> DVector<f64> {
        use state::*;

        let mut next = x.clone();
        match self {
            MotionModel::ConstantPosition => {
                next[AX] = 0.0;
                next[AY] = 0.0;
            }
            MotionModel::ConstantVelocity => {
                next[X] = x[X] + x[VX] * dt;
                next[Y] = x[Y] + x[VY] * dt;
                next[AX] = 0.0;
                next[AY] = 0.0;
                next[YAW_RATE] = 0.0;
            }
            MotionModel::ConstantAcceleration => {
                next[X] = x[X] + x[VX] * dt + 0.5 * x[AX] * dt * dt;
                next[Y] = x[Y] + x[VY] * dt + 0.5 * x[AY] * dt * dt;
                next[VX] = x[VX] + x[AX] * dt;
                next[VY] = x[VY] + x[AY] * dt;
                next[YAW_RATE] = 0.0;
            }
            MotionModel::ConstantTurnRate => {
                let speed = x[VX].hypot(x[VY]);
                let yaw = x[YAW];
                let omega = x[YAW_RATE];

                if omega.abs() > YAW_RATE_EPSILON {
                    let next_yaw = yaw + omega * dt;
                    next[X] = x[X] + speed / omega * (next_yaw.sin() - yaw.sin());
                    next[Y] = x[Y] + speed / omega * (yaw.cos() - next_yaw.cos());
                    next[YAW] = next_yaw;
                    next[VX] = speed * next_yaw.cos();
                    next[VY] = speed * next_yaw.sin();
                } else {
                    next[X] = x[X] + speed * yaw.cos() * dt;
                    next[Y] = x[Y] + speed * yaw.sin() * dt;
                }
                next[AX] = 0.0;
                next[AY] = 0.0;
            }
        }
        next
    }

    /// Project a state vector into measurement space.
    pub fn measurement(&self, x: &DVector<f64>) -> DVector<f64> {
        use state::*;
        DVector::from_vec(vec![
            x[X], x[Y], x[Z], x[LENGTH], x[WIDTH], x[HEIGHT], x[YAW],
        ])
    }
}
