//! State estimation for tracks.
//!
//! - `UnscentedKalmanFilter` - sigma-point filter over one motion model
//! - `MultiModelEstimator` - one filter per configured motion model, with
//!   innovation-based selection of the current model

mod ukf;
mod multi_model;

pub use ukf::{UkfParams, UnscentedKalmanFilter};
pub use multi_model::MultiModelEstimator;
