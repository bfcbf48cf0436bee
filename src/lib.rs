//! # Motrack - Multi-Object Tracking Core
//!
//! A causal, online multi-object tracker for world-frame detections.
//!
//! Given a stream of per-frame detections (position, extent, classification
//! probabilities and optional kinematic hints), the tracker maintains a set of
//! persistent tracks with stable identities, smoothed state estimates and
//! principled birth/death semantics.
//!
//! ## Features
//!
//! - Bank of Unscented Kalman Filters with pluggable motion models
//!   (constant position / velocity / acceleration / turn-rate-and-velocity)
//! - Gated Hungarian assignment over connected components of the
//!   feasible-match graph
//! - Four-phase measurement-to-track association
//!   (reliable → low-score → unreliable → suspended)
//! - Track lifecycle: birth, promotion to reliable, aging, suspension of
//!   static tracks, reactivation, deletion
//!
//! ## Example
//!
//! ```rust,ignore
//! use motrack::{MultipleObjectTracker, TrackManagerConfig, TrackedObject};
//!
//! let mut tracker = MultipleObjectTracker::new(TrackManagerConfig::default()).unwrap();
//!
//! // Process one frame of detections (timestamp in seconds)
//! let detections = vec![TrackedObject::default()];
//! tracker.track(detections, 0.033, 0.5).unwrap();
//! let reliable = tracker.get_reliable_tracks();
//! ```

// Public modules
pub mod classification;
pub mod motion;
pub mod filter;
pub mod distances;
pub mod matching;
pub mod tracked_object;
pub mod track_manager;
pub mod tracker;

// Re-exports for convenience
pub use tracked_object::{TrackedObject, TrackId, INVALID_ID};
pub use motion::MotionModel;
pub use filter::{MultiModelEstimator, UnscentedKalmanFilter, UkfParams};
pub use distances::DistanceType;
pub use matching::{match_tracks, MatchResult};
pub use track_manager::{TrackManager, TrackManagerConfig};
pub use tracker::MultipleObjectTracker;

// Error types
pub use crate::error::{Error, Result};

mod error {
    use thiserror::Error;

    use crate::tracked_object::TrackId;

    /// Errors that can occur in the tracking core.
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Unknown track id: {0}")]
        UnknownTrack(TrackId),

        #[error("Filter degenerate: {0}")]
        FilterDegenerate(String),
    }

    /// Result type for tracking operations.
    pub type Result<T> = std::result::Result<T, Error>;
}
