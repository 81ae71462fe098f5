//! Backend health tracking.

/// Trailing-window health state machine
pub mod tracker;

pub use tracker::{FailureHistogram, HealthState, HealthStatus, HealthTracker, evaluate};
