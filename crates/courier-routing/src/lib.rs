//! Request routing: complexity classification, a TTL routing cache and a
//! resilient dispatcher with retries, fallover, deadlines and backend health.
//!
//! Session histories and health survive restarts through a [`StateStore`].

/// Classification
pub mod analyzer;
/// Routing cache
pub mod cache;
/// Configuration
pub mod config;
/// Request dispatch
pub mod dispatcher;
/// Error types
pub mod error;
/// Backend health
pub mod health;
/// Background upkeep
pub mod maintenance;
/// Persisted state
pub mod persistence;
/// Backend registry
pub mod router;
/// Session histories
pub mod session;
/// Shared types
pub mod types;

pub use analyzer::{ClassificationResult, Classifier, ComplexityScorer, Tier};
pub use cache::{CacheStats, Fingerprint, RoutingCache};
pub use config::{
    CacheConfig, ClassifierConfig, HealthConfig, LoggingConfig, RetryConfig, RoutingConfig,
    SessionConfig, StorageConfig, StorageKind, TierMap,
};
pub use dispatcher::{
    DispatchReply, DispatchRequest, Dispatcher, DispatcherBuilder, RetryPolicy, Target,
};
pub use error::{CandidateFailure, Result, RoutingError};
pub use health::{FailureHistogram, HealthState, HealthStatus, HealthTracker};
pub use maintenance::MaintenanceHandle;
pub use persistence::{JsonFileStateStore, MemoryStateStore, StateStore};
pub use router::{Backend, BackendRegistry, RegistryHandle};
pub use session::{Session, SessionStore};
pub use types::{DispatchOutcome, new_session_id};
