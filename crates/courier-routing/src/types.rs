use courier_core::FailureCategory;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a fresh session key for callers that do not bring their own.
#[must_use]
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Result of one attempt against one backend.
///
/// Fed to the health tracker and returned to callers as the attempt trail of
/// a successful dispatch. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Backend that was called
    pub backend: String,
    /// 1-based attempt number within the backend's retry budget
    pub attempt: u32,
    /// `None` on success
    pub failure: Option<FailureCategory>,
    /// Time the attempt took
    pub latency_ms: u64,
}

impl DispatchOutcome {
    /// Outcome of a successful attempt.
    #[must_use]
    pub fn success(backend: impl Into<String>, attempt: u32, latency_ms: u64) -> Self {
        Self {
            backend: backend.into(),
            attempt,
            failure: None,
            latency_ms,
        }
    }

    /// Outcome of a failed attempt.
    #[must_use]
    pub fn failure(
        backend: impl Into<String>,
        attempt: u32,
        category: FailureCategory,
        latency_ms: u64,
    ) -> Self {
        Self {
            backend: backend.into(),
            attempt,
            failure: Some(category),
            latency_ms,
        }
    }

    /// Whether the attempt succeeded.
    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}
