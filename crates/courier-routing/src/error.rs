use courier_core::{CallError, Error as CoreError, FailureCategory};
use serde::Serialize;
use serde_json::Error as JsonError;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io;
use std::result::Result as StdResult;
use thiserror::Error;

/// Result type for routing operations
pub type Result<T> = StdResult<T, RoutingError>;

/// Terminal errors returned to dispatch callers.
///
/// Per-attempt failures never escape on their own; they are carried inside
/// [`RoutingError::AllCandidatesExhausted`] and
/// [`RoutingError::DeadlineExceeded`] as diagnostic detail.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Request rejected before routing
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Target names no registered backend
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    /// Every candidate failed or was skipped
    #[error("All candidates exhausted: {}", FailureList(failures))]
    AllCandidatesExhausted {
        /// One entry per attempted candidate, in attempt order
        failures: Vec<CandidateFailure>,
        /// Candidates skipped because they were unhealthy
        skipped: Vec<String>,
    },

    /// The overall deadline ran out
    #[error("Deadline of {deadline_ms}ms exceeded after {elapsed_ms}ms")]
    DeadlineExceeded {
        /// Budget the request was given
        deadline_ms: u64,
        /// Time spent before giving up
        elapsed_ms: u64,
        /// Candidates that failed before the deadline ran out
        failures: Vec<CandidateFailure>,
    },

    /// The caller cancelled the dispatch
    #[error("Dispatch cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] JsonError),
}

impl RoutingError {
    /// Whether the same request may succeed if sent again later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DeadlineExceeded { .. } => true,
            Self::AllCandidatesExhausted { failures, .. } => failures
                .iter()
                .any(|failure| failure.last_error.is_retryable()),
            _ => false,
        }
    }

    /// Failures recorded before the dispatch gave up, if any.
    #[must_use]
    pub fn failures(&self) -> &[CandidateFailure] {
        match self {
            Self::AllCandidatesExhausted { failures, .. } | Self::DeadlineExceeded { failures, .. } => {
                failures
            }
            _ => &[],
        }
    }
}

/// Diagnostic record of one exhausted candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFailure {
    /// Backend name
    pub backend: String,
    /// Attempts made against this candidate
    pub attempts: u32,
    /// Category of the last failed attempt
    pub category: FailureCategory,
    /// Error of the last failed attempt
    pub last_error: CallError,
}

impl Display for CandidateFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} ({} after {} attempt(s): {})",
            self.backend, self.category, self.attempts, self.last_error
        )
    }
}

struct FailureList<'list>(&'list [CandidateFailure]);

impl Display for FailureList<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.0.is_empty() {
            return f.write_str("no candidate was attempted");
        }
        for (index, failure) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}
