use core::result::Result as CoreResult;
use std::io::Error as IoError;

use reqwest::Error as ReqwestError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

use crate::types::FailureCategory;

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Result type for a single backend call.
pub type CallResult<T> = CoreResult<T, CallError>;

/// Errors that can occur outside of a backend call: configuration, storage and setup.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// Building an HTTP client failed.
    #[error("HTTP client error: {0}")]
    Request(#[from] ReqwestError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required credential was not found.
    #[error("Credential not found: {0}")]
    MissingCredential(String),

    /// Persisted state could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

/// Failure of one attempt against one backend.
///
/// Every variant maps to exactly one [`FailureCategory`]. Callers of the
/// dispatcher never see this type directly; it is folded into the terminal
/// routing errors as diagnostic detail.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CallError {
    /// The attempt exceeded its time bound.
    #[error("timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds spent before the attempt was abandoned
        elapsed_ms: u64,
    },

    /// The backend could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The backend answered with an error status.
    #[error("remote error (status {status}): {message}")]
    Remote {
        /// Status code reported by the backend
        status: u16,
        /// Error body or reason
        message: String,
        /// Whether repeating the same request may succeed
        retryable: bool,
    },

    /// The backend answered with something that could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl CallError {
    /// Builds a remote error, deriving retryability from the status code.
    ///
    /// Server errors, request timeouts (408) and throttling (429) are retryable;
    /// every other client error is a rejection of the input and is not.
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        let retryable = status >= 500 || status == 408 || status == 429;
        Self::Remote {
            status,
            message: message.into(),
            retryable,
        }
    }

    /// Category used for health accounting and diagnostics.
    pub const fn category(&self) -> FailureCategory {
        match self {
            Self::Timeout { .. } => FailureCategory::Timeout,
            Self::Connection(_) => FailureCategory::Connection,
            Self::Remote { .. } => FailureCategory::RemoteError,
            Self::Protocol(_) => FailureCategory::ProtocolError,
        }
    }

    /// Determines whether another attempt against the same backend is worthwhile.
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Remote {
                retryable: false,
                ..
            }
        )
    }
}
