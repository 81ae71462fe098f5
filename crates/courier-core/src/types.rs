use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Author of a session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Text submitted by the caller
    User,
    /// Text produced by a backend
    Assistant,
}

/// One entry in a session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced the message
    pub role: Role,
    /// Message body
    pub text: String,
    /// Backend that produced an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// When the message was appended
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a user message stamped with the current time.
    pub fn user<T: Into<String>>(text: T) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            backend: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates an assistant message attributed to `backend`.
    pub fn assistant<T: Into<String>, B: Into<String>>(text: T, backend: B) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            backend: Some(backend.into()),
            timestamp: Utc::now(),
        }
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Payload handed to a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRequest {
    /// Session the request belongs to
    pub session_id: String,
    /// Request text
    pub text: String,
    /// Prior messages of the session, oldest first
    pub history: Vec<Message>,
}

impl BackendRequest {
    /// Creates a request without history.
    pub fn new<S: Into<String>, T: Into<String>>(session_id: S, text: T) -> Self {
        Self {
            session_id: session_id.into(),
            text: text.into(),
            history: Vec::new(),
        }
    }

    /// Attaches prior session messages as context.
    #[must_use]
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

/// Successful answer from a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendResponse {
    /// Response body
    pub text: String,
    /// Time the backend took to answer
    pub latency_ms: u64,
}

/// Category of a failed backend attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Attempt exceeded its bound
    Timeout,
    /// Backend unreachable
    Connection,
    /// Backend reachable but returned an error status
    RemoteError,
    /// Malformed or unexpected response
    ProtocolError,
}

impl FailureCategory {
    /// All categories, in histogram order.
    pub const ALL: [Self; 4] = [
        Self::Timeout,
        Self::Connection,
        Self::RemoteError,
        Self::ProtocolError,
    ];
}

impl Display for FailureCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let label = match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::RemoteError => "remote-error",
            Self::ProtocolError => "protocol-error",
        };
        f.write_str(label)
    }
}
