//! Core types and traits shared by the courier dispatch workspace.
//!
//! This crate defines the backend configuration model, session message types,
//! the categorized call error, and the [`Transport`] capability every backend
//! is reached through.

/// Backend connection configuration.
pub mod backend;
/// Error types and result definitions.
pub mod error;
/// Lock helpers that tolerate poisoning.
pub mod sync;
/// Transport capability implemented once per protocol.
pub mod traits;
/// Messages, requests, responses and failure categories.
pub mod types;

pub use backend::{BackendConfig, Protocol};
pub use error::{CallError, CallResult, Error, Result};
pub use sync::IgnoreLock;
pub use traits::{Transport, TransportFactory};
pub use types::{BackendRequest, BackendResponse, FailureCategory, Message, Role};
