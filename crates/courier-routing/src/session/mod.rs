//! Per-session conversation history.

/// Session storage with per-session serialization
pub mod store;

pub use store::{Session, SessionStore};
