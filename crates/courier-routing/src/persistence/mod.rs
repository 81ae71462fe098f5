//! Persisted state port.
//!
//! Sessions and health snapshots are loaded once when a dispatcher is built
//! and written back as they change.

/// JSON directory store
pub mod json_file;
/// In-memory store
pub mod memory;

use crate::error::Result;
use crate::health::HealthState;
use crate::session::Session;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use json_file::JsonFileStateStore;
pub use memory::MemoryStateStore;

/// Storage for sessions and backend health.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Short label of the store kind, used in logs.
    fn kind(&self) -> &'static str;

    /// Loads every persisted session.
    ///
    /// # Errors
    /// Returns an error if stored sessions cannot be read or parsed
    async fn load_sessions(&self) -> Result<Vec<Session>>;

    /// Inserts or replaces one session.
    ///
    /// # Errors
    /// Returns an error if the session cannot be written
    async fn save_session(&self, session: &Session) -> Result<()>;

    /// Deletes one session. Deleting an unknown session is not an error.
    ///
    /// # Errors
    /// Returns an error if the session exists but cannot be removed
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Loads the last health snapshot, empty if none was saved.
    ///
    /// # Errors
    /// Returns an error if a stored snapshot cannot be read or parsed
    async fn load_health(&self) -> Result<BTreeMap<String, HealthState>>;

    /// Replaces the health snapshot.
    ///
    /// # Errors
    /// Returns an error if the snapshot cannot be written
    async fn save_health(&self, states: &BTreeMap<String, HealthState>) -> Result<()>;
}
