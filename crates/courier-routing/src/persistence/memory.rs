use super::StateStore;
use crate::error::Result;
use crate::health::HealthState;
use crate::session::Session;
use async_trait::async_trait;
use courier_core::IgnoreLock as _;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Keeps state for the lifetime of the process only.
#[derive(Default)]
pub struct MemoryStateStore {
    sessions: Mutex<HashMap<String, Session>>,
    health: Mutex<BTreeMap<String, HealthState>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saved sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock_ignore_poison().len()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn load_sessions(&self) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .lock_ignore_poison()
            .values()
            .cloned()
            .collect();
        sessions.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(sessions)
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        self.sessions.with_lock(|sessions| {
            sessions.insert(session.id.clone(), session.clone());
        });
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions.with_lock(|sessions| sessions.remove(session_id));
        Ok(())
    }

    async fn load_health(&self) -> Result<BTreeMap<String, HealthState>> {
        Ok(self.health.lock_ignore_poison().clone())
    }

    async fn save_health(&self, states: &BTreeMap<String, HealthState>) -> Result<()> {
        self.health.with_lock(|health| health.clone_from(states));
        Ok(())
    }
}
