use crate::error::Result;
use crate::persistence::StateStore;
use chrono::{DateTime, TimeDelta, Utc};
use courier_core::Message;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Ordered conversation history under one caller-supplied key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Caller-supplied key
    pub id: String,
    /// Messages, oldest first
    pub messages: Vec<Message>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Timestamp of the newest message
    pub updated_at: DateTime<Utc>,
    /// Set once cleanup has dropped the session from the store
    #[serde(skip)]
    removed: bool,
}

impl Session {
    /// Empty session named `id`.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            removed: false,
        }
    }

    /// Appends `message`, keeping timestamps monotonic.
    fn push(&mut self, mut message: Message) {
        if let Some(last) = self.messages.last()
            && message.timestamp < last.timestamp
        {
            message.timestamp = last.timestamp;
        }
        self.updated_at = self.updated_at.max(message.timestamp);
        self.messages.push(message);
    }
}

/// In-memory session histories.
///
/// Each session has its own async lock: appends to one session are
/// serialized, appends to different sessions never contend.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, session_id: &str) -> Arc<Mutex<Session>> {
        Arc::clone(
            self.sessions
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(Session::new(session_id))))
                .value(),
        )
    }

    /// Locks the live session, creating it if needed.
    async fn lock_live(&self, session_id: &str) -> OwnedMutexGuard<Session> {
        loop {
            let session = self.slot(session_id).lock_owned().await;
            // Cleanup may have dropped this session between lookup and lock.
            if !session.removed {
                return session;
            }
        }
    }

    /// Runs `action` on the live session, creating it if needed.
    async fn with_session<R>(&self, session_id: &str, action: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.lock_live(session_id).await;
        action(&mut session)
    }

    /// Appends one message and returns the updated session.
    pub async fn append(&self, session_id: &str, message: Message) -> Session {
        self.with_session(session_id, |session| {
            session.push(message);
            session.clone()
        })
        .await
    }

    /// Appends a user message and its reply under one lock, so the pair is
    /// never interleaved with another exchange on the same session.
    pub async fn append_exchange(
        &self,
        session_id: &str,
        user: Message,
        assistant: Message,
    ) -> Session {
        self.with_session(session_id, |session| {
            session.push(user);
            session.push(assistant);
            session.clone()
        })
        .await
    }

    /// Appends an exchange and writes the session to `store` before the
    /// session lock is released, so saves of one session land in append order.
    ///
    /// # Errors
    /// Returns the store's error; the in-memory session keeps the exchange
    pub async fn append_exchange_and_save(
        &self,
        session_id: &str,
        user: Message,
        assistant: Message,
        store: &dyn StateStore,
    ) -> Result<Session> {
        let mut session = self.lock_live(session_id).await;
        session.push(user);
        session.push(assistant);
        store.save_session(&session).await?;
        Ok(session.clone())
    }

    /// Messages of a session, oldest first. Unknown sessions are empty.
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        let Some(slot) = self.existing(session_id) else {
            return Vec::new();
        };
        let session = slot.lock().await;
        session.messages.clone()
    }

    /// Snapshot of a session, if it exists.
    pub async fn session(&self, session_id: &str) -> Option<Session> {
        let slot = self.existing(session_id)?;
        let session = slot.lock().await;
        (!session.removed).then(|| session.clone())
    }

    fn existing(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions
            .get(session_id)
            .map(|slot| Arc::clone(slot.value()))
    }

    /// Removes sessions not updated within `older_than` and returns their ids.
    pub async fn cleanup(&self, older_than: Duration) -> Vec<String> {
        self.remove_idle(older_than, None).await
    }

    /// Like [`SessionStore::cleanup`], also deleting each session from
    /// `store` while its lock is held. A session recreated under the same id
    /// waits for the delete, so its first save is never lost.
    pub async fn cleanup_and_delete(
        &self,
        older_than: Duration,
        store: &dyn StateStore,
    ) -> Vec<String> {
        self.remove_idle(older_than, Some(store)).await
    }

    async fn remove_idle(&self, older_than: Duration, store: Option<&dyn StateStore>) -> Vec<String> {
        let age = TimeDelta::from_std(older_than).unwrap_or(TimeDelta::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let candidates: Vec<(String, Arc<Mutex<Session>>)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut removed = Vec::new();
        for (session_id, slot) in candidates {
            let mut session = slot.lock().await;
            if session.removed || session.updated_at > cutoff {
                continue;
            }
            session.removed = true;
            if let Some(store) = store
                && let Err(error) = store.delete_session(&session_id).await
            {
                tracing::warn!(session = %session_id, %error, "failed to delete persisted session");
            }
            self.sessions
                .remove_if(&session_id, |_, current| Arc::ptr_eq(current, &slot));
            removed.push(session_id);
        }

        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "removed idle sessions");
        }
        removed
    }

    /// Loads persisted sessions, replacing any in memory with the same id.
    pub fn restore(&self, sessions: Vec<Session>) {
        for session in sessions {
            self.sessions
                .insert(session.id.clone(), Arc::new(Mutex::new(session)));
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of all stored sessions, sorted.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }
}
