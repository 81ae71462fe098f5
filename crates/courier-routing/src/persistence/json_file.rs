//! State persisted as JSON files in one directory.
//!
//! Layout: `sessions/<encoded id>.json` per session and `health.json` for the
//! health snapshot. Files are written to a temporary sibling and renamed into
//! place, so a crash never leaves a half-written file behind. Writes to the
//! same file are serialized and every write stages under its own name.

use super::StateStore;
use crate::error::{Result, RoutingError};
use crate::health::HealthState;
use crate::session::Session;
use async_trait::async_trait;
use courier_core::Error as CoreError;
use serde::Serialize;
use serde_json::{from_slice, to_vec_pretty};
use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Display;
use std::hash::{Hash as _, Hasher as _};
use std::io::ErrorKind;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::Mutex;

/// Longest session id encoded verbatim into a file name.
const MAX_VERBATIM_ID_BYTES: usize = 96;

/// Stores sessions and health as JSON files under one directory.
pub struct JsonFileStateStore {
    root: PathBuf,
    /// One write lock per target file
    writers: DashMap<PathBuf, Arc<Mutex<()>>>,
    staging_seq: AtomicU64,
}

impl JsonFileStateStore {
    /// Creates a store rooted at `root`, creating the directory tree if needed.
    ///
    /// # Errors
    /// Returns an error if the directories cannot be created
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("sessions")).await.map_err(|err| {
            RoutingError::Core(CoreError::Storage(format!(
                "Failed to create state directory {}: {err}",
                root.display()
            )))
        })?;
        Ok(Self {
            root,
            writers: DashMap::new(),
            staging_seq: AtomicU64::new(0),
        })
    }

    /// Directory the store writes under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    fn health_path(&self) -> PathBuf {
        self.root.join("health.json")
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir()
            .join(format!("{}.json", file_stem(session_id)))
    }

    fn writer(&self, path: &Path) -> Arc<Mutex<()>> {
        Arc::clone(
            self.writers
                .entry(path.to_path_buf())
                .or_default()
                .value(),
        )
    }

    /// Writes `value` to `path` through a uniquely named staging file.
    async fn write_json<T: Serialize + Sync>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = to_vec_pretty(value)?;
        let seq = self.staging_seq.fetch_add(1, Ordering::Relaxed);
        let staging = path.with_extension(format!("json.{seq}.tmp"));

        let writer = self.writer(path);
        let guard = writer.lock().await;
        let written = replace_file(&staging, path, bytes).await;
        drop(guard);
        written
    }
}

/// File-name-safe stem for a session id.
///
/// Short ids are hex encoded; long ids keep a hex prefix plus a hash of the
/// whole id.
fn file_stem(session_id: &str) -> String {
    let bytes = session_id.as_bytes();
    if bytes.len() <= MAX_VERBATIM_ID_BYTES {
        return hex::encode(bytes);
    }
    let mut hasher = DefaultHasher::new();
    session_id.hash(&mut hasher);
    format!(
        "{}-{:016x}",
        hex::encode(&bytes[..MAX_VERBATIM_ID_BYTES / 2]),
        hasher.finish()
    )
}

/// Writes `bytes` to `staging`, then renames it over `path`.
async fn replace_file(staging: &Path, path: &Path, bytes: Vec<u8>) -> Result<()> {
    fs::write(staging, bytes)
        .await
        .map_err(|err| storage_error("write", staging, err))?;
    if let Err(err) = fs::rename(staging, path).await {
        if let Err(cleanup) = fs::remove_file(staging).await {
            tracing::debug!(path = %staging.display(), %cleanup, "failed to remove staging file");
        }
        return Err(storage_error("replace", path, err));
    }
    Ok(())
}

fn storage_error(action: &str, path: &Path, err: impl Display) -> RoutingError {
    RoutingError::Core(CoreError::Storage(format!(
        "Failed to {action} {}: {err}",
        path.display()
    )))
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    fn kind(&self) -> &'static str {
        "json_dir"
    }

    async fn load_sessions(&self) -> Result<Vec<Session>> {
        let dir = self.sessions_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(storage_error("read", &dir, err)),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| storage_error("read", &dir, err))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read(&path)
                .await
                .map_err(|err| storage_error("read", &path, err))?;
            let session: Session =
                from_slice(&contents).map_err(|err| storage_error("parse", &path, err))?;
            sessions.push(session);
        }

        sessions.sort_by(|left, right| left.id.cmp(&right.id));
        tracing::debug!(count = sessions.len(), root = %self.root.display(), "loaded sessions");
        Ok(sessions)
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        self.write_json(&self.session_path(&session.id), session).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let path = self.session_path(session_id);
        let writer = self.writer(&path);
        let guard = writer.lock().await;
        let removed = fs::remove_file(&path).await;
        drop(guard);
        drop(writer);
        // Forget the lock unless another writer is waiting on it.
        self.writers
            .remove_if(&path, |_, lock| Arc::strong_count(lock) == 1);
        match removed {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error("delete", &path, err)),
        }
    }

    async fn load_health(&self) -> Result<BTreeMap<String, HealthState>> {
        let path = self.health_path();
        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(storage_error("read", &path, err)),
        };
        from_slice(&contents).map_err(|err| storage_error("parse", &path, err))
    }

    async fn save_health(&self, states: &BTreeMap<String, HealthState>) -> Result<()> {
        self.write_json(&self.health_path(), states).await
    }
}
