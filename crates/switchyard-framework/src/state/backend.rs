//! Storage backends for [`JsonUserStateStore`](super::JsonUserStateStore).
//!
//! | Backend | Storage | Use |
//! |---------|---------|-----|
//! | [`MemoryBackend`] | `HashMap` behind a lock | Tests, ephemeral bots |
//! | [`FileBackend`] | `<data_dir>/<user_id>.json` | Single-process deployments |

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use switchyard_core::UserId;
use tracing::{debug, trace};

use crate::error::{StateError, StateResult};

/// Raw persistence of one JSON value per user.
#[async_trait]
pub trait StateBackend: Send + Sync + 'static {
    /// Loads the stored value, or `None` for an unknown user.
    async fn load(&self, user_id: UserId) -> StateResult<Option<Value>>;

    /// Stores the value, replacing any previous one.
    async fn save(&self, user_id: UserId, value: Value) -> StateResult<()>;
}

// ─── MemoryBackend ────────────────────────────────────────────────────────────

/// In-process backend; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<UserId, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns a copy of the stored value.
    pub fn get(&self, user_id: UserId) -> Option<Value> {
        self.records.read().get(&user_id).cloned()
    }
}

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn load(&self, user_id: UserId) -> StateResult<Option<Value>> {
        Ok(self.get(user_id))
    }

    async fn save(&self, user_id: UserId, value: Value) -> StateResult<()> {
        self.records.write().insert(user_id, value);
        Ok(())
    }
}

// ─── FileBackend ──────────────────────────────────────────────────────────────

/// Stores each user's record as `<data_dir>/<user_id>.json`.
///
/// Writes go to a temporary sibling file that is then renamed over the
/// target, so a crash never leaves a half-written record behind. Every
/// write has its own temporary file; concurrent saves for one user resolve
/// as last writer wins.
#[derive(Debug, Clone)]
pub struct FileBackend {
    data_dir: PathBuf,
    next_tmp: Arc<AtomicU64>,
}

impl FileBackend {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            next_tmp: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn record_path(&self, user_id: UserId) -> PathBuf {
        self.data_dir.join(format!("{user_id}.json"))
    }
}

#[async_trait]
impl StateBackend for FileBackend {
    async fn load(&self, user_id: UserId) -> StateResult<Option<Value>> {
        let path = self.record_path(user_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(path = %path.display(), "No stored state");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StateError::Corrupt { user_id, source })
    }

    async fn save(&self, user_id: UserId, value: Value) -> StateResult<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;

        let bytes = serde_json::to_vec_pretty(&value)
            .map_err(|source| StateError::Serialize { user_id, source })?;
        let path = self.record_path(user_id);
        let n = self.next_tmp.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .data_dir
            .join(format!("{user_id}.json.{}.{n}.tmp", std::process::id()));

        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), "Persisted user state");
        Ok(())
    }
}
