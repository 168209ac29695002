//! State backend selected by configuration.

use async_trait::async_trait;
use serde_json::Value;
use switchyard_core::UserId;
use switchyard_framework::{FileBackend, MemoryBackend, StateBackend, StateResult};
use tracing::info;

use crate::config::{ConfigError, ConfigResult, StorageKind, StorageSettings};

/// A [`StateBackend`] chosen at startup from [`StorageSettings`].
#[derive(Debug)]
pub enum ConfiguredBackend {
    Memory(MemoryBackend),
    File(FileBackend),
}

impl ConfiguredBackend {
    /// Builds the backend described by `settings`.
    pub fn from_settings(settings: &StorageSettings) -> ConfigResult<Self> {
        match settings.backend {
            StorageKind::Memory => {
                info!("Using in-memory user state");
                Ok(Self::Memory(MemoryBackend::new()))
            }
            StorageKind::File => {
                let dir = settings
                    .resolved_data_dir()
                    .ok_or_else(|| ConfigError::missing_field("storage.data_dir"))?;
                info!(data_dir = %dir.display(), "Using file-backed user state");
                Ok(Self::File(FileBackend::new(dir)))
            }
        }
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            Self::Memory(_) => StorageKind::Memory,
            Self::File(_) => StorageKind::File,
        }
    }
}

#[async_trait]
impl StateBackend for ConfiguredBackend {
    async fn load(&self, user_id: UserId) -> StateResult<Option<Value>> {
        match self {
            Self::Memory(backend) => backend.load(user_id).await,
            Self::File(backend) => backend.load(user_id).await,
        }
    }

    async fn save(&self, user_id: UserId, value: Value) -> StateResult<()> {
        match self {
            Self::Memory(backend) => backend.save(user_id, value).await,
            Self::File(backend) => backend.save(user_id, value).await,
        }
    }
}
