// src/services/store.rs
//! Whole-state persistence: hydrate once at startup, flush on every mutation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::session_manager::{AppearanceSettings, ChatSession};

/// Fixed namespace the persisted blob is stored under.
pub const STORAGE_NAMESPACE: &str = "chatbot-postman-storage";

/// Shape version of the persisted blob. Bumped on breaking tree changes;
/// older blobs are rejected rather than migrated.
pub const STATE_VERSION: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored state is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("stored state has version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PersistedState {
    pub version: u32,
    #[serde(default)]
    pub sessions: Vec<ChatSession>,
    #[serde(default)]
    pub active_session_id: Option<String>,
    #[serde(default)]
    pub settings: AppearanceSettings,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            sessions: Vec::new(),
            active_session_id: None,
            settings: AppearanceSettings::default(),
        }
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<PersistedState>, StoreError>;

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError>;
}

/// Single JSON file named after [`STORAGE_NAMESPACE`] inside a data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self { path: data_dir.as_ref().join(format!("{STORAGE_NAMESPACE}.json")) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }

        let state: PersistedState = serde_json::from_str(&content)?;
        if state.version != STATE_VERSION {
            return Err(StoreError::UnsupportedVersion { found: state.version, expected: STATE_VERSION });
        }
        Ok(Some(state))
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(state)?;

        // Write to a sibling temp file, then rename over the target.
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path).await?;
        tracing::debug!(path = %self.path.display(), bytes = json.len(), "state flushed");
        Ok(())
    }
}

/// Keeps the state in memory only. Used by tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Option<PersistedState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        Self { inner: RwLock::new(Some(state)) }
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        *self.inner.write().await = Some(state.clone());
        Ok(())
    }
}
