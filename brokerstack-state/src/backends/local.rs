//! Local file backend for state storage
//!
//! Stores state in a local JSON file (default: brokerstack.state.json) and
//! uses a sibling .lock file for locking.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::backend::{BackendError, BackendResult, StateBackend};
use crate::lock::{LockInfo, LockOperation};
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "brokerstack.state.json";

    /// State file in the current directory
    pub fn new() -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_STATE_FILE))
    }

    pub fn with_path(state_path: PathBuf) -> Self {
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    async fn read_lock(&self) -> BackendResult<Option<String>> {
        match tokio::fs::read_to_string(&self.lock_path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::Io(format!("Failed to read lock file: {}", e))),
        }
    }

    async fn remove_lock(&self) -> BackendResult<()> {
        tokio::fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to remove lock file: {}", e)))
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match tokio::fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BackendError::Io(format!(
                    "Failed to read state file: {}",
                    e
                )));
            }
        };

        let state: StateFile = serde_json::from_str(&content).map_err(|e| {
            BackendError::InvalidState(format!("Failed to parse state file: {}", e))
        })?;
        if state.version > StateFile::CURRENT_VERSION {
            return Err(BackendError::InvalidState(format!(
                "state version {} is newer than supported version {}",
                state.version,
                StateFile::CURRENT_VERSION
            )));
        }

        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        let content = serde_json::to_string_pretty(state).map_err(|e| {
            BackendError::Serialization(format!("Failed to serialize state: {}", e))
        })?;

        // atomic replace
        let tmp_path = self.state_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;
        tokio::fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to replace state file: {}", e)))?;

        log::debug!(
            "wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(&self, operation: LockOperation) -> BackendResult<LockInfo> {
        if let Some(content) = self.read_lock().await?
            && let Ok(existing_lock) = serde_json::from_str::<LockInfo>(&content)
        {
            if !existing_lock.is_stale() {
                return Err(BackendError::locked(&existing_lock));
            }
            log::warn!(
                "taking over stale {} lock {} from {}",
                existing_lock.operation,
                existing_lock.id,
                existing_lock.holder
            );
        }

        let lock = LockInfo::acquire(operation);
        let content = serde_json::to_string_pretty(&lock)
            .map_err(|e| BackendError::Serialization(format!("Failed to serialize lock: {}", e)))?;

        tokio::fs::write(&self.lock_path, content)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write lock file: {}", e)))?;

        Ok(lock)
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let content = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;

        let existing_lock: LockInfo = serde_json::from_str(&content)
            .map_err(|e| BackendError::InvalidState(format!("Failed to parse lock file: {}", e)))?;

        if existing_lock.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing_lock.id,
            });
        }

        self.remove_lock().await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        let content = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock_id.to_string()))?;

        if let Ok(existing_lock) = serde_json::from_str::<LockInfo>(&content)
            && existing_lock.id != lock_id
        {
            return Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing_lock.id,
            });
        }

        self.remove_lock().await
    }
}
