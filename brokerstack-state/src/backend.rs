//! Where the broker stack state lives, and what can go wrong reaching it

use async_trait::async_trait;
use thiserror::Error;

use crate::lock::{LockInfo, LockOperation};
use crate::state::StateFile;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(
        "stack state is held by {holder} for {operation} ({minutes_left} min left); \
         if that run is gone, use `force-unlock {lock_id}`"
    )]
    Locked {
        lock_id: String,
        holder: String,
        operation: LockOperation,
        minutes_left: i64,
    },

    #[error("no state lock {0} to remove")]
    LockNotFound(String),

    /// The lock on disk belongs to another run
    #[error("state lock is {actual}, not {expected}")]
    LockMismatch { expected: String, actual: String },

    #[error("unreadable state file: {0}")]
    InvalidState(String),

    /// State was written for another prefix/stage
    #[error("State belongs to stack {actual}, not {expected}")]
    StackMismatch { expected: String, actual: String },

    #[error("state storage: {0}")]
    Io(String),

    #[error("state encoding: {0}")]
    Serialization(String),
}

impl BackendError {
    pub fn locked(lock: &LockInfo) -> Self {
        Self::Locked {
            lock_id: lock.id.clone(),
            holder: lock.holder.clone(),
            operation: lock.operation,
            minutes_left: lock.minutes_left(),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage for one stack's state file and its lock
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// `None` until the first apply records something
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Persist `state`; callers bump the serial first
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Take the lock for `operation`, replacing a stale one.
    ///
    /// A live lock held by another run is a `Locked` error.
    async fn acquire_lock(&self, operation: LockOperation) -> BackendResult<LockInfo>;

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()>;

    /// Remove the lock with `lock_id` whatever its age
    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;
}
