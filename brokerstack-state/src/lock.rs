//! Advisory lock over the broker stack state
//!
//! `apply` and `destroy` hold it for the whole run. The lock file names the
//! operator and the command, so a second operator can see who is
//! provisioning the broker and which id to pass to `force-unlock` after a
//! crashed run.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Long enough for load balancers to provision and the Fargate service to settle
pub const DEFAULT_LOCK_TIMEOUT_SECS: i64 = 3600;

/// Commands that change the stack and therefore take the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockOperation {
    Apply,
    Destroy,
}

impl fmt::Display for LockOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockOperation::Apply => write!(f, "apply"),
            LockOperation::Destroy => write!(f, "destroy"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// What `force-unlock` expects
    pub id: String,
    pub operation: LockOperation,
    /// `user@host` of the run holding the lock
    pub holder: String,
    pub acquired: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl LockInfo {
    pub fn acquire(operation: LockOperation) -> Self {
        Self::for_duration(operation, Duration::seconds(DEFAULT_LOCK_TIMEOUT_SECS))
    }

    pub fn for_duration(operation: LockOperation, ttl: Duration) -> Self {
        let acquired = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation,
            holder: operator(),
            acquired,
            expires: acquired + ttl,
        }
    }

    /// A stale lock belongs to a run that died without releasing it
    pub fn is_stale(&self) -> bool {
        Utc::now() > self.expires
    }

    /// Whole minutes until the lock lapses, zero once stale
    pub fn minutes_left(&self) -> i64 {
        (self.expires - Utc::now()).num_minutes().max(0)
    }
}

fn operator() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}@{}", user, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_lock_names_its_holder() {
        let lock = LockInfo::acquire(LockOperation::Apply);
        assert_eq!(lock.operation, LockOperation::Apply);
        assert!(!lock.id.is_empty());
        assert!(lock.holder.contains('@'));
        assert!(!lock.is_stale());
        assert!(lock.minutes_left() >= 59);
    }

    #[test]
    fn lapsed_lock_is_stale() {
        let lock = LockInfo::for_duration(LockOperation::Destroy, Duration::seconds(-1));
        assert!(lock.is_stale());
        assert_eq!(lock.minutes_left(), 0);
    }

    #[test]
    fn operation_is_stored_lowercase() {
        let lock = LockInfo::acquire(LockOperation::Destroy);
        let json = serde_json::to_value(&lock).unwrap();
        assert_eq!(json["operation"], "destroy");
        let back: LockInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, lock.id);
        assert_eq!(back.operation, LockOperation::Destroy);
    }
}
