//! Brokerstack State Management
//!
//! Records the provider identifier and live attributes of every provisioned
//! resource so a later run can update in place or tear down what it built.
//!
//! - **StateFile**: the persisted record of one stack
//! - **StateBackend**: trait for state storage backends
//! - **LockInfo**: who holds the state and for which operation
//!
//! ```ignore
//! let backend = LocalBackend::new();
//! let lock = backend.acquire_lock(LockOperation::Apply).await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! // ... apply ...
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendError, BackendResult, StateBackend};
pub use backends::LocalBackend;
pub use lock::{LockInfo, LockOperation};
pub use state::{ResourceState, StateFile};
