//! Keel State Management
//!
//! Persists the state of managed resources between runs and guards it with
//! an advisory lock.
//!
//! - **StateFile**: serial, lineage and every managed resource with its identifier
//! - **StateBackend**: storage for the state file and its lock
//! - **LockInfo**: who holds the lock, for which operation, until when
//!
//! ```ignore
//! use keel_state::{create_backend, BackendConfig};
//!
//! let backend = create_backend(&BackendConfig::local(), Path::new("."))?;
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! // ... apply changes ...
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
