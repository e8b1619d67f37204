//! Asynchronous secure storage of per-app user data.
//!
//! [`UserSecureManager`] turns a blocking [`SecureStore`] backend into a
//! non-blocking API built on [`ferrule`] futures: each call returns a
//! [`Future`](ferrule::Future) right away and the backend runs on a
//! background scheduler. The manager can be dropped at any time; operations
//! it had queued are abandoned without touching freed state.
//!
//! Two backends are included:
//!
//! - [`MemoryStore`] keeps data in process memory.
//! - [`FileStore`] keeps one file per app under a domain directory, with
//!   atomic replacement on write.
//!
//! Failures arrive through the future's error code, one of
//! [`SecureErrorCode`].
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use ferrule_secure::{MemoryStore, SecureErrorCode, UserSecureManager};
//!
//! let manager = UserSecureManager::new(MemoryStore::new());
//! manager.delete_user_data("app1");
//! let loaded = manager.load_user_data("app1");
//! loaded.wait(Duration::from_secs(5));
//!
//! let (code, _message) = loaded.error().unwrap();
//! assert_eq!(SecureErrorCode::from_i32(code), Some(SecureErrorCode::NoEntry));
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod file_store;
mod manager;
mod store;

pub use error::{SecureErrorCode, StoreError};
pub use file_store::{FileStore, ROOT_DIR_ENV};
pub use manager::UserSecureManager;
pub use store::{MemoryStore, SecureStore};
