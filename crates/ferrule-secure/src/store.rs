//! The backend interface and an in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StoreError;

/// Synchronous key/value backend for user data.
///
/// Managers only call it from scheduler tasks, never from the caller's
/// thread, so implementations may block.
pub trait SecureStore: Send + Sync {
    /// Reads the data stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if nothing is stored under `key`.
    fn load(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Stores `data` under `key`, replacing what was there.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot persist the data.
    fn save(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Removes whatever is stored under `key`. Removing a missing key
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot remove the data.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Removes everything this store holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot remove the data.
    fn delete_all(&self) -> Result<(), StoreError>;
}

impl<S: SecureStore + ?Sized> SecureStore for Arc<S> {
    fn load(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        (**self).load(key)
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        (**self).save(key, data)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        (**self).delete_all()
    }
}

/// Process-local store. Data is lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns `true` if `key` has data.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

impl SecureStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.entries
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        self.entries.lock().clear();
        Ok(())
    }
}
