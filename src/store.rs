/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Device-local key-value storage seam.
//!
//! The host app supplies the real store (secure storage, preferences, a file).
//! [`MemoryStore`] keeps everything in process and backs the tests.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use hashbrown::HashMap;

/// Failure reported by a [`KeyValueStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// The write was refused (quota, permissions).
    #[error("storage write rejected for `{key}`: {reason}")]
    WriteRejected {
        /// Key being written.
        key: String,
        /// Store-specific reason.
        reason: String,
    },
}

/// Async string key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Overwrite a value.
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    /// Delete a value. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store over a `hashbrown` map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Write a raw value synchronously, bypassing serialisation. Test and migration helper.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().insert(key.into(), value.into());
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.lock().insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_overwrite_and_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await, Ok(None));

        store.set("k", "one".into()).await.unwrap();
        store.set("k", "two".into()).await.unwrap();
        assert_eq!(store.get("k").await, Ok(Some("two".to_string())));
        assert_eq!(store.len(), 1);

        store.remove("k").await.unwrap();
        store.remove("k").await.unwrap();
        assert!(store.is_empty());
    }
}
