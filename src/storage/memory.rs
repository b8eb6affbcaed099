//! In-memory storage, for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::Result;
use crate::storage::Store;

/// `Store` kept in a map. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with one key.
    pub fn with(key: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let storage = Self::default();
        storage.put(key, bytes);
        storage
    }

    pub fn put(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), bytes.into());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl Store for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.put(key, bytes);
        Ok(())
    }
}
