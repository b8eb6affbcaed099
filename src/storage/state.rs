//! Tolerant load/save of the ledger and the name index.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::models::{NameIndex, PersistedLedger, StorageConfig};
use crate::storage::Store;

/// Reads and writes the two state documents.
///
/// Loading never fails: a missing document is an empty baseline, and one that
/// cannot be read or parsed is logged and treated the same way. Saving
/// rewrites the whole document.
#[derive(Clone)]
pub struct StateStore {
    store: Arc<dyn Store>,
    ledger_key: String,
    names_key: String,
}

impl StateStore {
    pub fn new(store: Arc<dyn Store>, config: &StorageConfig) -> Self {
        Self {
            store,
            ledger_key: config.ledger_file.clone(),
            names_key: config.names_file.clone(),
        }
    }

    async fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let bytes = match self.store.read(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                log::info!("No {} yet; starting empty", key);
                return T::default();
            }
            Err(e) => {
                log::warn!("Failed to read {}: {}; starting empty", key, e);
                return T::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Corrupt {} ({}); starting empty", key, e);
                T::default()
            }
        }
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.store.write(key, &bytes).await
    }

    pub async fn load_ledger(&self) -> PersistedLedger {
        self.load_or_default::<PersistedLedger>(&self.ledger_key)
            .await
            .normalized()
    }

    pub async fn save_ledger(&self, ledger: &PersistedLedger) -> Result<()> {
        self.save(&self.ledger_key, ledger).await
    }

    pub async fn load_names(&self) -> NameIndex {
        self.load_or_default(&self.names_key).await
    }

    pub async fn save_names(&self, names: &NameIndex) -> Result<()> {
        self.save(&self.names_key, names).await
    }

    /// Mark `url` as delivered without delivering it.
    ///
    /// Returns `false` when the ledger already held it.
    pub async fn seed(&self, url: &str) -> Result<bool> {
        let mut ledger = self.load_ledger().await;
        let added = ledger.record(url);
        if added {
            self.save_ledger(&ledger).await?;
            log::info!("Seeded ledger with {}", url);
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScrapedRecord;
    use crate::storage::{LocalStorage, MemoryStorage};
    use tempfile::TempDir;

    fn state(store: Arc<dyn Store>) -> StateStore {
        StateStore::new(store, &StorageConfig::default())
    }

    #[tokio::test]
    async fn test_missing_documents_are_empty() {
        let state = state(Arc::new(MemoryStorage::new()));
        assert!(state.load_ledger().await.is_empty());
        assert!(state.load_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_ledger_is_empty_and_rewritable() {
        let memory = Arc::new(MemoryStorage::with("last_news.json", "{ not json"));
        let state = state(memory.clone());

        let mut ledger = state.load_ledger().await;
        assert!(ledger.is_empty());

        ledger.record("https://smite2.live/news/a");
        state.save_ledger(&ledger).await.unwrap();

        let reloaded = state.load_ledger().await;
        assert!(reloaded.contains("https://smite2.live/news/a/"));
        let raw: serde_json::Value =
            serde_json::from_slice(&memory.get("last_news.json").unwrap()).unwrap();
        assert_eq!(raw["posted"][0], "https://smite2.live/news/a/");
    }

    #[tokio::test]
    async fn test_names_round_trip_on_disk() {
        let tmp = TempDir::new().unwrap();
        let state = state(Arc::new(LocalStorage::new(tmp.path())));

        let record = ScrapedRecord {
            name: "Agni".into(),
            tier: None,
            win_rate: None,
            pick_rate: None,
            ban_rate: None,
            matches: None,
        };
        let mut names = NameIndex::default();
        names.update("mid", &[record]);
        state.save_names(&names).await.unwrap();

        assert_eq!(state.load_names().await, names);
        assert!(tmp.path().join("names.json").exists());
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let state = state(Arc::new(MemoryStorage::new()));
        assert!(state.seed("https://smite2.live/news/Seeded").await.unwrap());
        assert!(!state.seed("https://smite2.live/news/seeded/").await.unwrap());
        assert_eq!(state.load_ledger().await.len(), 1);
    }
}
