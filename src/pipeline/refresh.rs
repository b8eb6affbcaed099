//! Periodic rebuild of the per-role name index.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{Result, ScrapeError};
use crate::models::{MAX_SUGGESTIONS, NameIndex};
use crate::services::TierService;
use crate::storage::StateStore;
use crate::utils::clock::Clock;

/// Outcome of one refresh.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    pub failed: Vec<(String, ScrapeError)>,
}

/// Keeps the name index in memory and on disk.
pub struct NameRefresher {
    tiers: Arc<TierService>,
    state: StateStore,
    clock: Arc<dyn Clock>,
    index: RwLock<NameIndex>,
}

impl NameRefresher {
    pub fn new(tiers: Arc<TierService>, state: StateStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            tiers,
            state,
            clock,
            index: RwLock::new(NameIndex::default()),
        }
    }

    /// Replace the in-memory index with the persisted one.
    pub async fn load(&self) {
        let loaded = self.state.load_names().await;
        log::info!(
            "Loaded name index ({} roles, updated {:?})",
            loaded.categories.len(),
            loaded.updated_at
        );
        *self.index.write().await = loaded;
    }

    pub async fn snapshot(&self) -> NameIndex {
        self.index.read().await.clone()
    }

    /// Rebuild every configured role and save the result once.
    ///
    /// Each role is fetched on its own; a failing role keeps its previous
    /// names and does not stop the others.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();
        let mut next = self.snapshot().await;

        for role in &self.tiers.config().roles {
            match self.tiers.records(role).await {
                Ok(records) => {
                    next.update(role, &records);
                    report.refreshed.push(role.clone());
                }
                Err(e) => {
                    log::warn!("Name refresh for role {} failed: {}", role, e);
                    report.failed.push((role.clone(), e));
                }
            }
        }

        if !report.refreshed.is_empty() {
            next.updated_at = Some(self.clock.now());
        }
        self.state.save_names(&next).await?;
        *self.index.write().await = next;

        log::info!(
            "Name index refreshed: {} ok, {} failed",
            report.refreshed.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Up to 25 names matching `query` for a role.
    ///
    /// Answers from the index. A role the index has never seen is fetched
    /// live once and added to the in-memory index.
    pub async fn suggest(&self, role: &str, query: &str) -> Vec<String> {
        {
            let index = self.index.read().await;
            if !index.names(role).is_empty() {
                return index.suggest(role, query, MAX_SUGGESTIONS);
            }
        }

        match self.tiers.records(role).await {
            Ok(records) => {
                let mut index = self.index.write().await;
                index.update(role, &records);
                index.suggest(role, query, MAX_SUGGESTIONS)
            }
            Err(e) => {
                log::warn!("No names for role {}: {}", role, e);
                Vec::new()
            }
        }
    }

    /// Save the in-memory index as is.
    pub async fn flush(&self) -> Result<()> {
        let snapshot = self.snapshot().await;
        self.state.save_names(&snapshot).await
    }
}
