//! One news sync cycle: discover, plan, deliver, record.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{DeliveryError, Result};
use crate::models::{ContentItem, NewsConfig};
use crate::pipeline::diff::{SyncMode, plan_delivery};
use crate::services::{CandidateSource, Sink};
use crate::storage::StateStore;
use crate::utils::clock::Clock;
use crate::utils::url::HostAllowList;

/// Summary of a sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Candidates gathered from all sources, before filtering
    pub candidates: usize,
    pub unseen: usize,
    /// Unseen items left out by the cold-run cap
    pub held_back: usize,
    pub delivered: usize,
    /// Delivered on the second attempt, without the image
    pub degraded: usize,
    pub failed: usize,
}

impl SyncReport {
    fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            candidates: 0,
            unseen: 0,
            held_back: 0,
            delivered: 0,
            degraded: 0,
            failed: 0,
        }
    }
}

enum Delivery {
    Delivered,
    Degraded,
    Failed,
}

/// Clears the running flag when a cycle ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Delivers new items from the candidate sources to the sink, at most once
/// each.
pub struct NewsWatcher {
    sources: Vec<Arc<dyn CandidateSource>>,
    sink: Arc<dyn Sink>,
    state: StateStore,
    clock: Arc<dyn Clock>,
    allow: HostAllowList,
    backfill_max: usize,
    running: AtomicBool,
}

impl NewsWatcher {
    pub fn new(
        sources: Vec<Arc<dyn CandidateSource>>,
        sink: Arc<dyn Sink>,
        state: StateStore,
        clock: Arc<dyn Clock>,
        config: &NewsConfig,
    ) -> Self {
        Self {
            sources,
            sink,
            state,
            clock,
            allow: config.allow_list(),
            backfill_max: config.backfill_max,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one cycle.
    ///
    /// Returns `Ok(None)` without doing anything when a cycle is already in
    /// progress. Source and delivery failures are logged and contained; only
    /// a failure to persist the ledger is returned as an error.
    pub async fn sync(&self, mode: SyncMode) -> Result<Option<SyncReport>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::info!("Sync already in progress; skipping");
            return Ok(None);
        }
        let _guard = RunningGuard(&self.running);

        let mut report = SyncReport::new(mode);
        let mut ledger = self.state.load_ledger().await;

        let mut candidates = Vec::new();
        for source in &self.sources {
            match source.candidates().await {
                Ok(items) => candidates.extend(items),
                Err(e) => log::warn!("Candidate source failed: {}", e),
            }
        }
        report.candidates = candidates.len();

        let plan = plan_delivery(candidates, &ledger, &self.allow, mode, self.backfill_max);
        report.unseen = plan.unseen;
        report.held_back = plan.held_back;
        log::info!(
            "Sync ({:?}): {} candidates, {} unseen, {} to deliver",
            mode,
            report.candidates,
            plan.unseen,
            plan.items.len()
        );

        for item in &plan.items {
            match self.deliver(item).await {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Degraded => {
                    report.delivered += 1;
                    report.degraded += 1;
                }
                Delivery::Failed => {
                    report.failed += 1;
                    continue;
                }
            }
            ledger.record(&item.url);
        }

        ledger.last_checked_at = Some(self.clock.now());
        self.state.save_ledger(&ledger).await?;

        Ok(Some(report))
    }

    /// Deliver one item, retrying once without its image when the sink
    /// blames the image.
    async fn deliver(&self, item: &ContentItem) -> Delivery {
        match self.sink.deliver(item).await {
            Ok(()) => {
                log::info!("Delivered {}", item.url);
                Delivery::Delivered
            }
            Err(DeliveryError::Degradable(reason)) => {
                log::warn!("Delivery of {} degraded ({}); retrying without image", item.url, reason);
                match self.sink.deliver(&item.without_image()).await {
                    Ok(()) => {
                        log::info!("Delivered {} without image", item.url);
                        Delivery::Degraded
                    }
                    Err(e) => {
                        log::warn!("Failed to deliver {} even without image: {}", item.url, e);
                        Delivery::Failed
                    }
                }
            }
            Err(e @ DeliveryError::Terminal(_)) => {
                log::warn!("Failed to deliver {}: {}", item.url, e);
                Delivery::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::{PersistedLedger, StorageConfig, parse_published};
    use crate::storage::{MemoryStorage, Store};
    use crate::utils::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct StaticSource(std::result::Result<Vec<ContentItem>, FetchError>);

    #[async_trait]
    impl CandidateSource for StaticSource {
        async fn candidates(&self) -> std::result::Result<Vec<ContentItem>, FetchError> {
            self.0.clone()
        }
    }

    /// Records deliveries. Items with an image are rejected as degradable;
    /// URLs listed in `terminal` always fail.
    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<ContentItem>>,
        attempts: Mutex<usize>,
        terminal: Vec<String>,
        gate: Option<Arc<Notify>>,
    }

    impl RecordingSink {
        fn titles(&self) -> Vec<String> {
            self.delivered
                .lock()
                .unwrap()
                .iter()
                .map(|i| i.title.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn deliver(&self, item: &ContentItem) -> std::result::Result<(), DeliveryError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            *self.attempts.lock().unwrap() += 1;
            if self.terminal.contains(&item.url) {
                return Err(DeliveryError::Terminal("rejected".into()));
            }
            if item.image_url.is_some() {
                return Err(DeliveryError::Degradable("Invalid Form Body: image".into()));
            }
            self.delivered.lock().unwrap().push(item.clone());
            Ok(())
        }
    }

    fn item(day: u32) -> ContentItem {
        ContentItem::new(&format!("https://smite2.live/news/day-{day:02}/"), format!("{day:02}"))
            .with_published(parse_published(&format!("2024-01-{day:02}")))
    }

    struct Harness {
        watcher: NewsWatcher,
        sink: Arc<RecordingSink>,
        memory: Arc<MemoryStorage>,
        state: StateStore,
    }

    fn harness(
        sources: Vec<Arc<dyn CandidateSource>>,
        sink: RecordingSink,
        memory: MemoryStorage,
        backfill_max: usize,
    ) -> Harness {
        let sink = Arc::new(sink);
        let memory = Arc::new(memory);
        let store: Arc<dyn Store> = memory.clone();
        let state = StateStore::new(store, &StorageConfig::default());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap()));
        let config = NewsConfig {
            backfill_max,
            ..NewsConfig::default()
        };
        let watcher = NewsWatcher::new(sources, sink.clone(), state.clone(), clock, &config);
        Harness {
            watcher,
            sink,
            memory,
            state,
        }
    }

    fn source(items: Vec<ContentItem>) -> Arc<dyn CandidateSource> {
        Arc::new(StaticSource(Ok(items)))
    }

    #[tokio::test]
    async fn test_second_run_delivers_nothing() {
        let h = harness(
            vec![source(vec![item(3), item(1), item(2)])],
            RecordingSink::default(),
            MemoryStorage::new(),
            10,
        );

        let first = h.watcher.sync(SyncMode::Warm).await.unwrap().unwrap();
        assert_eq!(first.delivered, 3);
        assert_eq!(h.sink.titles(), ["01", "02", "03"]);

        let second = h.watcher.sync(SyncMode::Warm).await.unwrap().unwrap();
        assert_eq!(second.delivered, 0);
        assert_eq!(second.unseen, 0);
        assert_eq!(h.sink.titles().len(), 3);
    }

    #[tokio::test]
    async fn test_cold_run_backfills_newest_only() {
        let items = (1..=10).map(item).collect();
        let h = harness(vec![source(items)], RecordingSink::default(), MemoryStorage::new(), 3);

        let report = h.watcher.sync(SyncMode::Cold).await.unwrap().unwrap();
        assert_eq!(h.sink.titles(), ["08", "09", "10"]);
        assert_eq!(report.held_back, 7);

        let ledger = h.state.load_ledger().await;
        assert_eq!(ledger.len(), 3);
        assert!(!ledger.contains(&item(1).url));
    }

    #[tokio::test]
    async fn test_degraded_retry_drops_image_and_records() {
        let with_image = item(5).with_image(Some("https://cdn.test/x.png".into()));
        let h = harness(
            vec![source(vec![with_image.clone()])],
            RecordingSink::default(),
            MemoryStorage::new(),
            10,
        );

        let report = h.watcher.sync(SyncMode::Warm).await.unwrap().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.degraded, 1);
        assert!(h.sink.delivered.lock().unwrap()[0].image_url.is_none());
        assert!(h.state.load_ledger().await.contains(&with_image.url));
    }

    #[tokio::test]
    async fn test_failed_item_does_not_block_others() {
        let sink = RecordingSink {
            terminal: vec![item(2).url],
            ..RecordingSink::default()
        };
        let h = harness(vec![source(vec![item(1), item(2), item(3)])], sink, MemoryStorage::new(), 10);

        let report = h.watcher.sync(SyncMode::Warm).await.unwrap().unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);

        let ledger = h.state.load_ledger().await;
        assert!(ledger.contains(&item(1).url));
        assert!(!ledger.contains(&item(2).url));
        assert!(ledger.contains(&item(3).url));
        assert_eq!(
            ledger.last_checked_at,
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_failing_source_is_contained() {
        let h = harness(
            vec![
                Arc::new(StaticSource(Err(FetchError::Timeout))) as Arc<dyn CandidateSource>,
                source(vec![item(1)]),
            ],
            RecordingSink::default(),
            MemoryStorage::new(),
            10,
        );

        let report = h.watcher.sync(SyncMode::Warm).await.unwrap().unwrap();
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_corrupt_ledger_starts_empty_and_is_rewritten() {
        let h = harness(
            vec![source(vec![item(1)])],
            RecordingSink::default(),
            MemoryStorage::with("last_news.json", "\u{0}garbage"),
            10,
        );

        let report = h.watcher.sync(SyncMode::Warm).await.unwrap().unwrap();
        assert_eq!(report.delivered, 1);

        let saved: PersistedLedger =
            serde_json::from_slice(&h.memory.get("last_news.json").unwrap()).unwrap();
        assert!(saved.contains(&item(1).url));
    }

    #[tokio::test]
    async fn test_overlapping_sync_is_a_no_op() {
        let gate = Arc::new(Notify::new());
        let sink = RecordingSink {
            gate: Some(gate.clone()),
            ..RecordingSink::default()
        };
        let h = harness(vec![source(vec![item(1)])], sink, MemoryStorage::new(), 10);

        let (first, second) = tokio::join!(h.watcher.sync(SyncMode::Warm), async {
            let second = h.watcher.sync(SyncMode::Warm).await;
            gate.notify_one();
            second
        });

        assert_eq!(first.unwrap().unwrap().delivered, 1);
        assert!(second.unwrap().is_none());
        assert!(!h.watcher.is_running());
        assert_eq!(*h.sink.attempts.lock().unwrap(), 1);
    }
}
