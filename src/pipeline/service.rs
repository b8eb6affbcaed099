//! Wiring and lifecycle of the long-running watcher.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::models::Config;
use crate::pipeline::diff::SyncMode;
use crate::pipeline::refresh::NameRefresher;
use crate::pipeline::sync::NewsWatcher;
use crate::services::{CandidateSource, LogSink, NewsSource, Sink, TierService, WebhookSink};
use crate::storage::{LocalStorage, StateStore, Store};
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::http::{FetchOptions, Fetcher, ReqwestClient};

/// Everything the commands need, built from one configuration.
pub struct Components {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub tiers: Arc<TierService>,
    pub state: StateStore,
    pub watcher: Arc<NewsWatcher>,
    pub names: Arc<NameRefresher>,
}

impl Components {
    /// Build the production graph: reqwest, the local filesystem and the
    /// system clock. Without a webhook URL items go to the log.
    pub fn from_config(config: Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let client = Arc::new(ReqwestClient::new(&config.fetch)?);
        let fetcher = Arc::new(Fetcher::new(
            client,
            Arc::clone(&clock),
            FetchOptions::from_config(&config.fetch),
        ));

        let store: Arc<dyn Store> = Arc::new(LocalStorage::new(config.storage.dir.clone()));
        let state = StateStore::new(store, &config.storage);

        let sink: Arc<dyn Sink> = match &config.sink.webhook_url {
            Some(url) => Arc::new(WebhookSink::new(url.clone(), &config.fetch)?),
            None => Arc::new(LogSink),
        };
        let source: Arc<dyn CandidateSource> =
            Arc::new(NewsSource::new(Arc::clone(&fetcher), config.news.clone()));

        let tiers = Arc::new(TierService::new(
            fetcher,
            Arc::clone(&clock),
            config.tiers.clone(),
        ));
        let watcher = Arc::new(NewsWatcher::new(
            vec![source],
            sink,
            state.clone(),
            Arc::clone(&clock),
            &config.news,
        ));
        let names = Arc::new(NameRefresher::new(
            Arc::clone(&tiers),
            state.clone(),
            Arc::clone(&clock),
        ));

        Ok(Self {
            config,
            clock,
            tiers,
            state,
            watcher,
            names,
        })
    }

    /// Start the background loops with the configured intervals.
    pub async fn start(&self) -> Service {
        Service::start(
            Arc::clone(&self.watcher),
            Arc::clone(&self.names),
            self.config.news.sync_interval(),
            self.config.tiers.refresh_interval(),
        )
        .await
    }
}

/// Running sync and refresh loops.
pub struct Service {
    names: Arc<NameRefresher>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Service {
    /// Load the name index, run a cold sync, then start both loops.
    ///
    /// The sync loop first fires one `sync_every` after start. The refresh
    /// loop fires immediately and then every `refresh_every`.
    pub async fn start(
        watcher: Arc<NewsWatcher>,
        names: Arc<NameRefresher>,
        sync_every: Duration,
        refresh_every: Duration,
    ) -> Self {
        names.load().await;

        match watcher.sync(SyncMode::Cold).await {
            Ok(Some(report)) => log::info!("Cold sync delivered {} items", report.delivered),
            Ok(None) => {}
            Err(e) => log::error!("Cold sync failed: {}", e),
        }

        let (shutdown, signal) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(sync_loop(watcher, sync_every, signal.clone())),
            tokio::spawn(refresh_loop(Arc::clone(&names), refresh_every, signal)),
        ];

        log::info!(
            "Watcher started: sync every {}s, refresh every {}s",
            sync_every.as_secs(),
            refresh_every.as_secs()
        );
        Self {
            names,
            shutdown,
            tasks,
        }
    }

    /// Stop both loops, wait for them and write the final name index.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                log::error!("Background task ended abnormally: {}", e);
            }
        }
        self.names.flush().await?;
        log::info!("Watcher stopped");
        Ok(())
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn sync_loop(watcher: Arc<NewsWatcher>, period: Duration, mut signal: watch::Receiver<bool>) {
    let mut ticker = ticker(period);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match watcher.sync(SyncMode::Warm).await {
                    Ok(Some(report)) if report.delivered > 0 => {
                        log::info!("Sync delivered {} items", report.delivered);
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Sync failed: {}", e),
                }
            }
            _ = signal.changed() => break,
        }
    }
}

async fn refresh_loop(names: Arc<NameRefresher>, period: Duration, mut signal: watch::Receiver<bool>) {
    let mut ticker = ticker(period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = names.refresh().await {
                    log::error!("Name refresh failed: {}", e);
                }
            }
            _ = signal.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeliveryError, FetchError};
    use crate::models::{ContentItem, NameIndex, NewsConfig, StorageConfig, TiersConfig};
    use crate::storage::MemoryStorage;
    use crate::utils::clock::ManualClock;
    use crate::utils::testing::{StubClient, fetcher};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const TIERS: &str = "https://tiers.test/tier-list";

    #[derive(Default)]
    struct SharedSource(Mutex<Vec<ContentItem>>);

    #[async_trait]
    impl CandidateSource for SharedSource {
        async fn candidates(&self) -> std::result::Result<Vec<ContentItem>, FetchError> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct CountingSink(Mutex<Vec<String>>);

    #[async_trait]
    impl Sink for CountingSink {
        async fn deliver(&self, item: &ContentItem) -> std::result::Result<(), DeliveryError> {
            self.0.lock().unwrap().push(item.url.clone());
            Ok(())
        }
    }

    fn article(slug: &str) -> ContentItem {
        ContentItem::new(&format!("https://smite2.live/news/{slug}/"), slug)
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle() {
        let clock = Arc::new(ManualClock::default());
        let memory = Arc::new(MemoryStorage::new());
        let store: Arc<dyn Store> = memory.clone();
        let state = StateStore::new(store, &StorageConfig::default());

        let source = Arc::new(SharedSource::default());
        source.0.lock().unwrap().push(article("first"));
        let sink = Arc::new(CountingSink::default());
        let watcher = Arc::new(NewsWatcher::new(
            vec![source.clone() as Arc<dyn CandidateSource>],
            sink.clone(),
            state.clone(),
            clock.clone(),
            &NewsConfig::default(),
        ));

        let client = Arc::new(
            StubClient::new().page(TIERS, "<script>resolve(1, () => [[{god:\"Agni\"}]])</script>"),
        );
        let tiers = Arc::new(TierService::new(
            Arc::new(fetcher(client.clone())),
            clock.clone(),
            TiersConfig {
                url: TIERS.to_string(),
                roles: vec!["all".into()],
                ..TiersConfig::default()
            },
        ));
        let names = Arc::new(NameRefresher::new(tiers, state.clone(), clock.clone()));

        let sync_every = Duration::from_secs(60);
        let service = Service::start(watcher, names.clone(), sync_every, Duration::from_secs(300)).await;
        assert_eq!(sink.0.lock().unwrap().len(), 1);

        source.0.lock().unwrap().push(article("second"));
        tokio::time::sleep(sync_every + Duration::from_secs(1)).await;
        assert_eq!(
            *sink.0.lock().unwrap(),
            ["https://smite2.live/news/first/", "https://smite2.live/news/second/"]
        );
        assert_eq!(names.snapshot().await.names("all"), ["Agni"]);

        service.shutdown().await.unwrap();

        let saved: NameIndex = serde_json::from_slice(&memory.get("names.json").unwrap()).unwrap();
        assert_eq!(saved.names("all"), ["Agni"]);
        assert_eq!(state.load_ledger().await.len(), 2);
    }
}
