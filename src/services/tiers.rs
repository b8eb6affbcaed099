// src/services/tiers.rs

//! Tier list service.
//!
//! Fetches the tier page per role, decodes the embedded records and keeps
//! them in a short-TTL cache. Icons live in a separate long-TTL cache and
//! their downloads share a bounded pool of permits.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::cache::TtlCache;
use crate::error::{FetchError, ScrapeError};
use crate::models::{ScrapedRecord, TierList, TiersConfig, did_you_mean, find_record, sorted_names};
use crate::services::extract::decode_records;
use crate::utils::clock::Clock;
use crate::utils::http::Fetcher;

/// Maximum "did you mean" names offered for a failed lookup.
pub const MAX_DID_YOU_MEAN: usize = 10;

/// Shared record batch for one role.
pub type Records = Arc<Vec<ScrapedRecord>>;

/// Outcome of looking a subject up by name.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(ScrapedRecord),
    Missing { suggestions: Vec<String> },
}

/// Cached access to tier records and icons.
pub struct TierService {
    fetcher: Arc<Fetcher>,
    config: TiersConfig,
    records: TtlCache<String, Records, ScrapeError>,
    icons: TtlCache<String, Arc<Vec<u8>>, FetchError>,
    icon_permits: Arc<Semaphore>,
}

impl TierService {
    pub fn new(fetcher: Arc<Fetcher>, clock: Arc<dyn Clock>, config: TiersConfig) -> Self {
        let records = TtlCache::new(config.data_ttl(), Arc::clone(&clock));
        let icons = TtlCache::new(config.icon_ttl(), clock);
        let icon_permits = Arc::new(Semaphore::new(config.max_icon_fetches.max(1)));

        Self {
            fetcher,
            config,
            records,
            icons,
            icon_permits,
        }
    }

    pub fn config(&self) -> &TiersConfig {
        &self.config
    }

    /// Records for a role, from cache when fresh.
    pub async fn records(&self, role: &str) -> Result<Records, ScrapeError> {
        let role = role.trim().to_lowercase();
        let url = self.config.role_url(&role);
        let fetcher = Arc::clone(&self.fetcher);

        self.records
            .get_or_fetch(role, move || Self::fetch_records(fetcher, url))
            .await
    }

    async fn fetch_records(fetcher: Arc<Fetcher>, url: String) -> Result<Records, ScrapeError> {
        let html = fetcher.fetch_text(&url).await?;
        let records = match decode_records(&html) {
            Ok(records) => records,
            Err(error) => {
                log::warn!("Failed to decode tier data from {}: {}", url, error);
                return Err(error.into());
            }
        };

        log::info!("Decoded {} tier records from {}", records.len(), url);
        Ok(Arc::new(records))
    }

    /// Sorted, de-duplicated subject names for a role.
    pub async fn names(&self, role: &str) -> Result<Vec<String>, ScrapeError> {
        let records = self.records(role).await?;
        Ok(sorted_names(&records))
    }

    pub async fn tier_list(&self, role: &str) -> Result<TierList, ScrapeError> {
        let records = self.records(role).await?;
        Ok(TierList::from_records(&records))
    }

    /// Find one subject by name within a role.
    pub async fn lookup(&self, role: &str, query: &str) -> Result<Lookup, ScrapeError> {
        let records = self.records(role).await?;
        if let Some(record) = find_record(&records, query) {
            return Ok(Lookup::Found(record.clone()));
        }

        let names = sorted_names(&records);
        Ok(Lookup::Missing {
            suggestions: did_you_mean(&names, query, MAX_DID_YOU_MEAN),
        })
    }

    /// Icon bytes for a slug, or `None` when it cannot be fetched.
    ///
    /// Failures are not cached, so the next request tries again.
    pub async fn icon(&self, slug: &str) -> Option<Arc<Vec<u8>>> {
        let url = self.config.icon_url(slug);
        let fetcher = Arc::clone(&self.fetcher);
        let permits = Arc::clone(&self.icon_permits);

        match self
            .icons
            .get_or_fetch(slug.to_string(), move || Self::fetch_icon(fetcher, permits, url))
            .await
        {
            Ok(bytes) => Some(bytes),
            Err(error) => {
                log::debug!("No icon for {}: {}", slug, error);
                None
            }
        }
    }

    async fn fetch_icon(
        fetcher: Arc<Fetcher>,
        permits: Arc<Semaphore>,
        url: String,
    ) -> Result<Arc<Vec<u8>>, FetchError> {
        let _permit = permits
            .acquire_owned()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let bytes = fetcher.fetch_bytes(&url).await?;
        if bytes.is_empty() {
            return Err(FetchError::Network(format!("empty icon body from {url}")));
        }
        Ok(Arc::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::models::Tier;
    use crate::utils::clock::ManualClock;
    use crate::utils::testing::{StubClient, fetcher};
    use chrono::TimeDelta;
    use futures::future::join_all;

    const ALL_URL: &str = "https://tiers.test/tier-list";
    const MID_URL: &str = "https://tiers.test/tier-list?role=mid";

    fn page(literal: &str) -> String {
        format!("<script>kit.resolve(1, () => {literal});</script>")
    }

    fn config() -> TiersConfig {
        TiersConfig {
            url: ALL_URL.to_string(),
            icon_url_template: "https://icons.test/{slug}.png".to_string(),
            max_icon_fetches: 2,
            ..TiersConfig::default()
        }
    }

    fn service(client: &Arc<StubClient>, clock: &Arc<ManualClock>) -> TierService {
        TierService::new(Arc::new(fetcher(client.clone())), clock.clone(), config())
    }

    fn stub() -> Arc<StubClient> {
        Arc::new(
            StubClient::new()
                .page(
                    ALL_URL,
                    page(r#"[[{god:"Zeus",tier:"A"},{god:"Agni",tier:"S",win_rate:.51},{god:"Ah Puch",tier:"B"}]]"#),
                )
                .page(MID_URL, page(r#"[{god:"Ra",tier:"C"}]"#)),
        )
    }

    #[tokio::test]
    async fn test_records_are_cached_per_role() {
        let client = stub();
        let clock = Arc::new(ManualClock::default());
        let tiers = service(&client, &clock);

        assert_eq!(tiers.records("all").await.unwrap().len(), 3);
        assert_eq!(tiers.records("ALL").await.unwrap().len(), 3);
        assert_eq!(tiers.records("mid").await.unwrap()[0].name, "Ra");
        assert_eq!(client.calls_to(ALL_URL), 1);
        assert_eq!(client.calls_to(MID_URL), 1);

        clock.advance(TimeDelta::seconds(600));
        tiers.records("all").await.unwrap();
        assert_eq!(client.calls_to(ALL_URL), 2);
    }

    #[tokio::test]
    async fn test_huge_ttl_caches_without_overflow() {
        let client = stub();
        let clock = Arc::new(ManualClock::default());
        let config = TiersConfig {
            data_ttl_secs: u64::MAX,
            ..config()
        };
        let tiers = TierService::new(Arc::new(fetcher(client.clone())), clock.clone(), config);

        assert_eq!(tiers.records("all").await.unwrap().len(), 3);
        clock.advance(TimeDelta::days(30));
        assert_eq!(tiers.records("all").await.unwrap().len(), 3);
        assert_eq!(client.calls_to(ALL_URL), 1);
    }

    #[tokio::test]
    async fn test_concurrent_records_share_one_fetch() {
        let client = stub();
        let clock = Arc::new(ManualClock::default());
        let tiers = service(&client, &clock);

        let results = join_all((0..8).map(|_| tiers.records("all"))).await;
        assert!(results.iter().all(|r| r.as_ref().is_ok_and(|v| v.len() == 3)));
        assert_eq!(client.calls_to(ALL_URL), 1);
    }

    #[tokio::test]
    async fn test_failures_are_typed_and_not_cached() {
        let client = Arc::new(
            StubClient::new()
                .failing(ALL_URL, FetchError::Status(503))
                .page(MID_URL, "<html>no data here</html>"),
        );
        let clock = Arc::new(ManualClock::default());
        let tiers = service(&client, &clock);

        assert_eq!(
            tiers.records("all").await.unwrap_err(),
            ScrapeError::Fetch(FetchError::Status(503))
        );
        assert_eq!(
            tiers.records("mid").await.unwrap_err(),
            ScrapeError::Extract(ExtractError::NotFound)
        );

        client.set(ALL_URL, Ok(page(r#"[{god:"Ra"}]"#).into_bytes()));
        assert_eq!(tiers.records("all").await.unwrap().len(), 1);
        assert_eq!(client.calls_to(ALL_URL), 2);
    }

    #[tokio::test]
    async fn test_views_over_records() {
        let client = stub();
        let clock = Arc::new(ManualClock::default());
        let tiers = service(&client, &clock);

        assert_eq!(tiers.names("all").await.unwrap(), ["Agni", "Ah Puch", "Zeus"]);

        let list = tiers.tier_list("all").await.unwrap();
        assert_eq!(list.tiers(None)[0].0, Tier::S);

        match tiers.lookup("all", "agni").await.unwrap() {
            Lookup::Found(record) => assert_eq!(record.win_rate, Some(0.51)),
            other => panic!("expected a match, got {other:?}"),
        }
        assert_eq!(
            tiers.lookup("all", "ah pook").await.unwrap(),
            Lookup::Missing {
                suggestions: vec!["Ah Puch".to_string()]
            }
        );
        assert_eq!(client.calls_to(ALL_URL), 1);
    }

    #[tokio::test]
    async fn test_icons_are_capped_and_failures_retried() {
        let mut client = StubClient::new();
        for slug in ["a", "b", "c", "d", "e"] {
            client = client.page(&format!("https://icons.test/{slug}.png"), vec![1, 2, 3]);
        }
        let client = Arc::new(client);
        let clock = Arc::new(ManualClock::default());
        let tiers = service(&client, &clock);

        let icons = join_all(["a", "b", "c", "d", "e"].map(|slug| tiers.icon(slug))).await;
        assert!(icons.iter().all(Option::is_some));
        assert_eq!(client.peak(), 2);

        assert!(tiers.icon("missing").await.is_none());
        assert!(tiers.icon("missing").await.is_none());
        assert_eq!(client.calls_to("https://icons.test/missing.png"), 2);

        tiers.icon("a").await.unwrap();
        assert_eq!(client.calls_to("https://icons.test/a.png"), 1);
    }
}
