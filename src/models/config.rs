//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::url::HostAllowList;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP behavior shared by every fetch
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Tier data source and its caches
    #[serde(default)]
    pub tiers: TiersConfig,

    /// News watcher settings
    #[serde(default)]
    pub news: NewsConfig,

    /// Where state files live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Downstream delivery target
    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetch.user_agent is empty"));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(AppError::validation("fetch.timeout_ms must be > 0"));
        }
        if url::Url::parse(&self.tiers.url).is_err() {
            return Err(AppError::validation("tiers.url is not a valid URL"));
        }
        if self.tiers.roles.is_empty() {
            return Err(AppError::validation("No tier roles defined"));
        }
        if self.tiers.data_ttl_secs == 0 || self.tiers.icon_ttl_secs == 0 {
            return Err(AppError::validation("tiers cache TTLs must be > 0"));
        }
        for (name, secs) in [
            ("tiers.data_ttl_secs", self.tiers.data_ttl_secs),
            ("tiers.icon_ttl_secs", self.tiers.icon_ttl_secs),
            ("tiers.refresh_interval_secs", self.tiers.refresh_interval_secs),
            ("news.sync_interval_secs", self.news.sync_interval_secs),
        ] {
            if secs > MAX_PERIOD_SECS {
                return Err(AppError::validation(format!(
                    "{name} must be at most {MAX_PERIOD_SECS}"
                )));
            }
        }
        if !self.tiers.icon_url_template.contains("{slug}") {
            return Err(AppError::validation(
                "tiers.icon_url_template must contain {slug}",
            ));
        }
        if self.tiers.max_icon_fetches == 0 {
            return Err(AppError::validation("tiers.max_icon_fetches must be > 0"));
        }
        if self.tiers.refresh_interval_secs == 0 {
            return Err(AppError::validation("tiers.refresh_interval_secs must be > 0"));
        }
        if url::Url::parse(&self.news.index_url).is_err() {
            return Err(AppError::validation("news.index_url is not a valid URL"));
        }
        if self.news.allow_list().is_empty() {
            return Err(AppError::validation("No allowed news hosts defined"));
        }
        if self.news.sync_interval_secs == 0 {
            return Err(AppError::validation("news.sync_interval_secs must be > 0"));
        }
        if self.storage.ledger_file == self.storage.names_file {
            return Err(AppError::validation(
                "storage.ledger_file and storage.names_file must differ",
            ));
        }
        if let Some(webhook) = &self.sink.webhook_url {
            if url::Url::parse(webhook).is_err() {
                return Err(AppError::validation("sink.webhook_url is not a valid URL"));
            }
        }
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Accept header
    #[serde(default = "defaults::accept")]
    pub accept: String,

    /// Accept-Language header
    #[serde(default = "defaults::accept_language")]
    pub accept_language: String,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first failed attempt
    #[serde(default = "defaults::retries")]
    pub retries: u32,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "defaults::retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            accept: defaults::accept(),
            accept_language: defaults::accept_language(),
            timeout_ms: defaults::timeout_ms(),
            retries: defaults::retries(),
            retry_backoff_ms: defaults::retry_backoff_ms(),
        }
    }
}

/// Tier list source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiersConfig {
    /// Tier list page; a role filter is appended as `?role=`
    #[serde(default = "defaults::tiers_url")]
    pub url: String,

    /// Role categories; `all` means no filter
    #[serde(default = "defaults::roles")]
    pub roles: Vec<String>,

    /// Lifetime of cached tier records
    #[serde(default = "defaults::data_ttl_secs")]
    pub data_ttl_secs: u64,

    /// Lifetime of cached icons
    #[serde(default = "defaults::icon_ttl_secs")]
    pub icon_ttl_secs: u64,

    /// Icon URL with a `{slug}` placeholder
    #[serde(default = "defaults::icon_url_template")]
    pub icon_url_template: String,

    /// Upper bound on concurrent icon downloads
    #[serde(default = "defaults::max_icon_fetches")]
    pub max_icon_fetches: usize,

    /// How often the name index is rebuilt
    #[serde(default = "defaults::refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl TiersConfig {
    pub fn data_ttl(&self) -> TimeDelta {
        secs_delta(self.data_ttl_secs)
    }

    pub fn icon_ttl(&self) -> TimeDelta {
        secs_delta(self.icon_ttl_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Page URL for a role.
    pub fn role_url(&self, role: &str) -> String {
        if role == ALL_ROLES {
            return self.url.clone();
        }
        match url::Url::parse(&self.url) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("role", role);
                url.to_string()
            }
            Err(_) => format!("{}?role={}", self.url, role),
        }
    }

    pub fn icon_url(&self, slug: &str) -> String {
        self.icon_url_template.replace("{slug}", slug)
    }

    /// Normalize a user-supplied role, falling back to `all` when unknown.
    pub fn resolve_role(&self, role: Option<&str>) -> String {
        let role = role.unwrap_or(ALL_ROLES).trim().to_lowercase();
        if self.roles.iter().any(|r| r.eq_ignore_ascii_case(&role)) {
            role
        } else {
            ALL_ROLES.to_string()
        }
    }
}

/// Role name meaning "no filter".
pub const ALL_ROLES: &str = "all";

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            url: defaults::tiers_url(),
            roles: defaults::roles(),
            data_ttl_secs: defaults::data_ttl_secs(),
            icon_ttl_secs: defaults::icon_ttl_secs(),
            icon_url_template: defaults::icon_url_template(),
            max_icon_fetches: defaults::max_icon_fetches(),
            refresh_interval_secs: defaults::refresh_interval_secs(),
        }
    }
}

/// News watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    /// Listing page polled for articles
    #[serde(default = "defaults::news_index_url")]
    pub index_url: String,

    /// Hosts whose articles may be delivered
    #[serde(default = "defaults::allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// Path prefix of article links on the listing page
    #[serde(default = "defaults::link_path_prefix")]
    pub link_path_prefix: String,

    /// Maximum article pages fetched by the link fallback
    #[serde(default = "defaults::max_fallback_links")]
    pub max_fallback_links: usize,

    /// Items delivered on a cold run
    #[serde(default = "defaults::backfill_max")]
    pub backfill_max: usize,

    /// Polling interval
    #[serde(default = "defaults::sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Title used when an article page has none
    #[serde(default = "defaults::default_title")]
    pub default_title: String,
}

impl NewsConfig {
    pub fn allow_list(&self) -> HostAllowList {
        HostAllowList::new(&self.allowed_hosts)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            index_url: defaults::news_index_url(),
            allowed_hosts: defaults::allowed_hosts(),
            link_path_prefix: defaults::link_path_prefix(),
            max_fallback_links: defaults::max_fallback_links(),
            backfill_max: defaults::backfill_max(),
            sync_interval_secs: defaults::sync_interval_secs(),
            default_title: defaults::default_title(),
        }
    }
}

/// State file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::storage_dir")]
    pub dir: PathBuf,

    /// Delivered-URL ledger
    #[serde(default = "defaults::ledger_file")]
    pub ledger_file: String,

    /// Persisted name index
    #[serde(default = "defaults::names_file")]
    pub names_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: defaults::storage_dir(),
            ledger_file: defaults::ledger_file(),
            names_file: defaults::names_file(),
        }
    }
}

/// Delivery target. Without a webhook, items are only logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// Longest TTL or interval accepted by `validate` (30 days).
pub const MAX_PERIOD_SECS: u64 = 30 * 24 * 60 * 60;

fn secs_delta(secs: u64) -> TimeDelta {
    TimeDelta::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
        .unwrap_or(TimeDelta::MAX)
}

mod defaults {
    use std::path::PathBuf;

    // Fetch defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
            .into()
    }
    pub fn accept() -> String {
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into()
    }
    pub fn accept_language() -> String {
        "en-GB,en;q=0.9".into()
    }
    pub fn timeout_ms() -> u64 {
        15_000
    }
    pub fn retries() -> u32 {
        2
    }
    pub fn retry_backoff_ms() -> u64 {
        800
    }

    // Tier defaults
    pub fn tiers_url() -> String {
        "https://smitebrain.com/tier-list".into()
    }
    pub fn roles() -> Vec<String> {
        ["all", "jungle", "solo", "mid", "support", "carry"]
            .into_iter()
            .map(String::from)
            .collect()
    }
    pub fn data_ttl_secs() -> u64 {
        10 * 60
    }
    pub fn icon_ttl_secs() -> u64 {
        30 * 60
    }
    pub fn icon_url_template() -> String {
        "https://smitebrain.com/cdn-cgi/image/width=80,height=80,f=png,fit=cover/\
         https://images.smitebrain.com/images/gods/icons/{slug}"
            .into()
    }
    pub fn max_icon_fetches() -> usize {
        4
    }
    pub fn refresh_interval_secs() -> u64 {
        15 * 60
    }

    // News defaults
    pub fn news_index_url() -> String {
        "https://smite2.live/news/".into()
    }
    pub fn allowed_hosts() -> Vec<String> {
        vec!["smite2.live".into()]
    }
    pub fn link_path_prefix() -> String {
        "/news/".into()
    }
    pub fn max_fallback_links() -> usize {
        12
    }
    pub fn backfill_max() -> usize {
        10
    }
    pub fn sync_interval_secs() -> u64 {
        60 * 60
    }
    pub fn default_title() -> String {
        "Smite 2 News".into()
    }

    // Storage defaults
    pub fn storage_dir() -> PathBuf {
        PathBuf::from("data")
    }
    pub fn ledger_file() -> String {
        "last_news.json".into()
    }
    pub fn names_file() -> String {
        "names.json".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
