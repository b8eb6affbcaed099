//! Durable record of delivered items.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::url::canonicalize;

/// Canonical URLs already handed to the sink, and when the source was last
/// checked.
///
/// The set only grows; `reset` is the one way to shrink it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedLedger {
    #[serde(rename = "posted", default)]
    delivered: BTreeSet<String>,

    #[serde(
        rename = "lastCheckedAt",
        default,
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl PersistedLedger {
    /// Re-canonicalize every stored URL. Older files may hold raw URLs.
    pub fn normalized(self) -> Self {
        Self {
            delivered: self.delivered.iter().map(|u| canonicalize(u)).collect(),
            last_checked_at: self.last_checked_at,
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.delivered.contains(&canonicalize(url))
    }

    /// Mark `url` as delivered. Returns `false` if it already was.
    pub fn record(&mut self, url: &str) -> bool {
        self.delivered.insert(canonicalize(url))
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.delivered.clear();
        self.last_checked_at = None;
    }

    pub fn len(&self) -> usize {
        self.delivered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty()
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.delivered.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_is_canonical_and_idempotent() {
        let mut ledger = PersistedLedger::default();
        assert!(ledger.record("https://Example.com/news/a"));
        assert!(!ledger.record("https://example.com/news/a/#x"));
        assert!(ledger.contains("https://example.com/NEWS/a"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_file_format() {
        let json = r#"{ "posted": ["https://Example.com/news/a"], "lastCheckedAt": 1704067200000 }"#;
        let ledger: PersistedLedger = serde_json::from_str(json).unwrap();
        let ledger = ledger.normalized();

        assert!(ledger.urls().eq(["https://example.com/news/a/"]));
        assert_eq!(
            ledger.last_checked_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );

        let out = serde_json::to_value(&ledger).unwrap();
        assert_eq!(out["lastCheckedAt"], 1704067200000_i64);
        assert_eq!(out["posted"][0], "https://example.com/news/a/");
    }

    #[test]
    fn test_missing_fields_default() {
        let ledger: PersistedLedger = serde_json::from_str("{}").unwrap();
        assert!(ledger.is_empty());
        assert!(ledger.last_checked_at.is_none());
    }

    #[test]
    fn test_reset() {
        let mut ledger = PersistedLedger::default();
        ledger.record("https://example.com/news/a/");
        ledger.last_checked_at = Some(Utc::now());
        ledger.reset();
        assert_eq!(ledger, PersistedLedger::default());
    }
}
