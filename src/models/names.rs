//! Per-role name index used for suggestions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::record::{ScrapedRecord, sorted_names};

/// Maximum number of suggestions returned.
pub const MAX_SUGGESTIONS: usize = 25;

/// Sorted, de-duplicated names per role, persisted so a fresh process can
/// answer suggestion queries before any page has been fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIndex {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
}

impl NameIndex {
    /// Replace a role's names with those of a freshly decoded batch.
    pub fn update(&mut self, role: &str, records: &[ScrapedRecord]) {
        self.categories
            .insert(role.to_string(), sorted_names(records));
    }

    pub fn names(&self, role: &str) -> &[String] {
        self.categories
            .get(role)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.values().all(Vec::is_empty)
    }

    /// Suggestions for `query` within a role.
    pub fn suggest(&self, role: &str, query: &str, limit: usize) -> Vec<String> {
        suggest(self.names(role), query, limit)
    }
}

/// Prefix matches first, then substring matches, at most `limit`.
///
/// An empty query returns the first `limit` names.
pub fn suggest(names: &[String], query: &str, limit: usize) -> Vec<String> {
    let q = query.trim().to_lowercase();
    let mut starts = Vec::new();
    let mut contains = Vec::new();

    for name in names {
        let lower = name.to_lowercase();
        if q.is_empty() || lower.starts_with(&q) {
            starts.push(name.clone());
        } else if lower.contains(&q) {
            contains.push(name.clone());
        }
        if starts.len() >= limit {
            break;
        }
    }

    starts.extend(contains);
    starts.truncate(limit);
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prefix_before_substring() {
        let all = names(&["Agni", "Cabrakan", "Ra", "Scylla"]);
        assert_eq!(suggest(&all, "c", 25), names(&["Cabrakan", "Scylla"]));
        assert_eq!(suggest(&all, "RA", 25), names(&["Ra", "Cabrakan"]));
    }

    #[test]
    fn test_empty_query_and_limit() {
        let all: Vec<String> = (0..40).map(|i| format!("God{i:02}")).collect();
        let out = suggest(&all, "", MAX_SUGGESTIONS);
        assert_eq!(out.len(), MAX_SUGGESTIONS);
        assert_eq!(out[0], "God00");
    }

    #[test]
    fn test_update_replaces_role() {
        let record = |name: &str| ScrapedRecord {
            name: name.into(),
            tier: None,
            win_rate: None,
            pick_rate: None,
            ban_rate: None,
            matches: None,
        };
        let mut index = NameIndex::default();
        index.update("mid", &[record("Zeus"), record("Agni"), record("Zeus")]);
        assert_eq!(index.names("mid"), ["Agni", "Zeus"]);

        index.update("mid", &[record("Ra")]);
        assert_eq!(index.names("mid"), ["Ra"]);
        assert!(index.names("solo").is_empty());
        assert_eq!(index.suggest("mid", "r", 5), names(&["Ra"]));
    }
}
