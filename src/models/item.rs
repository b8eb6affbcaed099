//! News item data structure.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::url::{canonicalize, extract_build_number};

/// A news article discovered on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Canonical URL; the identity of the item
    pub url: String,

    pub title: String,

    /// Short description, possibly empty
    pub excerpt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl ContentItem {
    /// Create an item; the URL is canonicalized.
    pub fn new(url: &str, title: impl Into<String>) -> Self {
        Self {
            url: canonicalize(url),
            title: title.into(),
            excerpt: String::new(),
            image_url: None,
            published_at: None,
        }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = excerpt.into();
        self
    }

    pub fn with_image(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }

    pub fn with_published(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    /// Copy of the item without its image.
    pub fn without_image(&self) -> Self {
        Self {
            image_url: None,
            ..self.clone()
        }
    }

    /// Chronological sort key.
    pub fn sort_key(&self) -> SortKey {
        if let Some(at) = self.published_at {
            return SortKey::Published(at);
        }
        match extract_build_number(&self.url) {
            Some(n) => SortKey::Build(n),
            None => SortKey::Unknown,
        }
    }
}

/// Recency of an item, oldest first.
///
/// Items with neither a timestamp nor a build number are the oldest. Build
/// numbers only order items among themselves and sort before any timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Unknown,
    Build(u64),
    Published(DateTime<Utc>),
}

/// Parse a publication time as found in page metadata.
///
/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC) and a bare
/// `YYYY-MM-DD` (midnight UTC).
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
