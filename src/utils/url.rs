// src/utils/url.rs

//! URL manipulation utilities.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Canonical identity of a content URL.
///
/// The host and path are lower-cased, the path always ends with `/`, and the
/// fragment is dropped. The query is kept. Input that does not parse as an
/// absolute URL is returned unchanged.
///
/// # Examples
/// ```
/// use tierwatch::utils::url::canonicalize;
///
/// assert_eq!(
///     canonicalize("https://Example.com/news/Foo#top"),
///     "https://example.com/news/foo/"
/// );
/// ```
pub fn canonicalize(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.to_string();
    };
    url.set_fragment(None);

    let mut path = url.path().to_lowercase();
    if !path.ends_with('/') {
        path.push('/');
    }
    url.set_path(&path);
    url.to_string()
}

/// Resolve a potentially relative URL against a base URL.
pub fn resolve(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(|u| u.to_string())
}

/// Extract the lower-cased host from a URL.
pub fn get_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
}

/// Extract the build number embedded in a URL such as `/news/ob12-patch-notes/`.
///
/// Used as an ordinal stand-in for recency when an item has no timestamp.
pub fn extract_build_number(url: &str) -> Option<u64> {
    let pattern = BUILD_NUMBER.as_ref()?;
    let canonical = canonicalize(url);
    pattern
        .captures(&canonical)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

static BUILD_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)/ob(\d+)(?:[-/]|$)").ok());

/// Set of trusted hostnames.
///
/// Every candidate source checks URLs against the same list; anything whose
/// host is not on it is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAllowList {
    hosts: BTreeSet<String>,
}

impl HostAllowList {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Whether `url` parses and its host is trusted.
    pub fn permits(&self, url: &str) -> bool {
        get_domain(url).is_some_and(|host| self.hosts.contains(&host))
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }
}
