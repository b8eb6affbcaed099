// src/services/news.rs

//! News candidate discovery.
//!
//! The listing page is read through its JSON-LD blocks first. Only when they
//! yield nothing are article links scraped from the markup, and each linked
//! page is fetched for its Open Graph metadata. Both paths drop URLs whose
//! host is not on the allow-list.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use url::Url;

use crate::error::FetchError;
use crate::models::{ContentItem, NewsConfig, parse_published};
use crate::utils::http::Fetcher;
use crate::utils::url::{HostAllowList, canonicalize};

/// Something that can list candidate items.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates(&self) -> Result<Vec<ContentItem>, FetchError>;
}

const ARTICLE_TYPES: [&str; 5] = ["Article", "NewsArticle", "BlogPosting", "TechArticle", "Report"];

/// Listing-page source for news articles.
pub struct NewsSource {
    fetcher: Arc<Fetcher>,
    config: NewsConfig,
    allow: HostAllowList,
}

impl NewsSource {
    pub fn new(fetcher: Arc<Fetcher>, config: NewsConfig) -> Self {
        let allow = config.allow_list();
        Self {
            fetcher,
            config,
            allow,
        }
    }

    /// Fetch each linked article page. Pages that fail are logged and skipped.
    async fn fetch_articles(&self, links: Vec<String>) -> Vec<ContentItem> {
        let mut items = Vec::with_capacity(links.len());
        for link in links {
            match self.fetcher.fetch_text(&link).await {
                Ok(html) => items.push(parse_article_meta(&html, &link, &self.config.default_title)),
                Err(error) => log::warn!("Article fetch failed for {}: {}", link, error),
            }
        }
        items
    }
}

#[async_trait]
impl CandidateSource for NewsSource {
    async fn candidates(&self) -> Result<Vec<ContentItem>, FetchError> {
        let index_url = &self.config.index_url;
        let html = self.fetcher.fetch_text(index_url).await?;

        let items = parse_json_ld(&html, index_url, &self.allow, &self.config.default_title);
        if !items.is_empty() {
            log::debug!("Found {} articles via structured data", items.len());
            return Ok(items);
        }

        let links = collect_article_links(
            &html,
            index_url,
            &self.config.link_path_prefix,
            &self.allow,
            self.config.max_fallback_links,
        );
        log::info!(
            "No structured data on {}; falling back to {} article links",
            index_url,
            links.len()
        );
        Ok(self.fetch_articles(links).await)
    }
}

/// Articles described by the JSON-LD blocks of a page.
///
/// Blocks that are not valid JSON are skipped. Results are unique by
/// canonical URL, in document order.
pub fn parse_json_ld(
    html: &str,
    base: &str,
    allow: &HostAllowList,
    default_title: &str,
) -> Vec<ContentItem> {
    let Ok(script_sel) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };
    let Ok(base_url) = Url::parse(base) else {
        return Vec::new();
    };
    let listing = canonicalize(base);
    let document = Html::parse_document(html);

    let mut nodes = Vec::new();
    for script in document.select(&script_sel) {
        let raw: String = script.text().collect();
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) => collect_article_nodes(&value, &mut nodes),
            Err(error) => log::debug!("Skipping malformed JSON-LD block: {}", error),
        }
    }

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for node in nodes {
        let Some(item) = article_from_node(&node, &base_url, default_title) else {
            continue;
        };
        if item.url == listing || !allow.permits(&item.url) {
            continue;
        }
        if seen.insert(item.url.clone()) {
            items.push(item);
        }
    }
    items
}

/// Walk a JSON-LD value and collect the objects that describe an article.
///
/// Recurses through arrays, `@graph`, `itemListElement` and a list item's
/// `item`. A `ListItem` that only carries a URL and a name counts as an
/// article itself.
fn collect_article_nodes(value: &Value, out: &mut Vec<Map<String, Value>>) {
    match value {
        Value::Array(values) => {
            for v in values {
                collect_article_nodes(v, out);
            }
        }
        Value::Object(obj) => {
            for key in ["@graph", "itemListElement"] {
                if let Some(inner) = obj.get(key) {
                    collect_article_nodes(inner, out);
                }
            }

            if has_type(obj, "ListItem") {
                match obj.get("item") {
                    Some(item @ Value::Object(_)) => collect_article_nodes(item, out),
                    Some(Value::String(url)) => {
                        let mut flat = obj.clone();
                        flat.insert("url".to_string(), Value::String(url.clone()));
                        out.push(flat);
                    }
                    _ if obj.contains_key("url") => out.push(obj.clone()),
                    _ => {}
                }
                return;
            }

            let typed_article = ARTICLE_TYPES.iter().any(|t| has_type(obj, t));
            let untyped_headline = !obj.contains_key("@type") && obj.contains_key("headline");
            if typed_article || untyped_headline {
                out.push(obj.clone());
            }
        }
        _ => {}
    }
}

fn has_type(obj: &Map<String, Value>, wanted: &str) -> bool {
    match obj.get("@type") {
        Some(Value::String(t)) => t == wanted,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(wanted)),
        _ => false,
    }
}

fn article_from_node(
    node: &Map<String, Value>,
    base: &Url,
    default_title: &str,
) -> Option<ContentItem> {
    let raw_url = node
        .get("url")
        .and_then(Value::as_str)
        .or_else(|| match node.get("mainEntityOfPage")? {
            Value::String(s) => Some(s.as_str()),
            Value::Object(page) => page
                .get("@id")
                .or_else(|| page.get("url"))
                .and_then(Value::as_str),
            _ => None,
        })?;
    let url = base.join(raw_url.trim()).ok()?;

    let title = ["headline", "name"]
        .iter()
        .find_map(|k| non_empty(node.get(*k)?.as_str()?))
        .unwrap_or(default_title);
    let excerpt = node
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    let image = node
        .get("image")
        .and_then(image_url)
        .and_then(|img| base.join(img.trim()).ok())
        .map(|img| img.to_string());
    let published = node
        .get("datePublished")
        .and_then(Value::as_str)
        .and_then(parse_published);

    Some(
        ContentItem::new(url.as_str(), title)
            .with_excerpt(excerpt)
            .with_image(image)
            .with_published(published),
    )
}

/// `image` may be a string, an `ImageObject` or a list of either.
fn image_url(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => non_empty(s),
        Value::Object(obj) => obj.get("url").and_then(Value::as_str).and_then(non_empty),
        Value::Array(values) => values.first().and_then(image_url),
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

/// Article links on a listing page.
///
/// A link qualifies when it resolves to an allow-listed host and its path is
/// exactly one segment below `prefix` (`/news/<slug>/`). Links are unique by
/// canonical URL, in document order, at most `cap`.
pub fn collect_article_links(
    html: &str,
    base: &str,
    prefix: &str,
    allow: &HostAllowList,
    cap: usize,
) -> Vec<String> {
    let Ok(link_sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let Ok(base_url) = Url::parse(base) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in document.select(&link_sel) {
        if links.len() >= cap {
            break;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(mut url) = base_url.join(href.trim()) else {
            continue;
        };
        url.set_fragment(None);

        if !allow.permits(url.as_str()) || !is_article_path(url.path(), prefix) {
            continue;
        }
        if seen.insert(canonicalize(url.as_str())) {
            links.push(url.to_string());
        }
    }
    links
}

fn is_article_path(path: &str, prefix: &str) -> bool {
    let Some(rest) = path.strip_prefix(prefix) else {
        return false;
    };
    let slug = rest.strip_suffix('/').unwrap_or(rest);
    !slug.is_empty() && !slug.contains('/')
}

/// Read an article page's metadata.
///
/// The title comes from `og:title`, then `<title>`, then `default_title`.
/// The publication time comes from `article:published_time` or `pubdate`.
pub fn parse_article_meta(html: &str, url: &str, default_title: &str) -> ContentItem {
    let document = Html::parse_document(html);
    let meta = |css: &str| -> Option<String> {
        let sel = Selector::parse(css).ok()?;
        document
            .select(&sel)
            .filter_map(|el| el.value().attr("content"))
            .find_map(non_empty)
            .map(str::to_string)
    };

    let title = meta(r#"meta[property="og:title"]"#).or_else(|| {
        let sel = Selector::parse("title").ok()?;
        let text: String = document.select(&sel).next()?.text().collect();
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        (!collapsed.is_empty()).then_some(collapsed)
    });
    let image = meta(r#"meta[property="og:image"]"#)
        .and_then(|img| Url::parse(url).ok()?.join(&img).ok())
        .map(|img| img.to_string());
    let published = meta(r#"meta[property="article:published_time"]"#)
        .or_else(|| meta(r#"meta[name="pubdate"]"#))
        .and_then(|raw| parse_published(&raw));

    ContentItem::new(url, title.unwrap_or_else(|| default_title.to_string()))
        .with_excerpt(meta(r#"meta[property="og:description"]"#).unwrap_or_default())
        .with_image(image)
        .with_published(published)
}
