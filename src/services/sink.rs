// src/services/sink.rs

//! Downstream delivery of new items.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};

use crate::error::{DeliveryError, Result};
use crate::models::{ContentItem, FetchConfig};

/// Receives items in delivery order.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn deliver(&self, item: &ContentItem) -> std::result::Result<(), DeliveryError>;
}

/// Writes each item to the log. Never fails.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl Sink for LogSink {
    async fn deliver(&self, item: &ContentItem) -> std::result::Result<(), DeliveryError> {
        log::info!("New item: {} <{}>", item.title, item.url);
        Ok(())
    }
}

const MAX_IMAGE_URL_LEN: usize = 2000;

static IMAGE_EXTENSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\.(png|jpe?g|gif|webp)(\?|#|$)").ok());

/// Return `raw` when it looks like an image URL a chat service will accept.
///
/// The URL must be http(s), at most 2000 characters, and end in a common
/// image extension (optionally followed by a query or fragment).
pub fn safe_image_url(raw: &str) -> Option<String> {
    let url = url::Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let s = url.to_string();
    if s.len() > MAX_IMAGE_URL_LEN {
        return None;
    }
    let image = IMAGE_EXTENSION.as_ref()?;
    image.is_match(&s).then_some(s)
}

/// Posts each item as a JSON embed to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Message body for an item.
    pub fn payload(item: &ContentItem) -> Value {
        let mut embed = json!({
            "title": item.title,
            "url": item.url,
        });
        if !item.excerpt.is_empty() {
            embed["description"] = json!(item.excerpt);
        }
        if let Some(image) = item.image_url.as_deref().and_then(safe_image_url) {
            embed["image"] = json!({ "url": image });
        }
        if let Some(at) = item.published_at {
            embed["timestamp"] = json!(at.to_rfc3339());
        }
        json!({ "embeds": [embed] })
    }
}

/// Whether a rejection body blames the attached image.
fn blames_image(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("image") || lower.contains("invalid form body")
}

#[async_trait]
impl Sink for WebhookSink {
    async fn deliver(&self, item: &ContentItem) -> std::result::Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Self::payload(item))
            .send()
            .await
            .map_err(|e| DeliveryError::Terminal(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("webhook answered {status}: {}", body.trim());
        if status == reqwest::StatusCode::BAD_REQUEST && blames_image(&body) {
            Err(DeliveryError::Degradable(message))
        } else {
            Err(DeliveryError::Terminal(message))
        }
    }
}
