// src/error.rs

//! Unified error handling for the ingestion pipeline.
//!
//! `AppError` covers setup and I/O failures. The narrower types below it
//! describe what can go wrong while scraping and delivering, and are `Clone`
//! so a single failed fetch can be handed to every caller waiting on it.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built or used
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Scraping a page failed
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Failure of a single retrieval, after retries are exhausted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The attempt exceeded its deadline
    #[error("request timed out")]
    Timeout,

    /// Connection, TLS or body read failure
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("HTTP status {0}")]
    Status(u16),

    /// The URL could not be parsed
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Maximum number of characters of a raw literal kept for diagnostics.
pub const EXCERPT_LEN: usize = 120;

/// Failure to get structured data out of a fetched page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The marker or a balanced span was not found; the page shape changed
    #[error("embedded data block not found")]
    NotFound,

    /// The page is an anti-bot interstitial rather than content
    #[error("page is behind a browser challenge")]
    Challenged,

    /// Data was found but could not be decoded
    #[error("embedded data could not be decoded: {message} (starts with `{excerpt}`)")]
    Decode { message: String, excerpt: String },
}

impl ExtractError {
    /// Create a decode error, keeping a bounded excerpt of the offending text.
    pub fn decode(message: impl std::fmt::Display, raw: &str) -> Self {
        let mut excerpt: String = raw.chars().take(EXCERPT_LEN).collect();
        if raw.chars().count() > EXCERPT_LEN {
            excerpt.push_str("...");
        }
        Self::Decode {
            message: message.to_string(),
            excerpt,
        }
    }
}

/// Failure anywhere between a URL and a decoded value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
}

/// Failure to hand an item to the downstream sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Rejected because of an optional field; retrying without it may succeed
    #[error("delivery rejected (degradable): {0}")]
    Degradable(String),

    /// Rejected for good
    #[error("delivery failed: {0}")]
    Terminal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_excerpt_is_bounded() {
        let raw = "x".repeat(500);
        let ExtractError::Decode { excerpt, .. } = ExtractError::decode("bad", &raw) else {
            panic!("expected decode error");
        };
        assert_eq!(excerpt.len(), EXCERPT_LEN + 3);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn short_excerpt_is_kept_whole() {
        let err = ExtractError::decode("bad", "[{a:1}]");
        assert_eq!(
            err,
            ExtractError::Decode {
                message: "bad".into(),
                excerpt: "[{a:1}]".into()
            }
        );
    }

    #[test]
    fn not_found_and_decode_are_distinct() {
        let not_found = ScrapeError::from(ExtractError::NotFound);
        let decode = ScrapeError::from(ExtractError::decode("eof", "["));
        assert_ne!(not_found, decode);
    }
}
