// src/utils/http.rs

//! HTTP client utilities.
//!
//! `HttpClient` is the only network primitive the pipeline needs. `Fetcher`
//! layers the per-attempt timeout, default headers and the retry policy on
//! top of it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{FetchError, Result};
use crate::models::FetchConfig;
use crate::utils::clock::Clock;

/// A single GET, without retries.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, FetchError>;
}

/// `HttpClient` backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a configured asynchronous HTTP client.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

        let mut request = self.client.get(parsed).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;
        Ok(bytes.to_vec())
    }
}

/// How many times to retry a failed fetch, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Fixed delay before each retry
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Total number of attempts.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay to wait after failed attempt `attempt` (zero-based), or `None`
    /// when no further attempt is allowed.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.retries).then_some(self.backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(800))
    }
}

/// Per-fetch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Hard limit for each attempt
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Headers sent with every request
    pub headers: Vec<(String, String)>,
}

impl FetchOptions {
    pub fn from_config(config: &FetchConfig) -> Self {
        let mut headers = Vec::new();
        if !config.accept.is_empty() {
            headers.push(("accept".to_string(), config.accept.clone()));
        }
        if !config.accept_language.is_empty() {
            headers.push(("accept-language".to_string(), config.accept_language.clone()));
        }
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            retry: RetryPolicy::new(config.retries, Duration::from_millis(config.retry_backoff_ms)),
            headers,
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// Retrying fetcher.
#[derive(Clone)]
pub struct Fetcher {
    client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    options: FetchOptions,
}

impl Fetcher {
    pub fn new(client: Arc<dyn HttpClient>, clock: Arc<dyn Clock>, options: FetchOptions) -> Self {
        Self {
            client,
            clock,
            options,
        }
    }

    /// Fetch raw bytes, retrying per the policy.
    ///
    /// Each attempt is abandoned once the timeout elapses. Invalid URLs are
    /// not retried.
    pub async fn fetch_bytes(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let mut attempt = 0;
        loop {
            let outcome = tokio::time::timeout(
                self.options.timeout,
                self.client.get(url, &self.options.headers, self.options.timeout),
            )
            .await
            .unwrap_or(Err(FetchError::Timeout));

            let error = match outcome {
                Ok(bytes) => return Ok(bytes),
                Err(e @ FetchError::InvalidUrl(_)) => return Err(e),
                Err(e) => e,
            };

            match self.options.retry.delay_after(attempt) {
                Some(delay) => {
                    log::warn!(
                        "fetch {} failed: {}; retrying ({} left)",
                        url,
                        error,
                        self.options.retry.retries - attempt
                    );
                    self.clock.sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(error),
            }
        }
    }

    /// Fetch a page as text. Invalid UTF-8 is replaced, not rejected.
    pub async fn fetch_text(&self, url: &str) -> std::result::Result<String, FetchError> {
        let bytes = self.fetch_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
