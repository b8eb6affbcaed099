// src/utils/testing.rs

//! In-process test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::utils::clock::ManualClock;
use crate::utils::http::{FetchOptions, Fetcher, HttpClient, RetryPolicy};

/// Serves canned responses by exact URL. Unknown URLs answer 404.
#[derive(Default)]
pub struct StubClient {
    routes: Mutex<HashMap<String, Result<Vec<u8>, FetchError>>>,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl StubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, outcome: Result<Vec<u8>, FetchError>) {
        self.routes.lock().unwrap().insert(url.to_string(), outcome);
    }

    pub fn page(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.set(url, Ok(body.into()));
        self
    }

    pub fn failing(self, url: &str, error: FetchError) -> Self {
        self.set(url, Err(error));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    /// Highest number of requests observed in progress at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for StubClient {
    async fn get(
        &self,
        url: &str,
        _headers: &[(String, String)],
        _timeout: Duration,
    ) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::task::yield_now().await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)))
    }
}

/// Fetcher over `client` with no retries and a manual clock.
pub fn fetcher(client: Arc<StubClient>) -> Fetcher {
    Fetcher::new(
        client,
        Arc::new(ManualClock::default()),
        FetchOptions {
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::none(),
            headers: Vec::new(),
        },
    )
}
