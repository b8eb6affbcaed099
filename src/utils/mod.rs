//! Utility functions and helpers.

pub mod clock;
pub mod http;
pub mod url;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use http::{FetchOptions, Fetcher, HttpClient, ReqwestClient, RetryPolicy};
pub use url::{HostAllowList, canonicalize};
