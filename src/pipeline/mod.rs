//! Pipeline entry points for the watcher.
//!
//! - `NewsWatcher::sync`: deliver unseen news items once each
//! - `NameRefresher::refresh`: rebuild the per-role name index
//! - `Service`: run both on intervals until shutdown

pub mod diff;
pub mod refresh;
pub mod service;
pub mod sync;

pub use diff::{DeliveryPlan, SyncMode, dedupe, plan_delivery, sort_chronological};
pub use refresh::{NameRefresher, RefreshReport};
pub use service::{Components, Service};
pub use sync::{NewsWatcher, SyncReport};
