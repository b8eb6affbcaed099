//! Service layer for the watcher.
//!
//! This module contains the business logic for:
//! - Embedded-data extraction (`decode_records`)
//! - Tier data and icons (`TierService`)
//! - News discovery (`NewsSource`)
//! - Delivery (`LogSink`, `WebhookSink`)

pub mod extract;
mod news;
mod sink;
mod tiers;

pub use extract::{EMBEDDED_MARKER, decode_records, find_embedded_literal, repair};
pub use news::{
    CandidateSource, NewsSource, collect_article_links, parse_article_meta, parse_json_ld,
};
pub use sink::{LogSink, Sink, WebhookSink, safe_image_url};
pub use tiers::{Lookup, MAX_DID_YOU_MEAN, Records, TierService};
