// src/models/mod.rs

//! Domain models for the ingestion pipeline.

mod config;
mod item;
mod ledger;
mod names;
mod record;

// Re-export all public types
pub use config::{
    ALL_ROLES, Config, FetchConfig, LoggingConfig, NewsConfig, SinkConfig, StorageConfig,
    TiersConfig,
};
pub use item::{ContentItem, SortKey, parse_published};
pub use ledger::PersistedLedger;
pub use names::{MAX_SUGGESTIONS, NameIndex, suggest};
pub use record::{
    ScrapedRecord, Tier, TierList, did_you_mean, find_record, pct, slugify, sorted_names,
};
