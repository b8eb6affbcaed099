//! Deduplication and ordering of candidate items.
//!
//! Computes which candidates are new relative to the delivered ledger and
//! in which order they should go out.

use std::collections::HashSet;

use crate::models::{ContentItem, PersistedLedger};
use crate::utils::url::{HostAllowList, canonicalize};

/// How much of the unseen backlog a run may deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// First run after activation: only the newest `backfill_max` items
    Cold,
    /// Every later run: everything unseen
    Warm,
}

/// Items selected for delivery, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryPlan {
    pub items: Vec<ContentItem>,
    /// Unseen items before the backfill cap
    pub unseen: usize,
    /// Unseen items left out by the backfill cap
    pub held_back: usize,
}

/// Drop untrusted hosts and duplicate URLs, keeping the first occurrence.
///
/// URLs are re-canonicalized so two spellings of one article collapse.
pub fn dedupe(items: Vec<ContentItem>, allow: &HostAllowList) -> Vec<ContentItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter_map(|mut item| {
            item.url = canonicalize(&item.url);
            if !allow.permits(&item.url) {
                log::debug!("Dropping untrusted item {}", item.url);
                return None;
            }
            seen.insert(item.url.clone()).then_some(item)
        })
        .collect()
}

/// Items whose canonical URL is not in the ledger.
pub fn unseen(items: Vec<ContentItem>, ledger: &PersistedLedger) -> Vec<ContentItem> {
    items
        .into_iter()
        .filter(|item| !ledger.contains(&item.url))
        .collect()
}

/// Sort oldest first by timestamp, then build number. Ties keep their order.
pub fn sort_chronological(items: &mut [ContentItem]) {
    items.sort_by_key(ContentItem::sort_key);
}

/// Choose what to deliver from a batch of candidates.
///
/// Unseen items are sorted oldest first. In cold mode only the last
/// `backfill_max` of them (the newest) are kept, still oldest first.
pub fn plan_delivery(
    candidates: Vec<ContentItem>,
    ledger: &PersistedLedger,
    allow: &HostAllowList,
    mode: SyncMode,
    backfill_max: usize,
) -> DeliveryPlan {
    let mut items = unseen(dedupe(candidates, allow), ledger);
    sort_chronological(&mut items);

    let unseen = items.len();
    let held_back = match mode {
        SyncMode::Cold => unseen.saturating_sub(backfill_max),
        SyncMode::Warm => 0,
    };
    items.drain(..held_back);

    DeliveryPlan {
        items,
        unseen,
        held_back,
    }
}
