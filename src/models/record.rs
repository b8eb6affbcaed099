//! Tier records decoded from the embedded page data.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tier letter, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    S,
    A,
    B,
    C,
    D,
    F,
}

impl Tier {
    pub const ALL: [Tier; 6] = [Tier::S, Tier::A, Tier::B, Tier::C, Tier::D, Tier::F];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "S" => Some(Tier::S),
            "A" => Some(Tier::A),
            "B" => Some(Tier::B),
            "C" => Some(Tier::C),
            "D" => Some(Tier::D),
            "F" => Some(Tier::F),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::S => "S",
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
            Tier::D => "D",
            Tier::F => "F",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRecord {
    pub name: String,

    /// `None` when the source label is missing or not a known letter
    pub tier: Option<Tier>,

    /// Fractions in 0.0..=1.0
    pub win_rate: Option<f64>,
    pub pick_rate: Option<f64>,
    pub ban_rate: Option<f64>,

    pub matches: Option<u64>,
}

impl ScrapedRecord {
    /// Read a record from one decoded element, tolerating the field names the
    /// source has used over time. Elements without a name yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |keys: &[&str]| {
            keys.iter().find_map(|k| match obj.get(*k)? {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        };
        let number = |keys: &[&str]| keys.iter().find_map(|k| obj.get(*k)?.as_f64());

        let name = text(&["god", "name", "godName", "title"])?;
        let tier = text(&["tier", "letter", "rank"]).and_then(|t| Tier::parse(&t));
        let matches = ["matches_played", "matches"]
            .iter()
            .find_map(|k| obj.get(*k)?.as_u64());

        Some(Self {
            name,
            tier,
            win_rate: number(&["win_rate"]),
            pick_rate: number(&["pick_rate"]),
            ban_rate: number(&["ban_rate"]),
            matches,
        })
    }

    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// Lower-case, strip everything but `[a-z0-9]`, whitespace and `-`, and join
/// words with `-`.
pub fn slugify(name: &str) -> String {
    let kept: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Render a 0..1 rate as a percentage with two decimals.
pub fn pct(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.2}%", r * 100.0),
        None => "—".to_string(),
    }
}

fn normalize_name(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Find a record by name, ignoring case and spacing, then by slug.
pub fn find_record<'a>(records: &'a [ScrapedRecord], query: &str) -> Option<&'a ScrapedRecord> {
    let wanted = normalize_name(query);
    records
        .iter()
        .find(|r| normalize_name(&r.name) == wanted)
        .or_else(|| {
            let slug = slugify(query);
            records.iter().find(|r| r.slug() == slug)
        })
}

/// Names containing the first word of a failed query.
pub fn did_you_mean(names: &[String], query: &str, limit: usize) -> Vec<String> {
    let wanted = normalize_name(query);
    let first = wanted.split(' ').next().unwrap_or_default();
    names
        .iter()
        .filter(|n| normalize_name(n).contains(first))
        .take(limit)
        .cloned()
        .collect()
}

/// Sorted, de-duplicated names of a batch.
pub fn sorted_names(records: &[ScrapedRecord]) -> Vec<String> {
    let mut names: Vec<String> = records.iter().map(|r| r.name.clone()).collect();
    sort_names(&mut names);
    names
}

/// Case-insensitive sort, then drop exact duplicates.
pub fn sort_names(names: &mut Vec<String>) {
    names.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    names.dedup();
}

/// Records grouped by tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierList {
    buckets: BTreeMap<Tier, Vec<String>>,
}

impl TierList {
    pub fn from_records(records: &[ScrapedRecord]) -> Self {
        let mut buckets: BTreeMap<Tier, Vec<String>> = BTreeMap::new();
        for record in records {
            if let Some(tier) = record.tier {
                buckets.entry(tier).or_default().push(record.name.clone());
            }
        }
        for names in buckets.values_mut() {
            sort_names(names);
        }
        Self { buckets }
    }

    /// Non-empty tiers in S..F order, optionally restricted to one tier.
    pub fn tiers(&self, only: Option<Tier>) -> Vec<(Tier, &[String])> {
        Tier::ALL
            .iter()
            .filter(|t| only.is_none_or(|o| o == **t))
            .filter_map(|t| {
                self.buckets
                    .get(t)
                    .filter(|names| !names.is_empty())
                    .map(|names| (*t, names.as_slice()))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Vec::is_empty)
    }
}
