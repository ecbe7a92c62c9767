// Key-size histogram: fixed ascending buckets, one BucketSet per key category.

use crate::error::UnknownCategoryError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Inclusive upper bounds, ascending. Sizes above the last bound overflow.
pub const BUCKET_BOUNDS: [u64; 10] = [64, 128, 256, 512, 1024, 2048, 3072, 4096, 5120, 6044];

/// Slot 0 counts every classified key, slots 1..=10 follow [`BUCKET_BOUNDS`],
/// the last slot is overflow.
pub const SLOT_COUNT: usize = BUCKET_BOUNDS.len() + 2;
pub const OVERFLOW_SLOT: usize = SLOT_COUNT - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyCategory {
    String,
    List,
    Hash,
    Set,
    Zset,
}

impl KeyCategory {
    pub const ALL: [KeyCategory; 5] = [
        KeyCategory::String,
        KeyCategory::List,
        KeyCategory::Hash,
        KeyCategory::Set,
        KeyCategory::Zset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KeyCategory::String => "string",
            KeyCategory::List => "list",
            KeyCategory::Hash => "hash",
            KeyCategory::Set => "set",
            KeyCategory::Zset => "zset",
        }
    }
}

impl FromStr for KeyCategory {
    type Err = UnknownCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(KeyCategory::String),
            "list" => Ok(KeyCategory::List),
            "hash" => Ok(KeyCategory::Hash),
            "set" => Ok(KeyCategory::Set),
            "zset" => Ok(KeyCategory::Zset),
            _ => Err(UnknownCategoryError(s.to_string())),
        }
    }
}

impl fmt::Display for KeyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one category. Purely additive for the lifetime of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BucketSet {
    counts: [u64; SLOT_COUNT],
    no_expiry: u64,
}

impl BucketSet {
    /// First bound the size fits under wins; boundary values stay in the lower bucket.
    pub fn slot_for(size: u64) -> usize {
        BUCKET_BOUNDS
            .iter()
            .position(|bound| size <= *bound)
            .map_or(OVERFLOW_SLOT, |i| i + 1)
    }

    pub fn slot_label(slot: usize) -> String {
        match slot {
            0 => "all".to_string(),
            s if s == OVERFLOW_SLOT => format!(">{}", BUCKET_BOUNDS[BUCKET_BOUNDS.len() - 1]),
            s => format!("<={}", BUCKET_BOUNDS[s - 1]),
        }
    }

    pub fn record(&mut self, size: u64, has_expiry: bool) {
        self.counts[0] += 1;
        self.counts[Self::slot_for(size)] += 1;
        if !has_expiry {
            self.no_expiry += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.counts[0]
    }

    pub fn count(&self, slot: usize) -> u64 {
        self.counts.get(slot).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &[u64; SLOT_COUNT] {
        &self.counts
    }

    pub fn overflow(&self) -> u64 {
        self.counts[OVERFLOW_SLOT]
    }

    pub fn no_expiry(&self) -> u64 {
        self.no_expiry
    }
}

/// One BucketSet per known category plus a tally of rejected type names.
/// Built fresh per scan and handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct KeyDistribution {
    buckets: BTreeMap<KeyCategory, BucketSet>,
    unknown: BTreeMap<String, u64>,
}

impl Default for KeyDistribution {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyDistribution {
    pub fn new() -> Self {
        Self {
            buckets: KeyCategory::ALL
                .iter()
                .map(|c| (*c, BucketSet::default()))
                .collect(),
            unknown: BTreeMap::new(),
        }
    }

    /// Unknown categories are tallied by name and returned as an error;
    /// no BucketSet changes for them.
    pub fn classify(
        &mut self,
        category: &str,
        size: u64,
        has_expiry: bool,
    ) -> Result<KeyCategory, UnknownCategoryError> {
        match category.parse::<KeyCategory>() {
            Ok(cat) => {
                self.buckets.entry(cat).or_default().record(size, has_expiry);
                Ok(cat)
            }
            Err(e) => {
                *self.unknown.entry(category.to_string()).or_insert(0) += 1;
                Err(e)
            }
        }
    }

    pub fn get(&self, category: KeyCategory) -> Option<&BucketSet> {
        self.buckets.get(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyCategory, &BucketSet)> {
        self.buckets.iter().map(|(c, b)| (*c, b))
    }

    pub fn unknown(&self) -> &BTreeMap<String, u64> {
        &self.unknown
    }

    pub fn total_keys(&self) -> u64 {
        self.buckets.values().map(BucketSet::total).sum()
    }
}
