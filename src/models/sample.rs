// Point-in-time status snapshot pulled from one endpoint

use std::collections::BTreeMap;
use std::time::Instant;

/// Raw status fields as returned by the endpoint. Unknown fields are carried
/// along untouched; absent fields read as zero through [`Sample::counter`].
#[derive(Debug, Clone)]
pub struct Sample {
    taken_at: Instant,
    fields: BTreeMap<String, String>,
}

impl Sample {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self::at(Instant::now(), fields)
    }

    pub fn at(taken_at: Instant, fields: BTreeMap<String, String>) -> Self {
        Self { taken_at, fields }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    pub fn taken_at(&self) -> Instant {
        self.taken_at
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Non-negative integer counter. Missing or non-numeric values read as 0;
    /// fractional values are truncated.
    pub fn counter(&self, name: &str) -> u64 {
        self.get(name)
            .map(str::trim)
            .and_then(|v| {
                v.parse::<u64>().ok().or_else(|| {
                    v.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && *f >= 0.0)
                        .map(|f| f as u64)
                })
            })
            .unwrap_or(0)
    }

    /// Names from `expected` that this sample does not carry.
    pub fn missing<'a>(&self, expected: &[&'a str]) -> Vec<&'a str> {
        expected
            .iter()
            .copied()
            .filter(|name| !self.fields.contains_key(*name))
            .collect()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Store-independent view of a sample: what the alarm and the tick report use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub connected: u64,
    pub blocked: u64,
    pub ops: u64,
}
