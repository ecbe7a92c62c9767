// Key-type / size distribution scan over a cursor-paginated keyspace.

use crate::error::ConnectionError;
use crate::histogram::{BucketSet, KeyDistribution, OVERFLOW_SLOT};
use crate::output::Tabular;
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What one key looks like from the outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub kind: String,
    pub serialized_size: u64,
    /// Remaining seconds; `None` when the key never expires.
    pub ttl: Option<i64>,
}

/// Cursor-based key listing plus per-key introspection.
pub trait Keyspace: Send {
    /// `scan(cursor) -> (next_cursor, keys)`; a returned cursor of 0 ends the walk.
    fn scan(
        &mut self,
        cursor: u64,
        count: usize,
    ) -> impl Future<Output = Result<(u64, Vec<Vec<u8>>), ConnectionError>> + Send;

    /// `None` when the key disappeared between listing and introspection.
    fn introspect(
        &mut self,
        key: &[u8],
    ) -> impl Future<Output = Result<Option<KeyInfo>, ConnectionError>> + Send;
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub target: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub keys_seen: u64,
    /// Keys that vanished mid-scan or whose introspection was rejected.
    pub keys_skipped: u64,
    pub distribution: KeyDistribution,
}

/// Walk the whole keyspace once. A transport failure aborts the scan; a
/// rejected per-key command only skips that key.
pub async fn run_scan<K: Keyspace>(
    keyspace: &mut K,
    target: &str,
    batch_count: usize,
) -> Result<ScanReport, ConnectionError> {
    let started_at = Local::now();
    let mut distribution = KeyDistribution::new();
    let mut keys_seen = 0u64;
    let mut keys_skipped = 0u64;
    let mut cursor = 0u64;

    loop {
        let (next, keys) = keyspace.scan(cursor, batch_count).await?;
        for key in keys {
            keys_seen += 1;
            let info = match keyspace.introspect(&key).await {
                Ok(Some(info)) => info,
                Ok(None) => {
                    debug!(key = %String::from_utf8_lossy(&key), "key vanished during scan");
                    keys_skipped += 1;
                    continue;
                }
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => {
                    warn!(key = %String::from_utf8_lossy(&key), error = %e, "introspection failed; skipping key");
                    keys_skipped += 1;
                    continue;
                }
            };
            if let Err(e) =
                distribution.classify(&info.kind, info.serialized_size, info.ttl.is_some())
            {
                warn!(key = %String::from_utf8_lossy(&key), error = %e, "not counted in distribution");
            }
        }
        if next == 0 {
            break;
        }
        cursor = next;
    }

    info!(
        endpoint = target,
        keys_seen,
        keys_skipped,
        classified = distribution.total_keys(),
        "scan complete"
    );
    Ok(ScanReport {
        target: target.to_string(),
        started_at,
        finished_at: Local::now(),
        keys_seen,
        keys_skipped,
        distribution,
    })
}

/// One output row per key category.
pub struct DistributionRow<'a> {
    pub category: String,
    pub buckets: &'a BucketSet,
}

impl Tabular for DistributionRow<'_> {
    fn columns() -> Vec<String> {
        let mut cols = vec!["TYPE".to_string(), "COUNT".to_string()];
        cols.extend((1..=OVERFLOW_SLOT).map(BucketSet::slot_label));
        cols.push("NO_EXPIRY".to_string());
        cols
    }

    fn cells(&self) -> Vec<String> {
        let mut cells = vec![self.category.to_uppercase()];
        cells.extend(self.buckets.counts().iter().map(u64::to_string));
        cells.push(self.buckets.no_expiry().to_string());
        cells
    }
}

impl ScanReport {
    pub fn rows(&self) -> Vec<DistributionRow<'_>> {
        self.distribution
            .iter()
            .map(|(category, buckets)| DistributionRow {
                category: category.to_string(),
                buckets,
            })
            .collect()
    }
}
