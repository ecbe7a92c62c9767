// Bulk key deletion from a `type,key` list: batched DELs for strings,
// incremental draining for collections so one huge key never blocks the server.

use crate::config::PurgeConfig;
use crate::error::ConnectionError;
use crate::histogram::KeyCategory;
use std::io::BufRead;
use std::time::Duration;
use tracing::{info, warn};

pub trait KeyPurger: Send {
    /// Pipelined DEL; returns how many keys existed.
    fn delete_batch(
        &mut self,
        keys: &[String],
    ) -> impl Future<Output = Result<u64, ConnectionError>> + Send;

    /// Remove a collection `step` members at a time, then the key itself.
    /// Returns members removed before the final DEL.
    fn drain(
        &mut self,
        category: KeyCategory,
        key: &str,
        step: usize,
    ) -> impl Future<Output = Result<u64, ConnectionError>> + Send;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub lines: u64,
    /// Keys handed to the server for deletion.
    pub submitted: u64,
    /// String keys the server reported as existing, plus one per drained collection.
    pub deleted: u64,
    pub members_drained: u64,
    pub skipped: u64,
}

/// `type,key`; the key keeps any further commas. Blank lines give `None`.
pub fn parse_key_line(line: &str) -> Option<Result<(KeyCategory, String), String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some((kind, key)) = line.split_once(',') else {
        return Some(Err(line.to_string()));
    };
    if key.is_empty() {
        return Some(Err(line.to_string()));
    }
    Some(
        kind.parse::<KeyCategory>()
            .map(|c| (c, key.to_string()))
            .map_err(|_| line.to_string()),
    )
}

pub async fn purge_keys<P: KeyPurger, R: BufRead>(
    purger: &mut P,
    input: R,
    config: &PurgeConfig,
) -> anyhow::Result<PurgeSummary> {
    let pause = Duration::from_millis(config.pause_ms);
    let mut summary = PurgeSummary::default();
    let mut batch: Vec<String> = Vec::with_capacity(config.batch_size);
    let mut last_progress = 0u64;

    for line in input.lines() {
        let line = line?;
        summary.lines += 1;
        let (category, key) = match parse_key_line(&line) {
            None => continue,
            Some(Ok(entry)) => entry,
            Some(Err(raw)) => {
                warn!(line = %raw, "unrecognised purge line; skipping");
                summary.skipped += 1;
                continue;
            }
        };

        match category {
            KeyCategory::String => {
                batch.push(key);
                if batch.len() >= config.batch_size {
                    flush(purger, &mut batch, &mut summary).await?;
                    tokio::time::sleep(pause).await;
                }
            }
            _ => {
                summary.submitted += 1;
                match purger.drain(category, &key, config.drain_step).await {
                    Ok(members) => {
                        summary.members_drained += members;
                        summary.deleted += 1;
                    }
                    Err(e) if e.is_transport() => return Err(e.into()),
                    Err(e) => {
                        warn!(key = %key, category = %category, error = %e, "drain rejected; skipping key");
                        summary.skipped += 1;
                    }
                }
                tokio::time::sleep(pause).await;
            }
        }

        if summary.submitted / config.progress_every > last_progress {
            last_progress = summary.submitted / config.progress_every;
            info!(submitted = summary.submitted, "purge progress");
        }
    }
    flush(purger, &mut batch, &mut summary).await?;

    info!(
        lines = summary.lines,
        submitted = summary.submitted,
        deleted = summary.deleted,
        members_drained = summary.members_drained,
        skipped = summary.skipped,
        "purge complete"
    );
    Ok(summary)
}

async fn flush<P: KeyPurger>(
    purger: &mut P,
    batch: &mut Vec<String>,
    summary: &mut PurgeSummary,
) -> Result<(), ConnectionError> {
    if batch.is_empty() {
        return Ok(());
    }
    summary.submitted += batch.len() as u64;
    match purger.delete_batch(batch).await {
        Ok(deleted) => summary.deleted += deleted,
        Err(e) if e.is_transport() => return Err(e),
        Err(e) => {
            warn!(keys = batch.len(), error = %e, "DEL batch rejected; skipping batch");
            summary.skipped += batch.len() as u64;
        }
    }
    batch.clear();
    Ok(())
}
