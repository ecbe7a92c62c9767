// Monitor loop: sample every endpoint serially each tick, feed the alarm,
// queue captures for the artifact writer, print the rollup line.
// AlarmState lives here and is only touched by this task.

use crate::capture;
use crate::error::{CaptureError, ConnectionError, PartialDataError};
use crate::models::{DiagnosticArtifact, Endpoint, Metrics, Sample};
use crate::report::{EndpointReading, EndpointSummary, Reporter, TickReport};
use crate::sampler::{self, Connector, EndpointClient, bounded};
use crate::watcher::{AlarmConfig, ThresholdWatcher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, interval};
use tracing::Instrument;

/// Loop timing, alarm thresholds and bounds on remote calls.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval_ms: u64,
    pub alarm: AlarmConfig,
    pub sample_timeout: Duration,
    pub capture_timeout: Duration,
    pub max_backoff_ticks: u64,
    /// How often to log monitor stats (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Connector, endpoints, sinks and shutdown for the spawned loop.
pub struct MonitorDeps<C: Connector> {
    pub connector: C,
    pub endpoints: Vec<Endpoint>,
    pub reporter: Reporter,
    pub capture_tx: mpsc::Sender<DiagnosticArtifact>,
    pub artifacts_written_total: Arc<AtomicU64>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

/// Ticks to skip after `failures` consecutive failures: 0, 1, 3, 7, ... capped.
pub fn backoff_ticks(failures: u32, max: u64) -> u64 {
    if failures <= 1 {
        return 0;
    }
    1u64.checked_shl(failures - 1)
        .unwrap_or(u64::MAX)
        .saturating_sub(1)
        .min(max)
}

struct Slot<K> {
    endpoint: Endpoint,
    client: Option<K>,
    previous: Option<Sample>,
    failures: u32,
    skip_ticks: u64,
}

pub struct Monitor<C: Connector> {
    connector: C,
    slots: Vec<Slot<C::Client>>,
    watcher: ThresholdWatcher,
    reporter: Reporter,
    capture_tx: mpsc::Sender<DiagnosticArtifact>,
    sample_timeout: Duration,
    capture_timeout: Duration,
    max_backoff_ticks: u64,
    ticks: u64,
    captures_fired: u64,
}

impl<C: Connector> Monitor<C> {
    pub fn new(
        connector: C,
        endpoints: Vec<Endpoint>,
        reporter: Reporter,
        capture_tx: mpsc::Sender<DiagnosticArtifact>,
        config: &MonitorSettings,
    ) -> Self {
        let watcher = ThresholdWatcher::new(config.alarm, endpoints.len());
        let slots = endpoints
            .into_iter()
            .map(|endpoint| Slot {
                endpoint,
                client: None,
                previous: None,
                failures: 0,
                skip_ticks: 0,
            })
            .collect();
        Self {
            connector,
            slots,
            watcher,
            reporter,
            capture_tx,
            sample_timeout: config.sample_timeout,
            capture_timeout: config.capture_timeout,
            max_backoff_ticks: config.max_backoff_ticks,
            ticks: 0,
            captures_fired: 0,
        }
    }

    pub fn watcher(&self) -> &ThresholdWatcher {
        &self.watcher
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn captures_fired(&self) -> u64 {
        self.captures_fired
    }

    /// One full tick. The returned report has already been written to every sink.
    pub async fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        let mut entries = Vec::with_capacity(self.slots.len());
        for i in 0..self.slots.len() {
            let reading = self.sample_slot(i).await;
            let metrics = match &reading {
                EndpointReading::Up(m) => *m,
                EndpointReading::Down => Metrics::default(),
            };
            if self.watcher.evaluate(i, &metrics).fire {
                self.capture_slot(i).await;
            }
            entries.push(EndpointSummary {
                name: self.slots[i].endpoint.name.clone(),
                reading,
            });
        }
        let report = TickReport::new(self.ticks, entries);
        self.reporter.report(&report);
        report
    }

    async fn sample_slot(&mut self, i: usize) -> EndpointReading {
        let slot = &mut self.slots[i];
        if slot.skip_ticks > 0 {
            slot.skip_ticks -= 1;
            return EndpointReading::Down;
        }

        let result = sample_once(&self.connector, slot, self.sample_timeout).await;

        match result {
            Ok(sample) => {
                if slot.failures > 0 {
                    tracing::info!(
                        endpoint = %slot.endpoint.name,
                        after_failures = slot.failures,
                        "endpoint recovered"
                    );
                }
                slot.failures = 0;
                let missing = sample.missing(sampler::expected_fields(slot.endpoint.kind));
                if !missing.is_empty() {
                    let partial = PartialDataError {
                        endpoint: slot.endpoint.name.clone(),
                        missing: missing.iter().map(|s| s.to_string()).collect(),
                    };
                    tracing::debug!(error = %partial, "partial status");
                }
                let metrics =
                    sampler::metrics(slot.endpoint.kind, &sample, slot.previous.as_ref());
                slot.previous = Some(sample);
                EndpointReading::Up(metrics)
            }
            Err(e) => {
                slot.client = None;
                slot.failures = slot.failures.saturating_add(1);
                slot.skip_ticks = backoff_ticks(slot.failures, self.max_backoff_ticks);
                tracing::warn!(
                    endpoint = %slot.endpoint.name,
                    error = %e,
                    consecutive_failures = slot.failures,
                    skip_ticks = slot.skip_ticks,
                    "sample failed"
                );
                EndpointReading::Down
            }
        }
    }

    async fn capture_slot(&mut self, i: usize) {
        let slot = &mut self.slots[i];
        let Some(client) = slot.client.as_mut() else {
            return;
        };
        self.captures_fired += 1;
        tracing::info!(endpoint = %slot.endpoint.name, "alarm fired; capturing diagnostics");

        match capture::collect(client, &slot.endpoint, self.capture_timeout).await {
            Ok(artifact) => match self.capture_tx.try_send(artifact) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(artifact)) => {
                    let e = CaptureError::QueueFull(artifact.endpoint.name);
                    tracing::warn!(error = %e, "capture dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!(endpoint = %slot.endpoint.name, "artifact writer closed; capture dropped");
                }
            },
            Err(e) => {
                if matches!(&e, CaptureError::Listing(ce) if ce.is_transport()) {
                    slot.client = None;
                }
                tracing::warn!(endpoint = %slot.endpoint.name, error = %e, "capture failed");
            }
        }
    }
}

/// Reuse the slot's connection, or open a new one, then take one status sample.
async fn sample_once<C: Connector>(
    connector: &C,
    slot: &mut Slot<C::Client>,
    limit: Duration,
) -> Result<Sample, ConnectionError> {
    let client = match slot.client.take() {
        Some(client) => client,
        None => connector.connect(&slot.endpoint).await?,
    };
    let client = slot.client.insert(client);
    bounded(&slot.endpoint, "status", limit, client.status()).await
}

pub fn spawn<C: Connector>(deps: MonitorDeps<C>, config: MonitorSettings) -> tokio::task::JoinHandle<()> {
    let MonitorDeps {
        connector,
        endpoints,
        reporter,
        capture_tx,
        artifacts_written_total,
        mut shutdown_rx,
    } = deps;

    let span = tracing::span!(
        tracing::Level::DEBUG,
        "monitor",
        interval_ms = config.interval_ms,
        endpoints = endpoints.len()
    );
    let mut monitor = Monitor::new(connector, endpoints, reporter, capture_tx, &config);
    let stats_log_interval = Duration::from_secs(config.stats_log_interval_secs);

    tokio::spawn(
        async move {
            let mut tick = interval(Duration::from_millis(config.interval_ms));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut stats_log_tick = interval(stats_log_interval);
            stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut endpoints_down = 0usize;

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        endpoints_down = monitor.tick().await.down_count();
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Monitor shutting down");
                        break;
                    }
                    _ = stats_log_tick.tick() => {
                        tracing::info!(
                            ticks = monitor.ticks(),
                            captures_fired = monitor.captures_fired(),
                            artifacts_written_total = artifacts_written_total.load(Ordering::Relaxed),
                            endpoints_down,
                            "monitor stats"
                        );
                    }
                }
            }
        }
        .instrument(span),
    )
}
