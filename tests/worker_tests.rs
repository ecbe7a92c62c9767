// Monitor loop: tick pipeline, alarm-driven capture, backoff, spawn + shutdown

mod common;

use common::*;
use fleetwatch::capture::{ArtifactWriter, capture_channel, spawn_artifact_writer};
use fleetwatch::models::{ConnectionRecord, Endpoint, Metrics};
use fleetwatch::report::{EndpointReading, Reporter};
use fleetwatch::watcher::AlarmConfig;
use fleetwatch::worker::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Duration;

fn settings() -> MonitorSettings {
    MonitorSettings {
        interval_ms: 1000,
        alarm: AlarmConfig::default(),
        sample_timeout: Duration::from_secs(1),
        capture_timeout: Duration::from_secs(5),
        max_backoff_ticks: 30,
        stats_log_interval_secs: 3600,
    }
}

fn monitor_for(
    connector: &FakeConnector,
    endpoints: Vec<Endpoint>,
    out: &SharedBuf,
    queue: usize,
) -> (
    Monitor<FakeConnector>,
    tokio::sync::mpsc::Receiver<fleetwatch::models::DiagnosticArtifact>,
) {
    let (tx, rx) = capture_channel(queue);
    let reporter = Reporter::new(vec![Box::new(out.clone())]);
    let monitor = Monitor::new(connector.clone(), endpoints, reporter, tx, &settings());
    (monitor, rx)
}

#[test]
fn backoff_grows_exponentially_and_caps() {
    let skips: Vec<u64> = (0..7).map(|k| backoff_ticks(k, 30)).collect();
    assert_eq!(skips, vec![0, 0, 1, 3, 7, 15, 30]);
    assert_eq!(backoff_ticks(200, 30), 30);
    assert_eq!(backoff_ticks(5, 0), 0);
}

#[tokio::test]
async fn tick_reports_every_endpoint_in_order() {
    let connector = FakeConnector::new();
    connector.set("a", |s| s.status = redis_status(10, 0, 5));
    connector.set("b", |s| s.status = redis_status(20, 1, 7));
    let out = SharedBuf::new();
    let (mut monitor, _rx) = monitor_for(
        &connector,
        vec![redis_endpoint("a", 6379), redis_endpoint("b", 6380)],
        &out,
        4,
    );

    let report = monitor.tick().await;
    assert_eq!(report.tick, 1);
    assert_eq!(report.entries[0].name, "a");
    assert_eq!(report.entries[1].name, "b");
    assert_eq!(report.total_connected, 30);
    assert_eq!(report.total_ops, 12);
    let lines = out.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("| ALL    30:12    "), "{}", lines[0]);
}

#[tokio::test]
async fn overload_fires_one_capture_then_rearms_after_cooldown() {
    let connector = FakeConnector::new();
    connector.set("a", |s| {
        s.status = redis_status(1500, 0, 300);
        s.records = vec![ConnectionRecord::new(vec![("id".into(), "1".into())])];
    });
    let out = SharedBuf::new();
    let (mut monitor, mut rx) = monitor_for(&connector, vec![redis_endpoint("a", 6379)], &out, 4);

    monitor.tick().await;
    let artifact = rx.try_recv().expect("capture queued on first breach");
    assert_eq!(artifact.records.len(), 1);
    assert_eq!(artifact.endpoint.name, "a");

    monitor.tick().await;
    connector.set("a", |s| s.status = redis_status(10, 0, 3));
    for _ in 0..55 {
        monitor.tick().await;
    }
    assert!(rx.try_recv().is_err(), "no capture while cooling");
    assert!(monitor.watcher().state(0).unwrap().is_armed());
    assert_eq!(monitor.captures_fired(), 1);
    assert_eq!(out.lines().len(), 57);
}

#[tokio::test]
async fn full_capture_queue_drops_without_stalling() {
    let connector = FakeConnector::new();
    connector.set("a", |s| s.status = redis_status(1500, 0, 0));
    connector.set("b", |s| s.status = redis_status(0, 5, 0));
    let out = SharedBuf::new();
    let (mut monitor, mut rx) = monitor_for(
        &connector,
        vec![redis_endpoint("a", 6379), redis_endpoint("b", 6380)],
        &out,
        1,
    );

    let report = monitor.tick().await;
    assert_eq!(report.entries.len(), 2);
    assert_eq!(monitor.captures_fired(), 2);
    assert_eq!(rx.try_recv().unwrap().endpoint.name, "a");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn unreachable_endpoint_reads_as_down_and_backs_off() {
    let connector = FakeConnector::new();
    connector.set("a", |s| s.status = redis_status(10, 0, 1));
    connector.set("b", |s| s.down = true);
    let out = SharedBuf::new();
    let (mut monitor, _rx) = monitor_for(
        &connector,
        vec![redis_endpoint("a", 6379), redis_endpoint("b", 6380)],
        &out,
        4,
    );

    let report = monitor.tick().await;
    assert_eq!(report.entries[1].reading, EndpointReading::Down);
    assert_eq!(report.total_connected, 10);
    assert!(out.lines()[0].contains("b    -:-"));

    // "a" connects once and is reused; "b" is attempted on ticks 1, 2, 4, 8.
    for _ in 0..7 {
        monitor.tick().await;
    }
    assert_eq!(connector.connects(), 1 + 4);
}

#[tokio::test]
async fn recovered_endpoint_is_sampled_again() {
    let connector = FakeConnector::new();
    connector.set("a", |s| {
        s.status = redis_status(42, 0, 1);
        s.down = true;
    });
    let out = SharedBuf::new();
    let (mut monitor, _rx) = monitor_for(&connector, vec![redis_endpoint("a", 6379)], &out, 4);

    assert_eq!(monitor.tick().await.entries[0].reading, EndpointReading::Down);
    connector.set("a", |s| s.down = false);
    let reading = monitor.tick().await.entries[0].reading.clone();
    assert_eq!(
        reading,
        EndpointReading::Up(Metrics {
            connected: 42,
            blocked: 0,
            ops: 1
        })
    );
}

#[tokio::test]
async fn down_endpoint_keeps_cooling() {
    let connector = FakeConnector::new();
    connector.set("a", |s| s.status = redis_status(1500, 0, 0));
    let out = SharedBuf::new();
    let (mut monitor, _rx) = monitor_for(&connector, vec![redis_endpoint("a", 6379)], &out, 4);

    monitor.tick().await;
    connector.set("a", |s| s.down = true);
    monitor.tick().await;
    assert_eq!(monitor.watcher().state(0).unwrap().cooling_elapsed(), 1);
}

#[tokio::test(start_paused = true)]
async fn spawned_monitor_ticks_captures_and_shuts_down() {
    let dir = tempfile::TempDir::new().unwrap();
    let connector = FakeConnector::new();
    connector.set("a", |s| s.status = redis_status(1500, 0, 300));
    connector.set("b", |s| s.status = redis_status(5, 0, 1));

    let out = SharedBuf::new();
    let written = Arc::new(AtomicU64::new(0));
    let (capture_tx, capture_rx) = capture_channel(4);
    let writer_handle =
        spawn_artifact_writer(capture_rx, ArtifactWriter::new(dir.path()), written.clone());
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let handle = spawn(
        MonitorDeps {
            connector: connector.clone(),
            endpoints: vec![redis_endpoint("a", 6379), redis_endpoint("b", 6380)],
            reporter: Reporter::new(vec![Box::new(out.clone())]),
            capture_tx,
            artifacts_written_total: written.clone(),
            shutdown_rx,
        },
        settings(),
    );

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let _ = shutdown_tx.send(());
    handle.await.unwrap();
    writer_handle.await.unwrap();

    assert_eq!(out.lines().len(), 3);
    assert_eq!(written.load(Ordering::Relaxed), 1);
    let files: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("10.0.0.1_6379-clientList-"));
}
