// Tick report line format and sink fan-out

mod common;

use common::*;
use fleetwatch::models::Metrics;
use fleetwatch::report::*;

fn up(name: &str, connected: u64, ops: u64) -> EndpointSummary {
    EndpointSummary {
        name: name.to_string(),
        reading: EndpointReading::Up(Metrics {
            connected,
            blocked: 0,
            ops,
        }),
    }
}

fn down(name: &str) -> EndpointSummary {
    EndpointSummary {
        name: name.to_string(),
        reading: EndpointReading::Down,
    }
}

#[test]
fn totals_sum_reachable_endpoints_only() {
    let report = TickReport::new(1, vec![up("a", 10, 5), down("b"), up("c", 7, 100)]);
    assert_eq!(report.total_connected, 17);
    assert_eq!(report.total_ops, 105);
    assert_eq!(report.down_count(), 1);
}

#[test]
fn line_lists_endpoints_in_order_then_total() {
    let report = TickReport::new(1, vec![up("a", 10, 5), down("b")]);
    assert_eq!(
        report.format_line("12:00:00"),
        "12:00:00 : a   10:5      | b    -:-      | ALL    10:5     "
    );
}

#[test]
fn empty_tick_still_reports_total() {
    let report = TickReport::new(3, vec![]);
    assert_eq!(report.format_line("00:00:01"), "00:00:01 : ALL     0:0     ");
}

#[test]
fn every_sink_gets_the_same_line() {
    let console = SharedBuf::new();
    let session = SharedBuf::new();
    let mut reporter = Reporter::new(vec![Box::new(console.clone()), Box::new(session.clone())]);
    let line = reporter.report(&TickReport::new(1, vec![up("a", 1, 2)]));
    assert_eq!(console.contents(), format!("{}\n", line));
    assert_eq!(console.contents(), session.contents());
}

#[test]
fn failing_sink_does_not_starve_the_others() {
    let session = SharedBuf::new();
    let mut reporter = Reporter::new(vec![Box::new(BrokenSink), Box::new(session.clone())]);
    reporter.emit("hello");
    assert_eq!(session.contents(), "hello\n");
}

#[test]
fn session_log_is_appended() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("logs").join("monitor-20240330_095500.log");
    {
        let mut reporter = Reporter::console_and_file(&path).unwrap();
        reporter.emit("first");
    }
    let mut reporter = Reporter::console_and_file(&path).unwrap();
    reporter.emit("second");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
}
