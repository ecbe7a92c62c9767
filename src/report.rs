// Per-tick rollup line: `HH:MM:SS : name conn:ops | ... | ALL conn:ops`.
// Every sink receives the identical line.

use crate::models::Metrics;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointReading {
    Up(Metrics),
    /// Unreachable this tick, or skipped by backoff. Contributes zero.
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSummary {
    pub name: String,
    pub reading: EndpointReading,
}

/// Sums cover this tick only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub entries: Vec<EndpointSummary>,
    pub total_connected: u64,
    pub total_ops: u64,
}

impl TickReport {
    pub fn new(tick: u64, entries: Vec<EndpointSummary>) -> Self {
        let (total_connected, total_ops) =
            entries
                .iter()
                .fold((0, 0), |(c, o), e| match &e.reading {
                    EndpointReading::Up(m) => (c + m.connected, o + m.ops),
                    EndpointReading::Down => (c, o),
                });
        Self {
            tick,
            entries,
            total_connected,
            total_ops,
        }
    }

    pub fn down_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.reading == EndpointReading::Down)
            .count()
    }

    /// `time_label` is the wall-clock prefix (e.g. `14:03:59`).
    pub fn format_line(&self, time_label: &str) -> String {
        let mut parts: Vec<String> = self
            .entries
            .iter()
            .map(|e| match &e.reading {
                EndpointReading::Up(m) => format!("{} {:>4}:{:<6}", e.name, m.connected, m.ops),
                EndpointReading::Down => format!("{} {:>4}:{:<6}", e.name, "-", "-"),
            })
            .collect();
        parts.push(format!(
            "ALL {:>5}:{:<6}",
            self.total_connected, self.total_ops
        ));
        format!("{} : {}", time_label, parts.join(" | "))
    }
}

/// Console plus session log (or any other writers in tests).
pub struct Reporter {
    sinks: Vec<Box<dyn Write + Send>>,
}

impl Reporter {
    pub fn new(sinks: Vec<Box<dyn Write + Send>>) -> Self {
        Self { sinks }
    }

    /// Stdout plus an append-only session log file.
    pub fn console_and_file(path: &std::path::Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(vec![Box::new(std::io::stdout()), Box::new(file)]))
    }

    /// Formats and writes one line per tick. A failing sink is logged, the
    /// others still get the line.
    pub fn report(&mut self, report: &TickReport) -> String {
        let line = report.format_line(&chrono::Local::now().format("%H:%M:%S").to_string());
        self.emit(&line);
        line
    }

    pub fn emit(&mut self, line: &str) {
        for (i, sink) in self.sinks.iter_mut().enumerate() {
            if let Err(e) = writeln!(sink, "{}", line).and_then(|_| sink.flush()) {
                tracing::warn!(sink = i, error = %e, "report sink write failed");
            }
        }
    }
}
