// MySQL admin commands: rolling status (running/connected/QPS/TPS),
// key server variables, ad-hoc SQL across endpoints.

use crate::config::MysqlStatusConfig;
use crate::error::ConnectionError;
use crate::models::{Endpoint, Sample};
use crate::output::{OutputTable, Printer, Tabular};
use crate::sampler::{Connector, EndpointClient, MysqlClient, bounded, counter_rate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;
use tokio::sync::oneshot;

pub const VARIABLE_NAMES: [&str; 7] = [
    "max_connections",
    "max_user_connections",
    "connect_timeout",
    "interactive_timeout",
    "wait_timeout",
    "long_query_time",
    "read_only",
];

const SELECT_COUNTERS: &[&str] = &["Com_select"];
const WRITE_COUNTERS: &[&str] = &["Com_insert", "Com_update", "Com_delete"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub endpoint: String,
    pub time: String,
    pub running: u64,
    pub connected: u64,
    pub qps: u64,
    pub tps: u64,
}

impl StatusRow {
    pub fn between(endpoint: &str, previous: &Sample, current: &Sample, time: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            time: time.to_string(),
            running: current.counter("Threads_running"),
            connected: current.counter("Threads_connected"),
            qps: counter_rate(previous, current, SELECT_COUNTERS),
            tps: counter_rate(previous, current, WRITE_COUNTERS),
        }
    }

    pub fn format_line(&self) -> String {
        format!(
            "{:>8} | {:>8} | {:>10} | {:>7} | {:>6}",
            self.time, self.running, self.connected, self.qps, self.tps
        )
    }

    pub fn header_lines(endpoint: &Endpoint) -> Vec<String> {
        let rule = "-".repeat(51);
        vec![
            rule.clone(),
            format!("Stat from {} ({})", endpoint.name, endpoint.addr()),
            rule.clone(),
            format!(
                "{:>8} | {:>8} | {:>10} | {:>7} | {:>6}",
                "TIME", "RUNNING", "CONNECTED", "QPS", "TPS"
            ),
            rule,
        ]
    }
}

/// One endpoint's rolling status. The first sample only primes the baseline.
#[derive(Debug)]
pub struct StatusTracker {
    endpoint: Endpoint,
    previous: Option<Sample>,
    rows: u64,
    header_every: u64,
}

/// What to print for one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub header: bool,
    pub row: StatusRow,
}

impl StatusTracker {
    pub fn new(endpoint: Endpoint, header_every: u64) -> Self {
        Self {
            endpoint,
            previous: None,
            rows: 0,
            header_every: header_every.max(1),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn observe(&mut self, sample: Sample, time: &str) -> Option<StatusLine> {
        let previous = self.previous.replace(sample)?;
        let current = self.previous.as_ref()?;
        let row = StatusRow::between(&self.endpoint.name, &previous, current, time);
        let header = self.rows % self.header_every == 0;
        self.rows += 1;
        Some(StatusLine { header, row })
    }

    /// Forget the baseline after a failed sample; the next one primes again.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Poll every endpoint until shutdown, printing one row per endpoint per tick.
/// Connections are opened on first use; a transport failure drops the
/// connection and the next tick reconnects.
pub async fn run_status<C: Connector, W: Write>(
    connector: &C,
    trackers: Vec<StatusTracker>,
    config: &MysqlStatusConfig,
    sample_timeout: Duration,
    printer: &mut Printer<W>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let mut slots: Vec<(StatusTracker, Option<C::Client>)> =
        trackers.into_iter().map(|t| (t, None)).collect();
    let mut tick = tokio::time::interval(Duration::from_millis(config.interval_ms));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown_rx => break,
        }
        let time = chrono::Local::now().format("%H:%M:%S").to_string();
        for (tracker, client) in slots.iter_mut() {
            let endpoint = tracker.endpoint().clone();
            match status_once(connector, &endpoint, client, sample_timeout).await {
                Ok(sample) => {
                    if let Some(line) = tracker.observe(sample, &time) {
                        print_status_line(printer, &endpoint, &line)?;
                    }
                }
                Err(e) => {
                    tracker.reset();
                    if e.is_transport() {
                        *client = None;
                    }
                    tracing::warn!(endpoint = %endpoint.name, error = %e, "status sample failed");
                }
            }
        }
    }
    Ok(())
}

async fn status_once<C: Connector>(
    connector: &C,
    endpoint: &Endpoint,
    client: &mut Option<C::Client>,
    limit: Duration,
) -> Result<Sample, ConnectionError> {
    let conn = match client.take() {
        Some(conn) => conn,
        None => bounded(endpoint, "connect", limit, connector.connect(endpoint)).await?,
    };
    let conn = client.insert(conn);
    bounded(endpoint, "status", limit, conn.status()).await
}

fn print_status_line<W: Write>(
    printer: &mut Printer<W>,
    endpoint: &Endpoint,
    line: &StatusLine,
) -> std::io::Result<()> {
    if line.header {
        for h in StatusRow::header_lines(endpoint) {
            printer.line(&h)?;
        }
    }
    printer.line(&line.row.format_line())?;
    printer.value(&line.row)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariablesRow {
    pub name: String,
    pub addr: String,
    /// Keyed by variable name; absent when the server does not expose it.
    pub values: BTreeMap<String, String>,
}

impl VariablesRow {
    pub fn new(endpoint: &Endpoint, variables: BTreeMap<String, String>) -> Self {
        let values = variables
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            name: endpoint.name.clone(),
            addr: endpoint.addr(),
            values,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl Tabular for VariablesRow {
    fn columns() -> Vec<String> {
        [
            "NAME",
            "ADDR",
            "MAX_CONN",
            "USER_CONN",
            "CONN_TIMEOUT",
            "INTERACTIVE_TIMEOUT",
            "WAIT_TIMEOUT",
            "LONG_QUERY",
            "READ_ONLY",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn cells(&self) -> Vec<String> {
        let mut cells = vec![self.name.clone(), self.addr.clone()];
        cells.extend(
            VARIABLE_NAMES
                .iter()
                .map(|n| self.get(n).unwrap_or("-").to_string()),
        );
        cells
    }
}

pub async fn collect_variables(client: &mut MysqlClient) -> Result<VariablesRow, ConnectionError> {
    let variables = client.variables(&VARIABLE_NAMES).await?;
    Ok(VariablesRow::new(client.endpoint(), variables))
}

/// Rows from one statement on one endpoint, prefixed with the endpoint name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecResult {
    pub endpoint: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExecResult {
    pub fn table(&self) -> OutputTable {
        let mut header = vec!["ENDPOINT".to_string()];
        header.extend(self.columns.iter().cloned());
        let mut table = vec![header];
        table.extend(self.rows.iter().map(|row| {
            let mut cells = vec![self.endpoint.clone()];
            cells.extend(row.iter().cloned());
            cells
        }));
        table
    }
}

pub async fn exec(client: &mut MysqlClient, sql: &str) -> Result<ExecResult, ConnectionError> {
    let (columns, rows) = client.execute(sql).await?;
    tracing::info!(endpoint = %client.endpoint().name, rows = rows.len(), "statement executed");
    Ok(ExecResult {
        endpoint: client.endpoint().name.clone(),
        columns,
        rows,
    })
}
