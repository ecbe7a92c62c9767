use anyhow::Result;
use clap::{Parser, Subcommand};
use fleetwatch::models::{Endpoint, EndpointKind};
use fleetwatch::output::{OutputFormat, Printer, table_of};
use fleetwatch::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[derive(Parser)]
#[command(name = version::NAME, version = version::VERSION, about = "Redis and MySQL fleet telemetry")]
struct Cli {
    /// Config file (falls back to $CONFIG_FILE, then fleetwatch.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll every endpoint, alarm on overload, capture connection listings.
    Monitor,
    /// Key-size distribution of one Redis endpoint.
    Scan {
        #[arg(short = 'e', long)]
        endpoint: String,
    },
    /// Delete the keys listed in a `type,key` file.
    Purge {
        #[arg(short = 'e', long)]
        endpoint: String,
        #[arg(short = 'f', long)]
        file: PathBuf,
    },
    /// Rolling Threads_running / Threads_connected / QPS / TPS.
    MysqlStatus {
        #[arg(short = 'e', long)]
        endpoint: Option<String>,
    },
    /// Connection and timeout variables per MySQL endpoint.
    MysqlVars {
        #[arg(short = 'e', long)]
        endpoint: Option<String>,
    },
    /// Run one SQL statement on each MySQL endpoint.
    MysqlExec {
        #[arg(short = 'e', long)]
        endpoint: Option<String>,
        #[arg(long)]
        sql: String,
    },
    /// Statement and table counts from a MySQL general query log.
    GeneralLog {
        file: PathBuf,
        /// Wall-clock time the log ends at (HH:MM:SS); defaults to its last stamp.
        end: Option<String>,
        #[arg(long, default_value_t = general_log::DEFAULT_TOP)]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut printer = Printer::stdout(cli.format);

    // The log counter needs no endpoints or credentials.
    if let Command::GeneralLog { file, end, top } = &cli.command {
        return run_general_log(&mut printer, file, end.as_deref(), *top);
    }

    let app_config = match &cli.config {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    let connector = sampler::FleetConnector::new(
        app_config.credentials.clone(),
        Duration::from_millis(app_config.monitor.sample_timeout_ms),
    );

    match cli.command {
        Command::Monitor => run_monitor(&app_config, connector).await,
        Command::Scan { endpoint } => {
            let endpoint = pick_one(&app_config, &endpoint, EndpointKind::Redis)?;
            let mut client = connector.connect_redis(&endpoint).await?;
            let report = scan::run_scan(&mut client, &endpoint.name, app_config.scan.batch_count).await?;
            printer.line(&format!(
                "{} keys seen, {} skipped, {} .. {}",
                report.keys_seen,
                report.keys_skipped,
                report.started_at.format("%H:%M:%S"),
                report.finished_at.format("%H:%M:%S"),
            ))?;
            printer.table(&table_of(&report.rows()))?;
            printer.value(&report)?;
            Ok(())
        }
        Command::Purge { endpoint, file } => {
            let endpoint = pick_one(&app_config, &endpoint, EndpointKind::Redis)?;
            let input = std::fs::File::open(&file)
                .map_err(|e| anyhow::anyhow!("opening {}: {}", file.display(), e))?;
            let mut client = connector.connect_redis(&endpoint).await?;
            let summary =
                purge::purge_keys(&mut client, std::io::BufReader::new(input), &app_config.purge).await?;
            printer.line(&format!(
                "{} lines, {} keys submitted, {} deleted, {} members drained, {} skipped",
                summary.lines, summary.submitted, summary.deleted, summary.members_drained, summary.skipped
            ))?;
            Ok(())
        }
        Command::MysqlStatus { endpoint } => {
            let trackers = pick_mysql(&app_config, endpoint.as_deref())?
                .into_iter()
                .map(|ep| mysql_admin::StatusTracker::new(ep, app_config.mysql_status.header_every))
                .collect();
            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
            tokio::spawn(async move {
                shutdown_signal().await;
                let _ = shutdown_tx.send(());
            });
            mysql_admin::run_status(
                &connector,
                trackers,
                &app_config.mysql_status,
                Duration::from_millis(app_config.monitor.sample_timeout_ms),
                &mut printer,
                shutdown_rx,
            )
            .await
        }
        Command::MysqlVars { endpoint } => {
            let mut rows = Vec::new();
            for ep in pick_mysql(&app_config, endpoint.as_deref())? {
                let mut client = connector.connect_mysql(&ep).await?;
                rows.push(mysql_admin::collect_variables(&mut client).await?);
            }
            printer.table(&table_of(&rows))?;
            printer.value(&rows)?;
            Ok(())
        }
        Command::MysqlExec { endpoint, sql } => {
            for ep in pick_mysql(&app_config, endpoint.as_deref())? {
                let result = match connector.connect_mysql(&ep).await {
                    Ok(mut client) => mysql_admin::exec(&mut client, &sql).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(result) => {
                        printer.table(&result.table())?;
                        printer.value(&result)?;
                    }
                    Err(e) => tracing::warn!(endpoint = %ep.name, error = %e, "statement failed"),
                }
            }
            Ok(())
        }
        Command::GeneralLog { .. } => Ok(()),
    }
}

async fn run_monitor(app_config: &config::AppConfig, connector: sampler::FleetConnector) -> Result<()> {
    anyhow::ensure!(!app_config.endpoints.is_empty(), "no [[endpoints]] configured");
    let monitor = &app_config.monitor;
    let log_dir = PathBuf::from(&monitor.log_dir);
    let session_log = log_dir.join(format!(
        "monitor-{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    let reporter = report::Reporter::console_and_file(&session_log)
        .map_err(|e| anyhow::anyhow!("session log {}: {}", session_log.display(), e))?;
    tracing::info!(
        version = version::VERSION,
        endpoints = app_config.endpoints.len(),
        session_log = %session_log.display(),
        "monitor starting"
    );

    let artifacts_written_total = Arc::new(AtomicU64::new(0));
    let (capture_tx, capture_rx) = capture::capture_channel(monitor.capture_queue);
    let writer_handle = capture::spawn_artifact_writer(
        capture_rx,
        capture::ArtifactWriter::new(&log_dir),
        artifacts_written_total.clone(),
    );
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let mut monitor_handle = worker::spawn(
        worker::MonitorDeps {
            connector,
            endpoints: app_config.endpoints.clone(),
            reporter,
            capture_tx,
            artifacts_written_total,
            shutdown_rx,
        },
        worker::MonitorSettings {
            interval_ms: monitor.interval_ms,
            alarm: app_config.alarm,
            sample_timeout: Duration::from_millis(monitor.sample_timeout_ms),
            capture_timeout: Duration::from_millis(monitor.capture_timeout_ms),
            max_backoff_ticks: monitor.max_backoff_ticks,
            stats_log_interval_secs: monitor.stats_log_interval_secs,
        },
    );

    tokio::select! {
        result = &mut monitor_handle => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            let _ = monitor_handle.await;
        }
    }
    // Every sender is gone once the monitor exits; the writer drains and stops.
    let _ = writer_handle.await;
    Ok(())
}

fn run_general_log(
    printer: &mut Printer,
    file: &std::path::Path,
    end: Option<&str>,
    top: usize,
) -> Result<()> {
    let end = end.map(general_log::parse_end_time).transpose()?;
    let input = std::fs::File::open(file)
        .map_err(|e| anyhow::anyhow!("opening {}: {}", file.display(), e))?;
    let stats = general_log::GeneralLogStats::parse(std::io::BufReader::new(input))?;
    let report = stats.report(end, top);

    printer.line(&format!(
        "{} entries over {} seconds ({} .. {}), top {} tables",
        stats.entries(),
        report.elapsed_secs,
        report.begin.as_deref().unwrap_or("-"),
        report.end.as_deref().unwrap_or("-"),
        top
    ))?;
    for kind in &report.kinds {
        printer.line("")?;
        printer.line(&format!("{} total executed: {}", kind.kind, kind.total))?;
        printer.table(&table_of(&kind.top))?;
    }
    printer.value(&report)?;
    Ok(())
}

fn pick_one(app_config: &config::AppConfig, name: &str, kind: EndpointKind) -> Result<Endpoint> {
    let endpoint = app_config.endpoint(name)?;
    anyhow::ensure!(
        endpoint.kind == kind,
        "endpoint {:?} is {}, expected {}",
        name,
        endpoint.kind,
        kind
    );
    Ok(endpoint.clone())
}

fn pick_mysql(app_config: &config::AppConfig, name: Option<&str>) -> Result<Vec<Endpoint>> {
    if let Some(name) = name {
        return Ok(vec![pick_one(app_config, name, EndpointKind::Mysql)?]);
    }
    let endpoints = app_config.endpoints_of(EndpointKind::Mysql);
    anyhow::ensure!(!endpoints.is_empty(), "no mysql endpoints configured");
    Ok(endpoints)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
