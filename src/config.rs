use crate::models::{Endpoint, EndpointKind};
use crate::watcher::AlarmConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub alarm: AlarmConfig,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub purge: PurgeConfig,
    #[serde(default)]
    pub mysql_status: MysqlStatusConfig,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Directory for the session log and diagnostic artifacts.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_sample_timeout_ms")]
    pub sample_timeout_ms: u64,
    /// Upper bound for the listing + status round trips of one capture.
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
    /// Pending artifacts between the sampling loop and the writer task.
    #[serde(default = "default_capture_queue")]
    pub capture_queue: usize,
    /// Cap on ticks an unreachable endpoint is skipped for. 0 retries every tick.
    #[serde(default = "default_max_backoff_ticks")]
    pub max_backoff_ticks: u64,
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_log_dir() -> String {
    "logs".into()
}

fn default_sample_timeout_ms() -> u64 {
    2000
}

fn default_capture_timeout_ms() -> u64 {
    10_000
}

fn default_capture_queue() -> usize {
    16
}

fn default_max_backoff_ticks() -> u64 {
    30
}

fn default_stats_log_interval_secs() -> u64 {
    60
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            log_dir: default_log_dir(),
            sample_timeout_ms: default_sample_timeout_ms(),
            capture_timeout_ms: default_capture_timeout_ms(),
            capture_queue: default_capture_queue(),
            max_backoff_ticks: default_max_backoff_ticks(),
            stats_log_interval_secs: default_stats_log_interval_secs(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub redis_password: Option<String>,
    #[serde(default = "default_mysql_user")]
    pub mysql_user: String,
    #[serde(default)]
    pub mysql_password: String,
}

fn default_mysql_user() -> String {
    "root".into()
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            redis_password: None,
            mysql_user: default_mysql_user(),
            mysql_password: String::new(),
        }
    }
}

// Passwords stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("redis_password", &self.redis_password.as_ref().map(|_| "***"))
            .field("mysql_user", &self.mysql_user)
            .field("mysql_password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// COUNT hint passed to each SCAN call.
    #[serde(default = "default_batch_count")]
    pub batch_count: usize,
}

fn default_batch_count() -> usize {
    20
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_count: default_batch_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurgeConfig {
    #[serde(default = "default_purge_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
    /// Members removed per round trip when draining a collection key.
    #[serde(default = "default_drain_step")]
    pub drain_step: usize,
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

fn default_purge_batch_size() -> usize {
    300
}

fn default_pause_ms() -> u64 {
    100
}

fn default_drain_step() -> usize {
    300
}

fn default_progress_every() -> u64 {
    900
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            batch_size: default_purge_batch_size(),
            pause_ms: default_pause_ms(),
            drain_step: default_drain_step(),
            progress_every: default_progress_every(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MysqlStatusConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Reprint the column header after this many rows.
    #[serde(default = "default_header_every")]
    pub header_every: u64,
}

fn default_header_every() -> u64 {
    50
}

impl Default for MysqlStatusConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            header_every: default_header_every(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "fleetwatch.toml".into());
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn endpoint(&self, name: &str) -> anyhow::Result<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| anyhow::anyhow!("no endpoint named {:?} in config", name))
    }

    pub fn endpoints_of(&self, kind: EndpointKind) -> Vec<Endpoint> {
        self.endpoints
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.monitor.interval_ms > 0,
            "monitor.interval_ms must be > 0, got {}",
            self.monitor.interval_ms
        );
        anyhow::ensure!(
            !self.monitor.log_dir.is_empty(),
            "monitor.log_dir must be non-empty"
        );
        anyhow::ensure!(
            self.monitor.sample_timeout_ms > 0,
            "monitor.sample_timeout_ms must be > 0, got {}",
            self.monitor.sample_timeout_ms
        );
        anyhow::ensure!(
            self.monitor.capture_timeout_ms > 0,
            "monitor.capture_timeout_ms must be > 0, got {}",
            self.monitor.capture_timeout_ms
        );
        anyhow::ensure!(
            self.monitor.capture_queue > 0,
            "monitor.capture_queue must be > 0, got {}",
            self.monitor.capture_queue
        );
        anyhow::ensure!(
            self.monitor.stats_log_interval_secs > 0,
            "monitor.stats_log_interval_secs must be > 0, got {}",
            self.monitor.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.scan.batch_count > 0,
            "scan.batch_count must be > 0, got {}",
            self.scan.batch_count
        );
        anyhow::ensure!(
            self.purge.batch_size > 0,
            "purge.batch_size must be > 0, got {}",
            self.purge.batch_size
        );
        anyhow::ensure!(
            self.purge.drain_step > 0,
            "purge.drain_step must be > 0, got {}",
            self.purge.drain_step
        );
        anyhow::ensure!(
            self.purge.progress_every > 0,
            "purge.progress_every must be > 0, got {}",
            self.purge.progress_every
        );
        anyhow::ensure!(
            self.mysql_status.interval_ms > 0,
            "mysql_status.interval_ms must be > 0, got {}",
            self.mysql_status.interval_ms
        );
        anyhow::ensure!(
            self.mysql_status.header_every > 0,
            "mysql_status.header_every must be > 0, got {}",
            self.mysql_status.header_every
        );

        let mut seen = HashSet::new();
        for e in &self.endpoints {
            anyhow::ensure!(!e.name.is_empty(), "endpoints[].name must be non-empty");
            anyhow::ensure!(
                !e.host.is_empty(),
                "endpoints[{}].host must be non-empty",
                e.name
            );
            anyhow::ensure!(
                e.port > 0,
                "endpoints[{}].port must be between 1 and 65535, got {}",
                e.name,
                e.port
            );
            anyhow::ensure!(
                seen.insert(e.name.as_str()),
                "endpoints[].name must be unique, {:?} appears twice",
                e.name
            );
        }
        Ok(())
    }
}
