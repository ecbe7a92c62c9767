// Endpoint clients: one status round trip per sample, one bulk listing per capture.
// The clients keep no state between calls beyond the open connection.

mod mysql_client;
mod redis_client;

pub use mysql_client::MysqlClient;
pub use redis_client::RedisClient;

use crate::config::Credentials;
use crate::error::ConnectionError;
use crate::models::{ConnectionRecord, Endpoint, EndpointKind, Metrics, Sample};
use std::time::Duration;

pub trait EndpointClient: Send {
    /// One status query. Unknown fields are kept, missing fields are not an error.
    fn status(&mut self) -> impl Future<Output = Result<Sample, ConnectionError>> + Send;

    /// Active connections, in server order. Not paginated.
    fn list_connections(
        &mut self,
    ) -> impl Future<Output = Result<Vec<ConnectionRecord>, ConnectionError>> + Send;
}

/// Opens the single connection an endpoint owns.
pub trait Connector: Send + Sync + 'static {
    type Client: EndpointClient + 'static;

    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Self::Client, ConnectionError>> + Send;
}

/// Client for whichever store an endpoint is configured as.
pub enum AnyClient {
    Redis(RedisClient),
    Mysql(MysqlClient),
}

impl EndpointClient for AnyClient {
    async fn status(&mut self) -> Result<Sample, ConnectionError> {
        match self {
            AnyClient::Redis(c) => c.status().await,
            AnyClient::Mysql(c) => c.status().await,
        }
    }

    async fn list_connections(&mut self) -> Result<Vec<ConnectionRecord>, ConnectionError> {
        match self {
            AnyClient::Redis(c) => c.list_connections().await,
            AnyClient::Mysql(c) => c.list_connections().await,
        }
    }
}

/// Connects Redis and MySQL endpoints with the configured credentials.
#[derive(Debug, Clone)]
pub struct FleetConnector {
    credentials: Credentials,
    connect_timeout: Duration,
}

impl FleetConnector {
    pub fn new(credentials: Credentials, connect_timeout: Duration) -> Self {
        Self {
            credentials,
            connect_timeout,
        }
    }

    pub async fn connect_redis(&self, endpoint: &Endpoint) -> Result<RedisClient, ConnectionError> {
        bounded(
            endpoint,
            "connect",
            self.connect_timeout,
            RedisClient::connect(endpoint, self.credentials.redis_password.as_deref()),
        )
        .await
    }

    pub async fn connect_mysql(&self, endpoint: &Endpoint) -> Result<MysqlClient, ConnectionError> {
        bounded(
            endpoint,
            "connect",
            self.connect_timeout,
            MysqlClient::connect(
                endpoint,
                &self.credentials.mysql_user,
                &self.credentials.mysql_password,
            ),
        )
        .await
    }
}

impl Connector for FleetConnector {
    type Client = AnyClient;

    async fn connect(&self, endpoint: &Endpoint) -> Result<AnyClient, ConnectionError> {
        match endpoint.kind {
            EndpointKind::Redis => self.connect_redis(endpoint).await.map(AnyClient::Redis),
            EndpointKind::Mysql => self.connect_mysql(endpoint).await.map(AnyClient::Mysql),
        }
    }
}

/// Run one remote call with an upper bound on its duration.
pub async fn bounded<T, E>(
    endpoint: &Endpoint,
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, ConnectionError>
where
    E: Into<ConnectionError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(ConnectionError::Timeout {
            endpoint: endpoint.name.clone(),
            operation,
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

const REDIS_FIELDS: &[&str] = &[
    "connected_clients",
    "blocked_clients",
    "instantaneous_ops_per_sec",
];
const MYSQL_FIELDS: &[&str] = &[
    "Threads_connected",
    "Innodb_row_lock_current_waits",
    "Questions",
];

/// Status fields the metric mapping reads for this kind.
pub fn expected_fields(kind: EndpointKind) -> &'static [&'static str] {
    match kind {
        EndpointKind::Redis => REDIS_FIELDS,
        EndpointKind::Mysql => MYSQL_FIELDS,
    }
}

/// Map a raw sample onto connected/blocked/ops. MySQL only exposes cumulative
/// query counts, so its ops figure needs the endpoint's previous sample.
pub fn metrics(kind: EndpointKind, sample: &Sample, previous: Option<&Sample>) -> Metrics {
    match kind {
        EndpointKind::Redis => Metrics {
            connected: sample.counter("connected_clients"),
            blocked: sample.counter("blocked_clients"),
            ops: sample.counter("instantaneous_ops_per_sec"),
        },
        EndpointKind::Mysql => Metrics {
            connected: sample.counter("Threads_connected"),
            blocked: sample.counter("Innodb_row_lock_current_waits"),
            ops: previous.map_or(0, |prev| counter_rate(prev, sample, &["Questions"])),
        },
    }
}

/// Per-second growth of the summed counters between two samples. Counter
/// resets and zero-length windows give 0.
pub fn counter_rate(previous: &Sample, current: &Sample, names: &[&str]) -> u64 {
    let before: u64 = names.iter().map(|n| previous.counter(n)).sum();
    let after: u64 = names.iter().map(|n| current.counter(n)).sum();
    let elapsed = current
        .taken_at()
        .saturating_duration_since(previous.taken_at())
        .as_secs_f64();
    if after < before || elapsed <= 0.0 {
        return 0;
    }
    ((after - before) as f64 / elapsed).round() as u64
}
