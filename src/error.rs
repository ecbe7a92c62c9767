// Error taxonomy. Each class gets its own policy in the callers:
// connection errors skip the endpoint for the tick, partial data reads as zero,
// capture errors are logged and dropped, unknown categories are reported and skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Endpoint unreachable, refused, timed out or answered with a protocol error.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("{endpoint}: {operation} timed out after {timeout_ms} ms")]
    Timeout {
        endpoint: String,
        operation: &'static str,
        timeout_ms: u64,
    },
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("mysql: {0}")]
    Mysql(#[from] sqlx::Error),
}

impl ConnectionError {
    /// The connection itself is gone, as opposed to the server rejecting one command.
    pub fn is_transport(&self) -> bool {
        match self {
            ConnectionError::Timeout { .. } => true,
            ConnectionError::Redis(e) => {
                e.is_io_error()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
                    || e.is_timeout()
            }
            ConnectionError::Mysql(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
        }
    }
}

/// Status response lacked fields the metric mapping expects. Never fatal.
#[derive(Debug, Error)]
#[error("{endpoint}: status response missing {missing:?}, reading them as zero")]
pub struct PartialDataError {
    pub endpoint: String,
    pub missing: Vec<String>,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("bulk listing failed: {0}")]
    Listing(#[from] ConnectionError),
    #[error("writing {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("capture queue full, dropping capture for {0}")]
    QueueFull(String),
    #[error("artifact writer task failed: {0}")]
    Join(String),
}

/// Key type outside string/list/hash/set/zset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown key type {0:?}")]
pub struct UnknownCategoryError(pub String);
