// Redis endpoint: INFO for status, CLIENT LIST for captures, SCAN plus pipelined
// TYPE/TTL and a separate DEBUG OBJECT for the distribution scan, pipelined
// deletes for purges.

use super::EndpointClient;
use crate::error::ConnectionError;
use crate::histogram::KeyCategory;
use crate::models::{ConnectionRecord, Endpoint, Sample};
use crate::purge::KeyPurger;
use crate::scan::{KeyInfo, Keyspace};
use redis::aio::MultiplexedConnection;
use std::collections::BTreeMap;
use tracing::instrument;

pub struct RedisClient {
    endpoint: Endpoint,
    conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn connect(endpoint: &Endpoint, password: Option<&str>) -> Result<Self, ConnectionError> {
        let client = redis::Client::open((endpoint.host.as_str(), endpoint.port))?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            let _: () = redis::cmd("AUTH").arg(password).query_async(&mut conn).await?;
        }
        let named: redis::RedisResult<()> = redis::cmd("CLIENT")
            .arg("SETNAME")
            .arg(crate::version::client_name())
            .query_async(&mut conn)
            .await;
        if let Err(e) = named {
            tracing::debug!(endpoint = %endpoint, error = %e, "CLIENT SETNAME rejected");
        }
        tracing::debug!(endpoint = %endpoint, "redis connected");
        Ok(Self {
            endpoint: endpoint.clone(),
            conn,
        })
    }

    /// Size from DEBUG OBJECT, falling back to MEMORY USAGE where DEBUG is disabled.
    async fn serialized_size(&mut self, key: &[u8]) -> Result<Option<u64>, ConnectionError> {
        let debug: redis::RedisResult<String> = redis::cmd("DEBUG")
            .arg("OBJECT")
            .arg(key)
            .query_async(&mut self.conn)
            .await;
        match debug {
            Ok(line) => Ok(Some(parse_serialized_length(&line).unwrap_or(0))),
            Err(e) if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() => {
                Err(e.into())
            }
            Err(_) => {
                let usage: Option<u64> = redis::cmd("MEMORY")
                    .arg("USAGE")
                    .arg(key)
                    .query_async(&mut self.conn)
                    .await?;
                Ok(usage)
            }
        }
    }

    async fn drain_hash(&mut self, key: &str, step: usize) -> Result<u64, ConnectionError> {
        let mut cursor: u64 = 0;
        let mut removed = 0;
        loop {
            let (next, flat): (u64, Vec<Vec<u8>>) = redis::cmd("HSCAN")
                .arg(key)
                .arg(cursor)
                .arg("COUNT")
                .arg(step)
                .query_async(&mut self.conn)
                .await?;
            let fields: Vec<Vec<u8>> = flat.into_iter().step_by(2).collect();
            if !fields.is_empty() {
                let n: u64 = redis::cmd("HDEL")
                    .arg(key)
                    .arg(&fields)
                    .query_async(&mut self.conn)
                    .await?;
                removed += n;
            }
            if next == 0 {
                return Ok(removed);
            }
            cursor = next;
        }
    }

    async fn drain_set(&mut self, key: &str, step: usize) -> Result<u64, ConnectionError> {
        let mut cursor: u64 = 0;
        let mut removed = 0;
        loop {
            let (next, members): (u64, Vec<Vec<u8>>) = redis::cmd("SSCAN")
                .arg(key)
                .arg(cursor)
                .arg("COUNT")
                .arg(step)
                .query_async(&mut self.conn)
                .await?;
            if !members.is_empty() {
                let n: u64 = redis::cmd("SREM")
                    .arg(key)
                    .arg(&members)
                    .query_async(&mut self.conn)
                    .await?;
                removed += n;
            }
            if next == 0 {
                return Ok(removed);
            }
            cursor = next;
        }
    }

    async fn drain_zset(&mut self, key: &str, step: usize) -> Result<u64, ConnectionError> {
        let mut removed = 0;
        loop {
            let n: u64 = redis::cmd("ZREMRANGEBYRANK")
                .arg(key)
                .arg(0)
                .arg(step as i64 - 1)
                .query_async(&mut self.conn)
                .await?;
            if n == 0 {
                return Ok(removed);
            }
            removed += n;
        }
    }

    async fn drain_list(&mut self, key: &str, step: usize) -> Result<u64, ConnectionError> {
        let mut removed = 0;
        loop {
            let len: u64 = redis::cmd("LLEN")
                .arg(key)
                .query_async(&mut self.conn)
                .await?;
            if len == 0 {
                return Ok(removed);
            }
            let _: () = redis::cmd("LTRIM")
                .arg(key)
                .arg(step)
                .arg(-1)
                .query_async(&mut self.conn)
                .await?;
            removed += len.min(step as u64);
        }
    }
}

impl EndpointClient for RedisClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint.name, operation = "info"))]
    async fn status(&mut self) -> Result<Sample, ConnectionError> {
        let raw: String = redis::cmd("INFO").query_async(&mut self.conn).await?;
        Ok(Sample::new(parse_info(&raw)))
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint.name, operation = "client_list"))]
    async fn list_connections(&mut self) -> Result<Vec<ConnectionRecord>, ConnectionError> {
        let raw: String = redis::cmd("CLIENT")
            .arg("LIST")
            .query_async(&mut self.conn)
            .await?;
        Ok(parse_client_list(&raw))
    }
}

impl Keyspace for RedisClient {
    async fn scan(&mut self, cursor: u64, count: usize) -> Result<(u64, Vec<Vec<u8>>), ConnectionError> {
        let (next, keys): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut self.conn)
            .await?;
        Ok((next, keys))
    }

    async fn introspect(&mut self, key: &[u8]) -> Result<Option<KeyInfo>, ConnectionError> {
        let (kind, ttl): (String, i64) = redis::pipe()
            .cmd("TYPE")
            .arg(key)
            .cmd("TTL")
            .arg(key)
            .query_async(&mut self.conn)
            .await?;
        if kind == "none" {
            return Ok(None);
        }
        // DEBUG OBJECT runs on its own round trip: where DEBUG is disabled its
        // error must reach the MEMORY USAGE fallback rather than fail the pipeline.
        let Some(serialized_size) = self.serialized_size(key).await? else {
            return Ok(None);
        };
        Ok(Some(KeyInfo {
            kind,
            serialized_size,
            ttl: (ttl >= 0).then_some(ttl),
        }))
    }
}

impl KeyPurger for RedisClient {
    async fn delete_batch(&mut self, keys: &[String]) -> Result<u64, ConnectionError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("DEL").arg(key);
        }
        let removed: Vec<u64> = pipe.query_async(&mut self.conn).await?;
        Ok(removed.iter().sum())
    }

    async fn drain(
        &mut self,
        category: KeyCategory,
        key: &str,
        step: usize,
    ) -> Result<u64, ConnectionError> {
        let members = match category {
            KeyCategory::String => 0,
            KeyCategory::Hash => self.drain_hash(key, step).await?,
            KeyCategory::Set => self.drain_set(key, step).await?,
            KeyCategory::Zset => self.drain_zset(key, step).await?,
            KeyCategory::List => self.drain_list(key, step).await?,
        };
        let _: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.conn)
            .await?;
        Ok(members)
    }
}

/// `name:value` lines; `# Section` headers and blank lines are skipped.
pub(crate) fn parse_info(raw: &str) -> BTreeMap<String, String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// One record per line, `k=v` tokens separated by spaces.
pub(crate) fn parse_client_list(raw: &str) -> Vec<ConnectionRecord> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            ConnectionRecord::new(
                line.split_whitespace()
                    .map(|tok| match tok.split_once('=') {
                        Some((k, v)) => (k.to_string(), v.to_string()),
                        None => (tok.to_string(), String::new()),
                    })
                    .collect(),
            )
        })
        .collect()
}

pub(crate) fn parse_serialized_length(debug: &str) -> Option<u64> {
    debug
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix("serializedlength:"))
        .and_then(|v| v.parse().ok())
}
