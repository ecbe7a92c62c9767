// Shared test helpers: scripted endpoint clients, in-memory keyspace, shared sinks
#![allow(dead_code)]

use fleetwatch::error::ConnectionError;
use fleetwatch::histogram::KeyCategory;
use fleetwatch::models::*;
use fleetwatch::purge::KeyPurger;
use fleetwatch::sampler::{Connector, EndpointClient};
use fleetwatch::scan::{KeyInfo, Keyspace};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub fn redis_endpoint(name: &str, port: u16) -> Endpoint {
    Endpoint::new(name, "10.0.0.1", port, EndpointKind::Redis)
}

pub fn redis_status(connected: u64, blocked: u64, ops: u64) -> Vec<(String, String)> {
    vec![
        ("connected_clients".into(), connected.to_string()),
        ("blocked_clients".into(), blocked.to_string()),
        ("instantaneous_ops_per_sec".into(), ops.to_string()),
        ("redis_version".into(), "7.2.4".into()),
    ]
}

fn unreachable_error(endpoint: &str, operation: &'static str) -> ConnectionError {
    ConnectionError::Timeout {
        endpoint: endpoint.to_string(),
        operation,
        timeout_ms: 0,
    }
}

/// What one fake endpoint answers.
#[derive(Debug, Clone, Default)]
pub struct EndpointScript {
    pub status: Vec<(String, String)>,
    pub records: Vec<ConnectionRecord>,
    pub down: bool,
}

type Scripts = Arc<Mutex<HashMap<String, EndpointScript>>>;

/// Hands out [`FakeClient`]s reading from a shared, mutable script.
#[derive(Clone, Default)]
pub struct FakeConnector {
    scripts: Scripts,
    connects: Arc<AtomicU64>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, f: impl FnOnce(&mut EndpointScript)) {
        let mut scripts = self.scripts.lock().unwrap();
        f(scripts.entry(name.to_string()).or_default());
    }

    /// Connection attempts so far, successful or not.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn client(&self, name: &str) -> FakeClient {
        FakeClient {
            name: name.to_string(),
            scripts: self.scripts.clone(),
        }
    }
}

impl Connector for FakeConnector {
    type Client = FakeClient;

    async fn connect(&self, endpoint: &Endpoint) -> Result<FakeClient, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let down = self
            .scripts
            .lock()
            .unwrap()
            .get(&endpoint.name)
            .is_some_and(|s| s.down);
        if down {
            return Err(unreachable_error(&endpoint.name, "connect"));
        }
        Ok(self.client(&endpoint.name))
    }
}

pub struct FakeClient {
    name: String,
    scripts: Scripts,
}

impl FakeClient {
    fn script(&self) -> EndpointScript {
        self.scripts
            .lock()
            .unwrap()
            .get(&self.name)
            .cloned()
            .unwrap_or_default()
    }
}

impl EndpointClient for FakeClient {
    async fn status(&mut self) -> Result<Sample, ConnectionError> {
        let script = self.script();
        if script.down {
            return Err(unreachable_error(&self.name, "status"));
        }
        Ok(Sample::from_pairs(script.status))
    }

    async fn list_connections(&mut self) -> Result<Vec<ConnectionRecord>, ConnectionError> {
        let script = self.script();
        if script.down {
            return Err(unreachable_error(&self.name, "list"));
        }
        Ok(script.records)
    }
}

/// In-memory `Write` that tests can read back after handing a clone away.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Sink that always fails.
pub struct BrokenSink;

impl Write for BrokenSink {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::other("disk full"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// How a key answers introspection.
#[derive(Debug, Clone)]
pub enum KeyAnswer {
    Info(KeyInfo),
    Vanished,
    /// Server rejected the command for this key only.
    Rejected,
    /// Connection dropped.
    Broken,
}

pub fn key(kind: &str, size: u64, ttl: Option<i64>) -> KeyAnswer {
    KeyAnswer::Info(KeyInfo {
        kind: kind.to_string(),
        serialized_size: size,
        ttl,
    })
}

/// Keys served in sorted order, `count` per SCAN page.
#[derive(Default)]
pub struct FakeKeyspace {
    pub keys: BTreeMap<Vec<u8>, KeyAnswer>,
    pub scans: u64,
}

impl FakeKeyspace {
    pub fn with(keys: Vec<(&str, KeyAnswer)>) -> Self {
        Self {
            keys: keys
                .into_iter()
                .map(|(k, a)| (k.as_bytes().to_vec(), a))
                .collect(),
            scans: 0,
        }
    }
}

impl Keyspace for FakeKeyspace {
    async fn scan(&mut self, cursor: u64, count: usize) -> Result<(u64, Vec<Vec<u8>>), ConnectionError> {
        self.scans += 1;
        let start = cursor as usize;
        let page: Vec<Vec<u8>> = self.keys.keys().skip(start).take(count).cloned().collect();
        let end = start + page.len();
        let next = if end >= self.keys.len() { 0 } else { end as u64 };
        Ok((next, page))
    }

    async fn introspect(&mut self, key: &[u8]) -> Result<Option<KeyInfo>, ConnectionError> {
        match self.keys.get(key) {
            Some(KeyAnswer::Info(info)) => Ok(Some(info.clone())),
            Some(KeyAnswer::Vanished) | None => Ok(None),
            Some(KeyAnswer::Rejected) => Err(wrongtype()),
            Some(KeyAnswer::Broken) => Err(unreachable_error("fake", "introspect")),
        }
    }
}

pub fn wrongtype() -> ConnectionError {
    ConnectionError::Redis(redis::RedisError::from((
        redis::ErrorKind::ResponseError,
        "WRONGTYPE",
    )))
}

/// Records every call; `existing` decides what DEL reports as deleted.
/// Draining a `rejected` key answers WRONGTYPE, a `broken` key drops the connection.
#[derive(Default)]
pub struct FakePurger {
    pub existing: HashSet<String>,
    pub rejected: HashSet<String>,
    pub broken: HashSet<String>,
    pub batches: Vec<Vec<String>>,
    pub drained: Vec<(KeyCategory, String, usize)>,
    pub members_per_key: u64,
}

impl KeyPurger for FakePurger {
    async fn delete_batch(&mut self, keys: &[String]) -> Result<u64, ConnectionError> {
        self.batches.push(keys.to_vec());
        Ok(keys.iter().filter(|k| self.existing.contains(*k)).count() as u64)
    }

    async fn drain(&mut self, category: KeyCategory, key: &str, step: usize) -> Result<u64, ConnectionError> {
        if self.rejected.contains(key) {
            return Err(wrongtype());
        }
        if self.broken.contains(key) {
            return Err(unreachable_error("fake", "drain"));
        }
        self.drained.push((category, key.to_string(), step));
        Ok(self.members_per_key)
    }
}
