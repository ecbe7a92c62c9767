// Monitored endpoint identity (static, from config)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which store an endpoint speaks; decides the client and the metric mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Redis,
    Mysql,
}

impl EndpointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointKind::Redis => "redis",
            EndpointKind::Mysql => "mysql",
        }
    }

    /// Tag for the bulk listing this kind produces; used in artifact file names.
    pub fn listing_kind(self) -> &'static str {
        match self {
            EndpointKind::Redis => "clientList",
            EndpointKind::Mysql => "processList",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub kind: EndpointKind,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16, kind: EndpointKind) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            kind,
        }
    }

    /// Filesystem-safe identity (`host_port`).
    pub fn id(&self) -> String {
        format!("{}_{}", self.host, self.port)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}:{})", self.name, self.host, self.port)
    }
}
