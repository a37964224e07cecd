//! Configuration values and bootstrap parsing.
//!
//! The binary maps CLI flags onto these structs; the `BACKEND_NODES`
//! environment variable, when set and non-empty, overrides any static node
//! list given on the command line.

use std::time::Duration;

use crate::error::{LoadstoneError, Result};
use crate::types::{Endpoint, Node};

/// Environment variable carrying the backend list as
/// `host1:port1,host2:port2,...`.
pub const BACKEND_NODES_ENV: &str = "BACKEND_NODES";

/// Per-forward behavior of the backend client and router.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Wall-clock cap on one whole forward (connect + send + receive).
    pub timeout: Duration,
    /// Separate cap on establishing the connection.
    pub connect_timeout: Duration,
    /// Distinct-node attempts per client request. Must be at least 1.
    pub max_attempts: u32,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            connect_timeout: Duration::from_millis(1000),
            max_attempts: 3,
        }
    }
}

/// Health checking configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// When false the background loop is never spawned.
    pub enabled: bool,
    /// Interval between probe passes.
    pub interval: Duration,
    /// Cap on each individual probe.
    pub timeout: Duration,
    /// Probe path appended to each node's endpoint.
    pub path: String,
    /// Probe latency at or above this marks a responsive node degraded.
    pub degraded_threshold: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(5),
            timeout: Duration::from_millis(500),
            path: "/health".to_string(),
            degraded_threshold: Duration::from_millis(50),
        }
    }
}

/// Parses a `host1:port1,host2:port2` backend list into nodes with ids
/// `node-1`, `node-2`, ... in entry order. Empty entries are skipped so a
/// trailing comma is harmless.
pub fn parse_backend_nodes(raw: &str) -> Result<Vec<Node>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .map(|(index, entry)| {
            let endpoint = parse_host_port(entry)?;
            Ok(Node::new(format!("node-{}", index + 1), endpoint))
        })
        .collect()
}

/// Parses a single `host:port` entry into a plain-HTTP endpoint.
pub fn parse_host_port(entry: &str) -> Result<Endpoint> {
    let (host, port) = entry.rsplit_once(':').ok_or_else(|| {
        LoadstoneError::InvalidBackendList(format!("'{entry}' is not host:port"))
    })?;
    let port: u16 = port.parse().map_err(|_| {
        LoadstoneError::InvalidBackendList(format!("'{entry}' has an invalid port"))
    })?;
    Endpoint::http(host, port)
        .map_err(|e| LoadstoneError::InvalidBackendList(format!("'{entry}': {e}")))
}
