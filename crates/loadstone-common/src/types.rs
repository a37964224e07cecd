use std::fmt;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{LoadstoneError, Result};

/// URL scheme of a backend endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// Network address of a backend, rendered as `scheme://host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint. Rejects empty hosts and port 0.
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.is_empty() {
            return Err(LoadstoneError::InvalidEndpoint(
                "host must not be empty".to_string(),
            ));
        }
        if port == 0 {
            return Err(LoadstoneError::InvalidEndpoint(
                "port must be in 1..=65535".to_string(),
            ));
        }
        Ok(Self { scheme, host, port })
    }

    /// Plain-HTTP endpoint, the common case for backends behind the balancer.
    pub fn http(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::new(Scheme::Http, host, port)
    }

    pub fn to_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Health classification of a backend node.
///
/// Degraded nodes still take traffic; only unhealthy ones are routed around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_usable(self) -> bool {
        self != HealthStatus::Unhealthy
    }

    pub fn is_healthy(self) -> bool {
        self == HealthStatus::Healthy
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// A backend service instance registered in the balancer.
///
/// Plain record: the mutation rules live in the registry and the health
/// checker, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub endpoint: Endpoint,
    pub status: HealthStatus,
}

impl Node {
    /// Newly admitted nodes start healthy; the health checker corrects that
    /// on its next pass if it turns out to be wrong.
    pub fn new(id: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            id: id.into(),
            endpoint,
            status: HealthStatus::Healthy,
        }
    }
}

/// Notification that a node's health status transitioned.
///
/// Emitted only when the stored status actually changed.
#[derive(Debug, Clone)]
pub struct NodeHealthChangedEvent {
    pub node_id: String,
    pub previous: HealthStatus,
    pub current: HealthStatus,
    pub reason: String,
    pub occurred_at: SystemTime,
}

/// Outcome of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthProbeResult {
    Success { latency: Duration },
    Failure { error: String, latency: Duration },
}

/// Structured classification of a transport-level forward failure.
///
/// `Other` covers failures with no transient cause (malformed URLs, protocol
/// violations); everything else is worth retrying on a different node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    ConnectionRefused,
    ConnectionReset,
    ConnectionClosed,
    Dns,
    Other,
}

impl TransportErrorKind {
    pub fn is_retryable(self) -> bool {
        self != TransportErrorKind::Other
    }
}

/// Outcome of one outbound call to a backend.
///
/// Any HTTP response is a `Success` regardless of status code; the backend's
/// answer belongs to the client. `Failure` is reserved for transport errors
/// and carries both a human-readable message and the structured kind.
#[derive(Debug, Clone)]
pub enum ForwardResult {
    Success {
        status_code: u16,
        latency: Duration,
        body: Bytes,
    },
    Failure {
        error: String,
        kind: TransportErrorKind,
    },
}

/// Final outcome of routing one client request, handed to the HTTP front-end.
#[derive(Debug, Clone)]
pub enum RequestResult {
    Success {
        node_id: String,
        status_code: u16,
        latency: Duration,
        body: Bytes,
    },
    Failed {
        error: String,
    },
    NoAvailableNodes,
    SelectionFailed,
}
