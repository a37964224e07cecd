//! Periodic health checking of registered nodes.
//!
//! One long-lived task snapshots the registry each interval, probes every
//! node in parallel, and writes the derived statuses back. Status changes
//! are logged and published on a broadcast channel for other observers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use loadstone_common::{
    HealthCheckConfig, HealthProbeResult, HealthStatus, Node, NodeHealthChangedEvent,
};

use crate::registry::NodeRegistry;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Probes every registered node on an interval and writes the derived
/// health status back into the registry.
pub struct HealthChecker {
    registry: Arc<NodeRegistry>,
    http: Client<HttpConnector, Full<Bytes>>,
    config: HealthCheckConfig,
    events: broadcast::Sender<NodeHealthChangedEvent>,
}

impl HealthChecker {
    pub fn new(registry: Arc<NodeRegistry>, config: HealthCheckConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeout));
        let http = Client::builder(TokioExecutor::new()).build(connector);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry,
            http,
            config,
            events,
        }
    }

    /// Health change events, for observers beyond the log line.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeHealthChangedEvent> {
        self.events.subscribe()
    }

    /// Issues one probe against `node`'s health path.
    ///
    /// 2xx is a success with the measured latency; any other response is a
    /// failure carrying `HTTP <code>`; transport errors report zero latency.
    pub async fn probe(&self, node: &Node) -> HealthProbeResult {
        let url = format!("{}{}", node.endpoint.to_url(), self.config.path);
        let uri: Uri = match url.parse() {
            Ok(uri) => uri,
            Err(e) => {
                return HealthProbeResult::Failure {
                    error: format!("invalid probe url {url}: {e}"),
                    latency: Duration::ZERO,
                }
            }
        };

        let started = Instant::now();
        let exchange = async {
            let request = Request::get(uri)
                .body(Full::default())
                .map_err(|e| e.to_string())?;
            let response = self.http.request(request).await.map_err(|e| e.to_string())?;
            let status = response.status();
            // Drain the body so the connection can be reused.
            let _ = response.into_body().collect().await;
            Ok::<_, String>(status)
        };

        match tokio::time::timeout(self.config.timeout, exchange).await {
            Ok(Ok(status)) if status.is_success() => HealthProbeResult::Success {
                latency: started.elapsed(),
            },
            Ok(Ok(status)) => HealthProbeResult::Failure {
                error: format!("HTTP {}", status.as_u16()),
                latency: started.elapsed(),
            },
            Ok(Err(error)) => HealthProbeResult::Failure {
                error,
                latency: Duration::ZERO,
            },
            Err(_) => HealthProbeResult::Failure {
                error: format!("probe timeout after {}ms", self.config.timeout.as_millis()),
                latency: Duration::ZERO,
            },
        }
    }

    /// Derives a node's health classification from one probe outcome.
    pub fn determine_status(&self, result: &HealthProbeResult) -> HealthStatus {
        match result {
            HealthProbeResult::Success { latency } if *latency < self.config.degraded_threshold => {
                HealthStatus::Healthy
            }
            HealthProbeResult::Success { .. } => HealthStatus::Degraded,
            HealthProbeResult::Failure { .. } => HealthStatus::Unhealthy,
        }
    }

    /// Spawns the background loop.
    ///
    /// The returned handle owns the loop: calling
    /// [`HealthCheckerHandle::shutdown`] (or dropping the handle) stops it at
    /// the next suspension point, cancelling the inter-tick sleep or the
    /// in-flight probe batch without further registry writes.
    pub fn spawn(self) -> HealthCheckerHandle {
        let events = self.events.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {}
                }
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = self.check_all_nodes() => {}
                }
            }
            debug!("health checker stopped");
        });
        HealthCheckerHandle {
            shutdown: Some(shutdown_tx),
            handle,
            events,
        }
    }

    /// Probes every node in parallel and applies the results.
    ///
    /// Probes are independent: a hanging or failing probe affects only its
    /// own node's status.
    async fn check_all_nodes(&self) {
        let nodes = self.registry.find_all().await;
        let probes = nodes.iter().map(|node| async move {
            let result = self.probe(node).await;
            (node, result)
        });
        let results = join_all(probes).await;

        for (node, result) in results {
            if let HealthProbeResult::Failure { error, .. } = &result {
                debug!(node_id = %node.id, error = %error, "health probe failed");
            }
            let status = self.determine_status(&result);
            if let Some(event) = self
                .registry
                .update_health_status(&node.id, status, "Health check result")
                .await
            {
                self.publish(event);
            }
        }
    }

    fn publish(&self, event: NodeHealthChangedEvent) {
        if event.current.is_usable() {
            info!(
                node_id = %event.node_id,
                previous_status = %event.previous,
                new_status = %event.current,
                reason = %event.reason,
                "node health changed"
            );
        } else {
            warn!(
                node_id = %event.node_id,
                previous_status = %event.previous,
                new_status = %event.current,
                reason = %event.reason,
                "node health changed"
            );
        }
        // Nobody listening is fine; the log line is the primary sink.
        let _ = self.events.send(event);
    }
}

/// Owner handle for the background health check loop.
pub struct HealthCheckerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
    events: broadcast::Sender<NodeHealthChangedEvent>,
}

impl HealthCheckerHandle {
    /// Health change events from the running loop.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeHealthChangedEvent> {
        self.events.subscribe()
    }

    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

impl Drop for HealthCheckerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
