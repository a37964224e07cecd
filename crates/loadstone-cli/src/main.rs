//! # Loadstone CLI Entry Point
//!
//! Starts the layer-7 reverse-proxy load balancer: an HTTP server that
//! forwards each inbound request to one of the configured backend nodes
//! using round-robin selection, with periodic health checking and bounded
//! cross-node retries.
//!
//! ## Usage
//!
//! ```bash
//! # Balance across two backends
//! loadstone -b 0.0.0.0:8080 -n 10.0.0.1:9001 -n 10.0.0.2:9001
//!
//! # Same, via the environment (wins over --node when set and non-empty)
//! BACKEND_NODES=10.0.0.1:9001,10.0.0.2:9001 loadstone -b 0.0.0.0:8080
//!
//! # Faster failure detection
//! loadstone -n 10.0.0.1:9001 --health-check-interval-ms 1000 \
//!   --health-check-timeout-ms 200
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use argh::FromArgs;

use loadstone_balancer::{
    BackendClient, HealthChecker, HttpServer, NodeRegistry, RequestRouter, RoundRobin,
};
use loadstone_common::config::{parse_backend_nodes, parse_host_port, BACKEND_NODES_ENV};
use loadstone_common::{HealthCheckConfig, Node, RequestConfig};

#[derive(FromArgs)]
/// Loadstone - layer-7 reverse-proxy load balancer
struct Cli {
    /// address to bind the load balancer to
    ///
    /// Defaults to "0.0.0.0:8080".
    #[argh(option, short = 'b', default = "\"0.0.0.0:8080\".into()")]
    bind: String,

    /// backend node as host:port
    ///
    /// Can be given multiple times. Entries are admitted as node-1, node-2,
    /// ... in order. The BACKEND_NODES environment variable
    /// (host1:port1,host2:port2,...) overrides this list when set and
    /// non-empty.
    #[argh(option, short = 'n', long = "node")]
    nodes: Vec<String>,

    /// wall-clock cap on one forwarded request in milliseconds
    #[argh(option, long = "request-timeout-ms", default = "5000")]
    request_timeout_ms: u64,

    /// connect cap inside a forward in milliseconds
    #[argh(option, long = "connect-timeout-ms", default = "1000")]
    connect_timeout_ms: u64,

    /// distinct-node attempts per client request (at least 1)
    #[argh(option, long = "max-attempts", default = "3")]
    max_attempts: u32,

    /// interval between health check passes in milliseconds
    #[argh(option, long = "health-check-interval-ms", default = "5000")]
    health_check_interval_ms: u64,

    /// timeout for each health probe in milliseconds
    #[argh(option, long = "health-check-timeout-ms", default = "500")]
    health_check_timeout_ms: u64,

    /// path probed on each backend
    #[argh(option, long = "health-check-path", default = "\"/health\".into()")]
    health_check_path: String,

    /// probe latency in milliseconds at which a responsive node counts as
    /// degraded
    #[argh(option, long = "degraded-threshold-ms", default = "50")]
    degraded_threshold_ms: u64,

    /// disable health checking entirely
    #[argh(switch, long = "disable-health-check")]
    disable_health_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default log level INFO, RUST_LOG overrides.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if cli.max_attempts < 1 {
        bail!("--max-attempts must be at least 1");
    }

    let nodes = bootstrap_nodes(&cli)?;
    if nodes.is_empty() {
        tracing::warn!("no backend nodes configured; use --node or BACKEND_NODES");
    }
    for node in &nodes {
        tracing::info!(node_id = %node.id, endpoint = %node.endpoint, "registered backend");
    }

    let registry = Arc::new(NodeRegistry::with_nodes(nodes));

    let health_config = HealthCheckConfig {
        enabled: !cli.disable_health_check,
        interval: Duration::from_millis(cli.health_check_interval_ms),
        timeout: Duration::from_millis(cli.health_check_timeout_ms),
        path: cli.health_check_path.clone(),
        degraded_threshold: Duration::from_millis(cli.degraded_threshold_ms),
    };
    let checker_handle = if health_config.enabled {
        Some(HealthChecker::new(registry.clone(), health_config).spawn())
    } else {
        tracing::info!("health checking disabled");
        None
    };

    let request_config = RequestConfig {
        timeout: Duration::from_millis(cli.request_timeout_ms),
        connect_timeout: Duration::from_millis(cli.connect_timeout_ms),
        max_attempts: cli.max_attempts,
    };
    let router = Arc::new(RequestRouter::new(
        registry.clone(),
        Arc::new(RoundRobin::new()),
        BackendClient::new(request_config),
        cli.max_attempts,
    ));

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;

    HttpServer::new(router, registry).run(addr).await?;

    // The server has drained; stop the background loop before exiting.
    if let Some(handle) = checker_handle {
        handle.shutdown().await;
    }

    Ok(())
}

/// Resolves the backend list: BACKEND_NODES wins over --node when set and
/// non-empty.
fn bootstrap_nodes(cli: &Cli) -> Result<Vec<Node>> {
    if let Ok(raw) = std::env::var(BACKEND_NODES_ENV) {
        if !raw.trim().is_empty() {
            return parse_backend_nodes(&raw)
                .with_context(|| format!("invalid {BACKEND_NODES_ENV}"));
        }
    }

    cli.nodes
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let endpoint = parse_host_port(entry)
                .with_context(|| format!("invalid --node {entry}"))?;
            Ok(Node::new(format!("node-{}", index + 1), endpoint))
        })
        .collect()
}
