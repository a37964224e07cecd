//! Loadstone Balancer Core
//!
//! This crate is the routing + health subsystem of the Loadstone load
//! balancer. It keeps a live view of which backends are usable and routes
//! each inbound request so that transient backend failures stay hidden from
//! the client.
//!
//! # Architecture
//!
//! - [`NodeRegistry`]: concurrent node map. Readers get consistent snapshots
//!   in stable id order; the health checker and the admin surface are its
//!   only writers.
//! - [`SelectionStrategy`] / [`RoundRobin`]: picks the next node from a
//!   candidate snapshot via an atomic process-wide cursor.
//! - [`BackendClient`]: one outbound HTTP exchange per call, reported as a
//!   tagged [`loadstone_common::ForwardResult`]. No retries, no health
//!   decisions.
//! - [`HealthChecker`]: background task probing every node in parallel each
//!   interval and writing derived statuses back into the registry.
//! - [`RequestRouter`]: the retry loop. Snapshots available nodes, drives the
//!   strategy and the client, and retries transport failures on distinct
//!   nodes up to the configured attempt budget. HTTP responses from a
//!   backend, 5xx included, are never retried.
//! - [`HttpServer`]: axum front-end exposing the proxy catch-all, the admin
//!   surface, and the metrics snapshot.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use loadstone_balancer::{BackendClient, NodeRegistry, RequestRouter, RoundRobin};
//! use loadstone_common::{Endpoint, Node, RequestConfig};
//!
//! let registry = Arc::new(NodeRegistry::with_nodes(vec![
//!     Node::new("node-1", Endpoint::http("10.0.0.1", 9001).unwrap()),
//!     Node::new("node-2", Endpoint::http("10.0.0.2", 9001).unwrap()),
//! ]));
//!
//! let config = RequestConfig::default();
//! let max_attempts = config.max_attempts;
//! let router = RequestRouter::new(
//!     registry,
//!     Arc::new(RoundRobin::new()),
//!     BackendClient::new(config),
//!     max_attempts,
//! );
//! ```

pub mod client;
pub mod health_checker;
pub mod http_server;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod strategy;

pub use client::BackendClient;
pub use health_checker::{HealthChecker, HealthCheckerHandle};
pub use http_server::{build_app, AppState, HttpServer};
pub use metrics::{MetricsSnapshot, NodeMetrics};
pub use registry::NodeRegistry;
pub use router::RequestRouter;
pub use strategy::{RoundRobin, SelectionStrategy};
