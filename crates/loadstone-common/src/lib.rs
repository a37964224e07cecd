//! Loadstone Common Types
//!
//! This crate provides the shared data model and configuration for the
//! Loadstone load balancer. All components speak in terms of these types:
//!
//! - **Data model**: [`Node`], [`Endpoint`], [`HealthStatus`], and the tagged
//!   result enums ([`HealthProbeResult`], [`ForwardResult`], [`RequestResult`])
//!   that carry outcomes through the forward path instead of errors.
//! - **Errors**: [`LoadstoneError`] for construction and startup failures.
//! - **Configuration**: the tunables for forwarding and health checking plus
//!   the `BACKEND_NODES` bootstrap parser.
//!
//! # Example
//!
//! ```
//! use loadstone_common::{Endpoint, HealthStatus, Node};
//!
//! let node = Node::new("node-1", Endpoint::http("10.0.0.7", 9001).unwrap());
//! assert_eq!(node.status, HealthStatus::Healthy);
//! assert_eq!(node.endpoint.to_url(), "http://10.0.0.7:9001");
//! ```

pub mod config;
pub mod error;
pub mod types;

pub use config::{HealthCheckConfig, RequestConfig, BACKEND_NODES_ENV};
pub use error::{LoadstoneError, Result};
pub use types::*;
