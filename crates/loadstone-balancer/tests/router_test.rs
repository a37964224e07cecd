//! Routing + health integration tests.
//!
//! These drive the core (registry, strategy, client, router, health
//! checker) against real sockets using scriptable mock backends bound to
//! ephemeral ports.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::Router;
use bytes::Bytes;
use hyper::header::HeaderMap;
use hyper::Method;
use tokio::net::TcpListener;

use loadstone_balancer::{
    BackendClient, HealthChecker, NodeRegistry, RequestRouter, RoundRobin,
};
use loadstone_common::{
    Endpoint, HealthCheckConfig, HealthStatus, Node, RequestConfig, RequestResult,
};

// ============================================================================
// Mock Backend
// ============================================================================

#[derive(Clone)]
struct MockState {
    hits: Arc<AtomicU64>,
    delay_ms: Arc<AtomicU64>,
    status: Arc<AtomicU16>,
    health_status: Arc<AtomicU16>,
    body: String,
}

/// A scriptable backend bound to an ephemeral port.
struct MockBackend {
    addr: SocketAddr,
    state: MockState,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    async fn start(body: &str) -> Self {
        let state = MockState {
            hits: Arc::new(AtomicU64::new(0)),
            delay_ms: Arc::new(AtomicU64::new(0)),
            status: Arc::new(AtomicU16::new(200)),
            health_status: Arc::new(AtomicU16::new(200)),
            body: body.to_string(),
        };

        async fn handle_request(State(state): State<MockState>) -> impl IntoResponse {
            state.hits.fetch_add(1, Ordering::SeqCst);
            let delay = state.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst)).unwrap();
            (status, state.body.clone())
        }

        async fn handle_health(State(state): State<MockState>) -> impl IntoResponse {
            let status =
                StatusCode::from_u16(state.health_status.load(Ordering::SeqCst)).unwrap();
            (status, "OK")
        }

        let app = Router::new()
            .route("/health", get(handle_health))
            .route("/", any(handle_request))
            .route("/{*path}", any(handle_request))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            _handle: handle,
        }
    }

    fn node(&self, id: &str) -> Node {
        Node::new(
            id,
            Endpoint::http(self.addr.ip().to_string(), self.addr.port()).unwrap(),
        )
    }

    fn hits(&self) -> u64 {
        self.state.hits.load(Ordering::SeqCst)
    }

    fn set_delay(&self, ms: u64) {
        self.state.delay_ms.store(ms, Ordering::SeqCst);
    }

    fn set_status(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    fn set_health_status(&self, status: u16) {
        self.state.health_status.store(status, Ordering::SeqCst);
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn test_router(registry: Arc<NodeRegistry>, max_attempts: u32, timeout_ms: u64) -> RequestRouter {
    let config = RequestConfig {
        timeout: Duration::from_millis(timeout_ms),
        connect_timeout: Duration::from_millis(200),
        max_attempts,
    };
    RequestRouter::new(
        registry,
        Arc::new(RoundRobin::new()),
        BackendClient::new(config),
        max_attempts,
    )
}

async fn post(router: &RequestRouter, path: &str, body: &str) -> RequestResult {
    router
        .handle(
            path,
            Method::POST,
            &HeaderMap::new(),
            Some(Bytes::from(body.to_string())),
        )
        .await
}

// ============================================================================
// Round-Robin Distribution
// ============================================================================

#[tokio::test]
async fn test_six_requests_over_three_nodes_land_twice_each() {
    let b1 = MockBackend::start(r#"{"backend":1}"#).await;
    let b2 = MockBackend::start(r#"{"backend":2}"#).await;
    let b3 = MockBackend::start(r#"{"backend":3}"#).await;

    let registry = Arc::new(NodeRegistry::with_nodes(vec![
        b1.node("node-1"),
        b2.node("node-2"),
        b3.node("node-3"),
    ]));
    let router = test_router(registry, 3, 1000);

    for _ in 0..6 {
        let result = post(&router, "/test", "{}").await;
        assert!(
            matches!(
                result,
                RequestResult::Success {
                    status_code: 200,
                    ..
                }
            ),
            "expected success, got {result:?}"
        );
    }

    assert_eq!(b1.hits(), 2);
    assert_eq!(b2.hits(), 2);
    assert_eq!(b3.hits(), 2);
}

// ============================================================================
// Retry Behavior
// ============================================================================

#[tokio::test]
async fn test_slow_node_times_out_and_request_retries_elsewhere() {
    let b1 = MockBackend::start(r#"{"backend":1}"#).await;
    let b2 = MockBackend::start(r#"{"backend":2}"#).await;
    let b3 = MockBackend::start(r#"{"backend":3}"#).await;
    b1.set_delay(500);

    let registry = Arc::new(NodeRegistry::with_nodes(vec![
        b1.node("node-1"),
        b2.node("node-2"),
        b3.node("node-3"),
    ]));
    let router = test_router(registry, 3, 300);

    // The fresh cursor picks node-1 first; its timeout burns one attempt and
    // the retry lands on exactly one of the fast nodes.
    match post(&router, "/test", "{}").await {
        RequestResult::Success {
            node_id,
            status_code,
            body,
            ..
        } => {
            assert_eq!(status_code, 200);
            assert_ne!(node_id, "node-1");
            assert!(!body.is_empty());
        }
        other => panic!("expected success after retry, got {other:?}"),
    }

    assert_eq!(b1.hits(), 1);
    assert_eq!(b2.hits() + b3.hits(), 1);
}

#[tokio::test]
async fn test_all_nodes_slow_exhausts_attempts() {
    let b1 = MockBackend::start("{}").await;
    let b2 = MockBackend::start("{}").await;
    let b3 = MockBackend::start("{}").await;
    for backend in [&b1, &b2, &b3] {
        backend.set_delay(500);
    }

    let registry = Arc::new(NodeRegistry::with_nodes(vec![
        b1.node("node-1"),
        b2.node("node-2"),
        b3.node("node-3"),
    ]));
    let router = test_router(registry, 3, 300);

    match post(&router, "/test", "{}").await {
        RequestResult::Failed { error } => {
            assert!(error.contains("timeout"), "unexpected error: {error}");
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // Exactly one forward per attempt, each to a distinct node.
    assert_eq!(b1.hits(), 1);
    assert_eq!(b2.hits(), 1);
    assert_eq!(b3.hits(), 1);
}

#[tokio::test]
async fn test_refused_node_is_retried_on_another() {
    // Claim a port, then free it so connects to it are refused.
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = dead.local_addr().unwrap().port();
    drop(dead);

    let b2 = MockBackend::start(r#"{"backend":2}"#).await;
    let b3 = MockBackend::start(r#"{"backend":3}"#).await;

    let registry = Arc::new(NodeRegistry::with_nodes(vec![
        Node::new("node-1", Endpoint::http("127.0.0.1", dead_port).unwrap()),
        b2.node("node-2"),
        b3.node("node-3"),
    ]));
    let router = test_router(registry, 3, 1000);

    for _ in 0..6 {
        let result = post(&router, "/test", "{}").await;
        assert!(
            matches!(
                result,
                RequestResult::Success {
                    status_code: 200,
                    ..
                }
            ),
            "expected success, got {result:?}"
        );
    }

    // Every request ends on a live node; the ones that first picked the dead
    // node retried their way there.
    assert_eq!(b2.hits() + b3.hits(), 6);
}

#[tokio::test]
async fn test_backend_error_status_flows_through_without_retry() {
    let backend = MockBackend::start(r#"{"x":1}"#).await;
    backend.set_status(500);

    let registry = Arc::new(NodeRegistry::with_nodes(vec![backend.node("node-1")]));
    let router = test_router(registry, 3, 1000);

    match post(&router, "/test", "{}").await {
        RequestResult::Success {
            status_code, body, ..
        } => {
            assert_eq!(status_code, 500);
            assert_eq!(&body[..], &br#"{"x":1}"#[..]);
        }
        other => panic!("expected delivered 500, got {other:?}"),
    }

    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_no_available_nodes() {
    let registry = Arc::new(NodeRegistry::new());
    let router = test_router(registry, 3, 1000);

    let result = post(&router, "/test", "{}").await;
    assert!(matches!(result, RequestResult::NoAvailableNodes));
}

#[tokio::test]
async fn test_unhealthy_nodes_are_not_candidates() {
    let backend = MockBackend::start("{}").await;
    let registry = Arc::new(NodeRegistry::with_nodes(vec![backend.node("node-1")]));
    registry
        .update_health_status("node-1", HealthStatus::Unhealthy, "Health check result")
        .await;

    let router = test_router(registry, 3, 1000);
    let result = post(&router, "/test", "{}").await;

    assert!(matches!(result, RequestResult::NoAvailableNodes));
    assert_eq!(backend.hits(), 0);
}

// ============================================================================
// Health Checker
// ============================================================================

fn fast_check_config() -> HealthCheckConfig {
    HealthCheckConfig {
        enabled: true,
        interval: Duration::from_millis(100),
        timeout: Duration::from_millis(500),
        path: "/health".to_string(),
        degraded_threshold: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn test_health_checker_demotes_failing_node() {
    let b1 = MockBackend::start("{}").await;
    let b2 = MockBackend::start("{}").await;
    let b3 = MockBackend::start("{}").await;
    b1.set_health_status(503);

    let registry = Arc::new(NodeRegistry::with_nodes(vec![
        b1.node("node-1"),
        b2.node("node-2"),
        b3.node("node-3"),
    ]));

    let checker = HealthChecker::new(registry.clone(), fast_check_config());
    let mut events = checker.subscribe();
    let handle = checker.spawn();

    // Within a few intervals the failing node drops out of rotation.
    let mut demoted = false;
    for _ in 0..30 {
        if registry.find_available().await.len() == 2 {
            demoted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(demoted, "node-1 was never demoted");

    let available = registry.find_available().await;
    assert!(available.iter().all(|n| n.id != "node-1"));

    let event = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.node_id == "node-1" {
                break event;
            }
        }
    })
    .await
    .expect("no health change event for node-1");
    assert_eq!(event.previous, HealthStatus::Healthy);
    assert_eq!(event.current, HealthStatus::Unhealthy);
    assert_eq!(event.reason, "Health check result");

    handle.shutdown().await;
}

#[tokio::test]
async fn test_health_checker_promotes_recovered_node() {
    let backend = MockBackend::start("{}").await;
    backend.set_health_status(503);

    let registry = Arc::new(NodeRegistry::with_nodes(vec![backend.node("node-1")]));
    let checker = HealthChecker::new(registry.clone(), fast_check_config());
    let handle = checker.spawn();

    for _ in 0..30 {
        if registry.find_available().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(registry.find_available().await.is_empty());

    backend.set_health_status(200);
    let mut recovered = false;
    for _ in 0..30 {
        if registry.find_available().await.len() == 1 {
            recovered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(recovered, "node-1 never came back");

    handle.shutdown().await;
}

#[tokio::test]
async fn test_health_checker_marks_unreachable_node_unhealthy() {
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = dead.local_addr().unwrap().port();
    drop(dead);

    let registry = Arc::new(NodeRegistry::with_nodes(vec![Node::new(
        "node-1",
        Endpoint::http("127.0.0.1", dead_port).unwrap(),
    )]));
    let checker = HealthChecker::new(registry.clone(), fast_check_config());
    let handle = checker.spawn();

    let mut demoted = false;
    for _ in 0..30 {
        if let Some(node) = registry.find_by_id("node-1").await {
            if node.status == HealthStatus::Unhealthy {
                demoted = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(demoted, "unreachable node was never marked unhealthy");

    handle.shutdown().await;
}
