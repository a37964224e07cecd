//! HTTP front-end: proxy catch-all, liveness, admin surface, metrics.
//!
//! Thin axum handlers over the core. The proxy handler translates an inbound
//! request into a router call and the router's result back into an HTTP
//! response; the admin handlers go straight to the registry.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use loadstone_common::{Endpoint, HealthStatus, LoadstoneError, Node, RequestResult};

use crate::metrics::MetricsSnapshot;
use crate::registry::NodeRegistry;
use crate::router::RequestRouter;

/// Inbound bodies beyond this are rejected before they reach the router.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RequestRouter>,
    pub registry: Arc<NodeRegistry>,
}

/// The load balancer's HTTP server.
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    pub fn new(router: Arc<RequestRouter>, registry: Arc<NodeRegistry>) -> Self {
        Self {
            state: AppState { router, registry },
        }
    }

    /// Binds and serves until ctrl-c.
    pub async fn run(self, addr: SocketAddr) -> Result<(), LoadstoneError> {
        let app = build_app(self.state);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| LoadstoneError::Transport(format!("failed to bind to {addr}: {e}")))?;
        let local = listener
            .local_addr()
            .map_err(|e| LoadstoneError::Transport(format!("failed to read local addr: {e}")))?;
        info!("load balancer listening on {local}");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| LoadstoneError::Transport(format!("server error: {e}")))
    }
}

/// Builds the axum application. Exposed so tests can serve it on an
/// ephemeral port.
pub fn build_app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(liveness))
        .route("/metrics", get(metrics))
        .route("/admin/nodes", get(list_nodes).post(add_node))
        .route("/admin/nodes/{id}", delete(delete_node))
        .route("/", any(proxy))
        .route("/{*path}", any(proxy))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// The balancer's own liveness, independent of backend health.
async fn liveness() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let nodes = state.registry.find_all().await;
    Json(MetricsSnapshot::from_nodes(&nodes))
}

/// Wire form of a node for the admin surface.
#[derive(Debug, Clone, Serialize)]
struct NodeView {
    id: String,
    endpoint: String,
    health: HealthStatus,
}

impl From<&Node> for NodeView {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            endpoint: node.endpoint.to_url(),
            health: node.status,
        }
    }
}

async fn list_nodes(State(state): State<AppState>) -> impl IntoResponse {
    let nodes = state.registry.find_all().await;
    Json(nodes.iter().map(NodeView::from).collect::<Vec<_>>())
}

#[derive(Debug, Deserialize)]
struct AddNodeRequest {
    id: String,
    host: String,
    port: u16,
}

async fn add_node(
    State(state): State<AppState>,
    Json(request): Json<AddNodeRequest>,
) -> Response {
    if request.id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "node id must not be empty");
    }
    let endpoint = match Endpoint::http(request.host, request.port) {
        Ok(endpoint) => endpoint,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    // Re-adding an existing id replaces the record, which also resets its
    // health to healthy.
    let node = Node::new(request.id, endpoint);
    let view = NodeView::from(&node);
    info!(node_id = %view.id, endpoint = %view.endpoint, "admin added node");
    state.registry.save(node).await;

    (StatusCode::CREATED, Json(view)).into_response()
}

async fn delete_node(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.registry.delete(&id).await {
        info!(node_id = %id, "admin deleted node");
        Json(json!({"deleted": id})).into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, &format!("no node with id {id}"))
    }
}

/// Catch-all proxy handler: every method, every unclaimed path.
async fn proxy(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let body = if body.is_empty() { None } else { Some(body) };

    let result = state.router.handle(&path, method, &headers, body).await;
    into_http_response(result)
}

/// Maps the router's result onto the outward HTTP contract.
fn into_http_response(result: RequestResult) -> Response {
    match result {
        RequestResult::Success { body, .. } => {
            // The backend's body is the client's answer; the outer status
            // stays 200 unless the balancer itself failed.
            let mut response = Response::new(axum::body::Body::from(body));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
        RequestResult::Failed { error } => error_response(StatusCode::BAD_GATEWAY, &error),
        RequestResult::NoAvailableNodes => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "No available nodes")
        }
        RequestResult::SelectionFailed => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to select node")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}
