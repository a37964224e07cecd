//! Outbound HTTP client for backend forwards.
//!
//! One [`BackendClient`] is shared by the router; hyper's connection pool
//! handles keep-alive reuse underneath. The client reports outcomes as
//! tagged [`ForwardResult`]s and performs no retries and no health
//! decisions. Dropping the future returned by [`BackendClient::forward`]
//! aborts the in-flight exchange, which is how inbound-request cancellation
//! propagates to the backend call.

use std::error::Error as StdError;
use std::time::Instant;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use loadstone_common::{ForwardResult, Node, RequestConfig, TransportErrorKind};

/// Issues one outbound HTTP call per [`forward`](BackendClient::forward)
/// invocation.
pub struct BackendClient {
    http: Client<HttpConnector, Full<Bytes>>,
    config: RequestConfig,
}

impl BackendClient {
    pub fn new(config: RequestConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect_timeout));
        let http = Client::builder(TokioExecutor::new()).build(connector);
        Self { http, config }
    }

    /// Issues one HTTP exchange against `node` and reports the outcome.
    ///
    /// Any HTTP response, 2xx through 5xx, is a `Success`: the backend
    /// answered and its answer belongs to the client. Only transport-level
    /// failures surface as `Failure`. The whole exchange runs under the
    /// configured request timeout; connecting is additionally capped by the
    /// connect timeout.
    pub async fn forward(
        &self,
        node: &Node,
        path: &str,
        method: Method,
        headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> ForwardResult {
        let url = format!("{}{}", node.endpoint.to_url(), path);
        let uri: Uri = match url.parse() {
            Ok(uri) => uri,
            Err(e) => {
                return ForwardResult::Failure {
                    error: format!("invalid target url {url}: {e}"),
                    kind: TransportErrorKind::Other,
                }
            }
        };

        let request = match build_request(uri, method, headers, body) {
            Ok(request) => request,
            Err(error) => {
                return ForwardResult::Failure {
                    error,
                    kind: TransportErrorKind::Other,
                }
            }
        };

        let started = Instant::now();
        let exchange = async {
            let response = self
                .http
                .request(request)
                .await
                .map_err(|e| classify_transport_error(&e))?;
            let status = response.status().as_u16();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| classify_transport_error(&e))?
                .to_bytes();
            Ok::<_, (String, TransportErrorKind)>((status, body))
        };

        match tokio::time::timeout(self.config.timeout, exchange).await {
            Ok(Ok((status_code, body))) => {
                let latency = started.elapsed();
                debug!(
                    node_id = %node.id,
                    status_code,
                    latency_ms = latency.as_millis() as u64,
                    "forward completed"
                );
                ForwardResult::Success {
                    status_code,
                    latency,
                    body,
                }
            }
            Ok(Err((error, kind))) => ForwardResult::Failure { error, kind },
            Err(_) => ForwardResult::Failure {
                error: format!(
                    "request timeout after {}ms",
                    self.config.timeout.as_millis()
                ),
                kind: TransportErrorKind::Timeout,
            },
        }
    }
}

/// Builds the outbound request: headers copied through except `Host` and
/// `Content-Length` (hyper derives those from the target URI and the body it
/// actually sends), `Content-Type: application/json` set when a body rides
/// on a body-bearing method.
fn build_request(
    uri: Uri,
    method: Method,
    headers: &HeaderMap,
    body: Option<Bytes>,
) -> Result<Request<Full<Bytes>>, String> {
    let has_body = body.is_some() && method != Method::GET && method != Method::HEAD;

    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(out_headers) = builder.headers_mut() {
        for (name, value) in headers {
            if *name == HOST || *name == CONTENT_LENGTH {
                continue;
            }
            out_headers.append(name.clone(), value.clone());
        }
        if has_body {
            out_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
    }

    let body = match body {
        Some(bytes) if has_body => Full::new(bytes),
        _ => Full::default(),
    };
    builder
        .body(body)
        .map_err(|e| format!("failed to build request: {e}"))
}

/// Maps a transport error chain to a human-readable message plus a
/// structured kind. The message leads with the canonical phrase for its kind
/// so the router's substring fallback agrees with the structured channel.
fn classify_transport_error(err: &(dyn StdError + 'static)) -> (String, TransportErrorKind) {
    let detail = error_chain(err);
    let kind = transport_error_kind(err, &detail);
    let message = match kind {
        TransportErrorKind::Timeout => format!("socket timeout: {detail}"),
        TransportErrorKind::ConnectionRefused => format!("connection refused: {detail}"),
        TransportErrorKind::ConnectionReset => format!("connection reset: {detail}"),
        TransportErrorKind::ConnectionClosed => format!("connection closed: {detail}"),
        TransportErrorKind::Dns => format!("dns lookup failed: {detail}"),
        TransportErrorKind::Other => detail,
    };
    (message, kind)
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(current) = source {
        parts.push(current.to_string());
        source = current.source();
    }
    parts.join(": ")
}

/// Walks the source chain looking for the underlying `hyper::Error` or
/// `io::Error`, falling back to keyword inspection of the rendered chain for
/// errors that hide their cause (DNS failures in particular surface as
/// uncategorized io errors).
fn transport_error_kind(err: &(dyn StdError + 'static), detail: &str) -> TransportErrorKind {
    use std::io::ErrorKind;

    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(current) = source {
        if let Some(hyper_err) = current.downcast_ref::<hyper::Error>() {
            if hyper_err.is_timeout() {
                return TransportErrorKind::Timeout;
            }
            if hyper_err.is_incomplete_message() || hyper_err.is_canceled() {
                return TransportErrorKind::ConnectionClosed;
            }
        }
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            match io.kind() {
                ErrorKind::ConnectionRefused => return TransportErrorKind::ConnectionRefused,
                ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe => return TransportErrorKind::ConnectionReset,
                ErrorKind::TimedOut => return TransportErrorKind::Timeout,
                ErrorKind::NotConnected | ErrorKind::UnexpectedEof => {
                    return TransportErrorKind::ConnectionClosed
                }
                _ => {}
            }
        }
        source = current.source();
    }

    let lower = detail.to_ascii_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        TransportErrorKind::Timeout
    } else if lower.contains("connection refused") {
        TransportErrorKind::ConnectionRefused
    } else if lower.contains("connection reset") {
        TransportErrorKind::ConnectionReset
    } else if lower.contains("lookup") || lower.contains("dns") {
        TransportErrorKind::Dns
    } else {
        TransportErrorKind::Other
    }
}
