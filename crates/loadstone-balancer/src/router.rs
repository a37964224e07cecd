//! Request routing with bounded cross-node retries.

use std::collections::HashSet;
use std::sync::Arc;

use hyper::body::Bytes;
use hyper::header::HeaderMap;
use hyper::Method;
use tracing::{debug, warn};

use loadstone_common::{ForwardResult, RequestResult, TransportErrorKind};

use crate::client::BackendClient;
use crate::registry::NodeRegistry;
use crate::strategy::SelectionStrategy;

/// Transport failure phrases that mark an error as worth retrying on a
/// different node. Matched case-insensitively, as a fallback for errors
/// whose structured kind could not be determined.
const RETRYABLE_KEYWORDS: [&str; 8] = [
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "connect exception",
    "socket timeout",
    "no route to host",
    "connection closed",
];

/// Drives the strategy and the backend client for one inbound request at a
/// time.
///
/// The router is the only place transport failures are classified into
/// retryable vs terminal. It never writes node health; demotion is the
/// health checker's job, and a node excluded here stays excluded only for
/// the current request.
pub struct RequestRouter {
    registry: Arc<NodeRegistry>,
    strategy: Arc<dyn SelectionStrategy>,
    client: BackendClient,
    max_attempts: u32,
}

impl RequestRouter {
    pub fn new(
        registry: Arc<NodeRegistry>,
        strategy: Arc<dyn SelectionStrategy>,
        client: BackendClient,
        max_attempts: u32,
    ) -> Self {
        Self {
            registry,
            strategy,
            client,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Routes one client request, trying up to `max_attempts` distinct
    /// nodes back-to-back. The first delivered HTTP response wins, whatever
    /// its status code.
    pub async fn handle(
        &self,
        path: &str,
        method: Method,
        headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> RequestResult {
        let mut excluded: HashSet<String> = HashSet::new();

        for attempt in 1..=self.max_attempts {
            let candidates: Vec<_> = self
                .registry
                .find_available()
                .await
                .into_iter()
                .filter(|node| !excluded.contains(&node.id))
                .collect();

            if candidates.is_empty() {
                // No further retry is possible, whether or not earlier
                // attempts ran.
                return RequestResult::NoAvailableNodes;
            }

            let Some(pick) = self.strategy.select(&candidates) else {
                return RequestResult::SelectionFailed;
            };

            debug!(
                node_id = %pick.id,
                attempt,
                strategy = self.strategy.name(),
                "forwarding request"
            );

            match self
                .client
                .forward(&pick, path, method.clone(), headers, body.clone())
                .await
            {
                ForwardResult::Success {
                    status_code,
                    latency,
                    body,
                } => {
                    // Any delivered response ends the loop, 5xx included.
                    return RequestResult::Success {
                        node_id: pick.id,
                        status_code,
                        latency,
                        body,
                    };
                }
                ForwardResult::Failure { error, kind } => {
                    if is_retryable(kind, &error) && attempt < self.max_attempts {
                        warn!(
                            node_id = %pick.id,
                            attempt,
                            error = %error,
                            "forward failed, excluding node for this request"
                        );
                        excluded.insert(pick.id);
                        continue;
                    }
                    return RequestResult::Failed { error };
                }
            }
        }

        RequestResult::Failed {
            error: "All retry attempts exhausted".to_string(),
        }
    }
}

/// Retryable iff the structured kind says so, with the keyword match as a
/// fallback for errors whose cause could not be classified.
pub fn is_retryable(kind: TransportErrorKind, error: &str) -> bool {
    kind.is_retryable() || is_retryable_message(error)
}

pub fn is_retryable_message(error: &str) -> bool {
    let lower = error.to_ascii_lowercase();
    RETRYABLE_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}
