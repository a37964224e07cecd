//! Backend selection strategies.

use std::sync::atomic::{AtomicU64, Ordering};

use loadstone_common::Node;

/// Picks the next backend to try from an ordered candidate snapshot.
///
/// Implementations must not reorder the candidates: the registry hands every
/// caller the same stable order, and selecting on top of that order is what
/// spreads load evenly in the long run. A circuit-breaking or weighted
/// strategy would plug in behind this same trait.
pub trait SelectionStrategy: Send + Sync {
    /// Returns `None` iff `candidates` is empty.
    fn select(&self, candidates: &[Node]) -> Option<Node>;

    /// Strategy name, for logging.
    fn name(&self) -> &'static str;
}

/// Round-robin selection over a process-wide monotonic cursor.
pub struct RoundRobin {
    cursor: AtomicU64,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            cursor: AtomicU64::new(0),
        }
    }

    /// Rewinds the cursor. Test hook only.
    pub fn reset(&self) {
        self.cursor.store(0, Ordering::Relaxed);
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStrategy for RoundRobin {
    fn select(&self, candidates: &[Node]) -> Option<Node> {
        if candidates.is_empty() {
            return None;
        }
        // fetch_add wraps on overflow; unsigned modulo keeps the rotation
        // fair across the wrap.
        let tick = self.cursor.fetch_add(1, Ordering::Relaxed);
        let index = (tick % candidates.len() as u64) as usize;
        Some(candidates[index].clone())
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}
