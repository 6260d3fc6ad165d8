//! Retroactive friction propagation (§4.E). Comparisons are commutative at
//! the claim-set level: when entry A lands a `COMPARE_CLAIMS` against peer
//! B, B's own cached `max_friction` is stale until something recomputes it
//! from B's perspective. Rather than writing into B synchronously inside
//! A's completion (which would hold the writer lock across two unrelated
//! rows), pending peers are pushed onto a small deduplicated queue that a
//! background task drains on its own schedule.

use std::collections::VecDeque;
use std::sync::Mutex;

use kx_core::ids::EntryId;
use kx_core::model::Comparison;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct PendingPropagation {
    pub peer_id: EntryId,
    pub comparison: Comparison,
}

/// Bounded, deduplicated by `peer_id` — a burst of comparisons against the
/// same peer only ever queues one pending recompute; if the queue is full,
/// new entries are dropped and logged rather than growing unbounded.
pub struct RetroactiveQueue {
    capacity: usize,
    items: Mutex<VecDeque<PendingPropagation>>,
}

impl RetroactiveQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, peer_id: EntryId, comparison: Comparison) {
        let mut items = self.items.lock().expect("retroactive queue mutex poisoned");
        if items.iter().any(|p| p.peer_id == peer_id) {
            return;
        }
        if items.len() >= self.capacity {
            warn!(%peer_id, capacity = self.capacity, "retroactive propagation queue full, dropping");
            return;
        }
        items.push_back(PendingPropagation { peer_id, comparison });
    }

    /// Remove and return everything currently queued.
    pub fn drain(&self) -> Vec<PendingPropagation> {
        let mut items = self.items.lock().expect("retroactive queue mutex poisoned");
        items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("retroactive queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comparison(against: EntryId) -> Comparison {
        Comparison {
            compared_against: against,
            entropy: 0.1,
            friction: 0.5,
            contradictions: vec![],
            is_mirrored: false,
        }
    }

    #[test]
    fn pushing_same_peer_twice_only_queues_once() {
        let q = RetroactiveQueue::new(10);
        let peer = EntryId::new();
        q.push(peer, comparison(peer));
        q.push(peer, comparison(peer));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn drain_empties_the_queue() {
        let q = RetroactiveQueue::new(10);
        q.push(EntryId::new(), comparison(EntryId::new()));
        q.push(EntryId::new(), comparison(EntryId::new()));
        let drained = q.drain();
        assert_eq!(drained.len(), 2);
        assert!(q.is_empty());
    }

    #[test]
    fn queue_drops_beyond_capacity() {
        let q = RetroactiveQueue::new(1);
        q.push(EntryId::new(), comparison(EntryId::new()));
        q.push(EntryId::new(), comparison(EntryId::new()));
        assert_eq!(q.len(), 1);
    }
}
