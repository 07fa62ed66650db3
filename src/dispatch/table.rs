//! Correlation table: in-flight transaction registry.
//!
//! # Responsibilities
//! - Allocate process-monotonic correlation ids (starting at 1)
//! - Map id → rendezvous with shared ownership per entry
//! - Atomic take-by-id so exactly one of worker/demultiplexer removes an entry
//!
//! # Design Decisions
//! - Sharded concurrent map; nothing heavier than pointer ops under a shard
//! - `len()` is read before allocation to enforce the admission bound

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::rendezvous::Rendezvous;

pub struct CorrelationTable {
    next_id: AtomicU64,
    entries: DashMap<u64, Arc<Rendezvous>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }

    /// Allocate a fresh correlation id and insert a new rendezvous for it.
    pub fn register(&self) -> (u64, Arc<Rendezvous>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rendezvous = Arc::new(Rendezvous::new());
        self.entries.insert(id, Arc::clone(&rendezvous));
        (id, rendezvous)
    }

    /// Remove and return the rendezvous for `id`. Atomic: under a concurrent
    /// race exactly one caller gets `Some`.
    pub fn take(&self, id: u64) -> Option<Arc<Rendezvous>> {
        self.entries.remove(&id).map(|(_, rendezvous)| rendezvous)
    }

    /// Number of in-flight transactions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}
