use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Count of rows processed across all workers.
///
/// Clones share the same underlying counter.
#[derive(Debug, Clone, Default)]
pub struct ProcessedCounter(Arc<AtomicU64>);

impl ProcessedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.add(1);
    }

    pub fn add(&self, count: u64) {
        self.0.fetch_add(count, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
