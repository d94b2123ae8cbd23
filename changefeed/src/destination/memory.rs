use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use crate::bail;
use crate::destination::Destination;
use crate::error::{ErrorKind, FeedResult};
use crate::types::{FeedRow, TargetId};

#[derive(Debug, Default)]
struct Inner {
    batches: Vec<(TargetId, Vec<FeedRow>)>,
    write_faults: VecDeque<ErrorKind>,
    row_conditions: Vec<(usize, Arc<Notify>)>,
}

impl Inner {
    fn row_count(&self) -> usize {
        self.batches.iter().map(|(_, rows)| rows.len()).sum()
    }

    fn check_conditions(&mut self) {
        let row_count = self.row_count();
        self.row_conditions.retain(|(expected, notify)| {
            let satisfied = row_count >= *expected;
            if satisfied {
                notify.notify_one();
            }
            !satisfied
        });
    }
}

/// Destination keeping every written batch in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the written batches in write order.
    pub async fn batches(&self) -> Vec<(TargetId, Vec<FeedRow>)> {
        let inner = self.inner.lock().await;
        inner.batches.clone()
    }

    /// Returns every written row, flattened in write order.
    pub async fn rows(&self) -> Vec<FeedRow> {
        let inner = self.inner.lock().await;
        inner
            .batches
            .iter()
            .flat_map(|(_, rows)| rows.iter().cloned())
            .collect()
    }

    /// Makes the next `times` writes fail with an error of `kind`.
    pub async fn inject_write_faults(&self, kind: ErrorKind, times: usize) {
        let mut inner = self.inner.lock().await;
        inner.write_faults.extend(std::iter::repeat_n(kind, times));
    }

    /// Returns a [`Notify`] fired once at least `count` rows were written.
    pub async fn wait_for_n_rows(&self, count: usize) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().await;
        inner.row_conditions.push((count, notify.clone()));
        inner.check_conditions();

        notify
    }
}

impl Destination for MemoryDestination {
    async fn write_batch(&self, target: &TargetId, rows: Vec<FeedRow>) -> FeedResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(kind) = inner.write_faults.pop_front() {
            debug!(%target, ?kind, "injecting write fault");
            bail!(kind, "Injected write fault", format!("target '{target}'"));
        }

        info!(%target, rows = rows.len(), "writing a batch of rows");
        inner.batches.push((target.clone(), rows));
        inner.check_conditions();

        Ok(())
    }
}
