use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, FeedResult};
use crate::store::backend::CheckpointBackend;
use crate::types::{RangeId, ResumeToken, TargetId};

/// A single upsert observed by a [`MemoryCheckpointBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointWrite {
    pub target: TargetId,
    pub range: RangeId,
    pub token: Option<ResumeToken>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: HashMap<TargetId, BTreeMap<RangeId, Option<ResumeToken>>>,
    writes: Vec<CheckpointWrite>,
    read_faults: usize,
    write_faults: usize,
}

/// Checkpoint backend keeping rows in memory, for tests and ephemeral consumers.
///
/// Every upsert is also appended to a write history, which lets callers verify the order in
/// which checkpoints were written.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCheckpointBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores rows for `target` directly, without recording them as writes.
    pub async fn seed<I, R>(&self, target: impl Into<TargetId>, rows: I)
    where
        I: IntoIterator<Item = (R, Option<ResumeToken>)>,
        R: Into<RangeId>,
    {
        let mut inner = self.inner.lock().await;
        let stored = inner.rows.entry(target.into()).or_default();
        for (range, token) in rows {
            stored.insert(range.into(), token);
        }
    }

    /// Returns the rows stored for `target`, ordered by range id.
    pub async fn rows(&self, target: &TargetId) -> BTreeMap<RangeId, Option<ResumeToken>> {
        let inner = self.inner.lock().await;
        inner.rows.get(target).cloned().unwrap_or_default()
    }

    /// Returns every upsert performed so far, in order.
    pub async fn writes(&self) -> Vec<CheckpointWrite> {
        let inner = self.inner.lock().await;
        inner.writes.clone()
    }

    /// Makes the next `times` reads fail.
    pub async fn fail_next_reads(&self, times: usize) {
        let mut inner = self.inner.lock().await;
        inner.read_faults += times;
    }

    /// Makes the next `times` upserts fail without storing anything.
    pub async fn fail_next_writes(&self, times: usize) {
        let mut inner = self.inner.lock().await;
        inner.write_faults += times;
    }
}

impl CheckpointBackend for MemoryCheckpointBackend {
    async fn read_all(
        &self,
        target: &TargetId,
    ) -> FeedResult<Vec<(RangeId, Option<ResumeToken>)>> {
        let mut inner = self.inner.lock().await;
        if inner.read_faults > 0 {
            inner.read_faults -= 1;
            bail!(
                ErrorKind::CheckpointStoreFailed,
                "Injected checkpoint read fault",
                format!("target '{target}'")
            );
        }

        Ok(inner
            .rows
            .get(target)
            .map(|rows| {
                rows.iter()
                    .map(|(range, token)| (range.clone(), token.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert(
        &self,
        target: &TargetId,
        range: &RangeId,
        token: Option<&ResumeToken>,
    ) -> FeedResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.write_faults > 0 {
            inner.write_faults -= 1;
            bail!(
                ErrorKind::CheckpointStoreFailed,
                "Injected checkpoint write fault",
                format!("target '{target}', range '{range}'")
            );
        }

        inner
            .rows
            .entry(target.clone())
            .or_default()
            .insert(range.clone(), token.cloned());
        inner.writes.push(CheckpointWrite {
            target: target.clone(),
            range: range.clone(),
            token: token.cloned(),
        });

        Ok(())
    }
}
