//! Shared helpers for the change feed integration tests.
//!
//! The recording wrappers log processor calls, destination writes, and checkpoint writes into a
//! single [`EventLog`] so tests can assert on their relative order.

#![allow(dead_code)]

use changefeed::error::{ErrorKind, FeedResult};
use changefeed::bail;
use changefeed::destination::{Destination, MemoryDestination};
use changefeed::processor::RowProcessor;
use changefeed::store::backend::{CheckpointBackend, MemoryCheckpointBackend};
use changefeed::types::{FeedRow, RangeId, ResumeToken, TargetId};
use changefeed_config::shared::{BatchConfig, FeedConfig, StartPosition};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Upper bound for any condition a test waits on.
const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds a row with a single `id` column.
pub fn row(id: i64) -> FeedRow {
    FeedRow::default().with_column("id", id)
}

pub fn rows(ids: std::ops::Range<i64>) -> Vec<FeedRow> {
    ids.map(row).collect()
}

pub fn row_id(row: &FeedRow) -> i64 {
    row.get("id").and_then(|value| value.as_i64()).unwrap()
}

pub fn feed_config(targets: &[&str]) -> FeedConfig {
    FeedConfig {
        targets: targets.iter().map(|target| target.to_string()).collect(),
        start_position: StartPosition::Beginning,
        page_size: 10,
        max_concurrency: 2,
        min_cycle_time_ms: 10,
        overload_backoff_ms: 20,
        batch: BatchConfig {
            max_size: 2,
            max_inflight_writes: None,
        },
    }
}

/// Polls `condition` until it holds.
///
/// # Panics
///
/// Panics if the condition does not hold within [`WAIT_TIMEOUT`].
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition was not met in time");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Processed {
        target: TargetId,
        id: i64,
    },
    Forwarded {
        target: TargetId,
        ids: Vec<i64>,
    },
    Checkpointed {
        target: TargetId,
        range: RangeId,
        token: Option<ResumeToken>,
    },
}

/// Ordered log of the side effects observed by the recording wrappers.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Returns the checkpoint writes of `range`, in order.
    pub fn checkpoints_of(&self, range: &str) -> Vec<Option<ResumeToken>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Checkpointed {
                    range: written,
                    token,
                    ..
                } if written.as_str() == range => Some(token),
                _ => None,
            })
            .collect()
    }
}

/// Row processor recording every row and optionally failing on a given row id.
#[derive(Debug, Clone)]
pub struct RecordingProcessor {
    log: EventLog,
    fail_on: Option<i64>,
}

impl RecordingProcessor {
    pub fn new(log: EventLog) -> Self {
        Self { log, fail_on: None }
    }

    pub fn failing_on(log: EventLog, id: i64) -> Self {
        Self {
            log,
            fail_on: Some(id),
        }
    }

    pub fn processed_ids(&self) -> Vec<i64> {
        self.log
            .events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Processed { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }
}

impl RowProcessor for RecordingProcessor {
    async fn process(&self, target: &TargetId, row: &FeedRow) -> FeedResult<()> {
        let id = row_id(row);
        if self.fail_on == Some(id) {
            bail!(
                ErrorKind::RowProcessingFailed,
                "Row was rejected by the processor",
                format!("row {id}")
            );
        }

        self.log.push(Event::Processed {
            target: target.clone(),
            id,
        });

        Ok(())
    }
}

/// Destination recording every successful batch write in the event log.
#[derive(Debug, Clone)]
pub struct RecordingDestination {
    log: EventLog,
    inner: MemoryDestination,
}

impl RecordingDestination {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            inner: MemoryDestination::new(),
        }
    }

    pub fn inner(&self) -> &MemoryDestination {
        &self.inner
    }
}

impl Destination for RecordingDestination {
    async fn write_batch(&self, target: &TargetId, rows: Vec<FeedRow>) -> FeedResult<()> {
        let ids = rows.iter().map(row_id).collect();
        self.inner.write_batch(target, rows).await?;
        self.log.push(Event::Forwarded {
            target: target.clone(),
            ids,
        });

        Ok(())
    }
}

/// Checkpoint backend recording every successful upsert in the event log.
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    log: EventLog,
    inner: MemoryCheckpointBackend,
}

impl RecordingBackend {
    pub fn new(log: EventLog) -> Self {
        Self::wrap(log, MemoryCheckpointBackend::new())
    }

    pub fn wrap(log: EventLog, inner: MemoryCheckpointBackend) -> Self {
        Self { log, inner }
    }

    pub fn inner(&self) -> &MemoryCheckpointBackend {
        &self.inner
    }
}

impl CheckpointBackend for RecordingBackend {
    async fn read_all(&self, target: &TargetId) -> FeedResult<Vec<(RangeId, Option<ResumeToken>)>> {
        self.inner.read_all(target).await
    }

    async fn upsert(
        &self,
        target: &TargetId,
        range: &RangeId,
        token: Option<&ResumeToken>,
    ) -> FeedResult<()> {
        self.inner.upsert(target, range, token).await?;
        self.log.push(Event::Checkpointed {
            target: target.clone(),
            range: range.clone(),
            token: token.cloned(),
        });

        Ok(())
    }
}
