//! Row processing extension point.
//!
//! Business logic is plugged into the poll workers through [`RowProcessor`]. Workers call it for
//! every row of a page before forwarding the page to the destination and checkpointing it.

use std::future::Future;
use tracing::info;

use crate::concurrency::counter::ProcessedCounter;
use crate::error::FeedResult;
use crate::types::{FeedRow, TargetId};

/// Capability invoked for every row read from the change feed.
///
/// A failure is fatal to the worker that observed it and shuts down the whole consumer.
pub trait RowProcessor {
    fn process(
        &self,
        target: &TargetId,
        row: &FeedRow,
    ) -> impl Future<Output = FeedResult<()>> + Send;
}

/// Processor logging every row's columns.
#[derive(Debug, Clone, Default)]
pub struct LoggingProcessor {
    rows: ProcessedCounter,
}

impl LoggingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows logged so far, across all clones.
    pub fn logged_rows(&self) -> u64 {
        self.rows.get()
    }
}

impl RowProcessor for LoggingProcessor {
    async fn process(&self, target: &TargetId, row: &FeedRow) -> FeedResult<()> {
        let columns = row
            .columns
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        info!(%target, %columns, "received row");
        self.rows.increment();

        Ok(())
    }
}
