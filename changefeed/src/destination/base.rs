use std::future::Future;

use crate::error::FeedResult;
use crate::types::{FeedRow, TargetId};

/// Bulk insert sink for rows read from the change feed.
///
/// Overload must be signaled with [`crate::error::ErrorKind::DestinationOverloaded`], which makes
/// the worker drop the page without checkpointing and retry it later. Delivery is at least once:
/// a retried page may rewrite batches that were already accepted.
pub trait Destination {
    fn write_batch(
        &self,
        target: &TargetId,
        rows: Vec<FeedRow>,
    ) -> impl Future<Output = FeedResult<()>> + Send;
}

/// Destination used when rows are only handed to the row processor.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDestination;

impl Destination for NoDestination {
    async fn write_batch(&self, _target: &TargetId, _rows: Vec<FeedRow>) -> FeedResult<()> {
        Ok(())
    }
}
