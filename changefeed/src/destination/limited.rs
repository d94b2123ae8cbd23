use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::destination::Destination;
use crate::error::{ErrorKind, FeedResult};
use crate::feed_error;
use crate::types::{FeedRow, TargetId};

/// Destination wrapper bounding the number of batch writes in flight.
///
/// Clones share the same permits, so the bound holds across every worker writing through them.
#[derive(Debug, Clone)]
pub struct LimitedDestination<D> {
    inner: D,
    permits: Arc<Semaphore>,
}

impl<D> LimitedDestination<D> {
    pub fn new(inner: D, max_inflight_writes: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_inflight_writes)),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

impl<D> Destination for LimitedDestination<D>
where
    D: Destination + Sync,
{
    async fn write_batch(&self, target: &TargetId, rows: Vec<FeedRow>) -> FeedResult<()> {
        let _permit = self.permits.acquire().await.map_err(|err| {
            feed_error!(
                ErrorKind::InvalidState,
                "Destination write permits are closed",
                err
            )
        })?;

        self.inner.write_batch(target, rows).await
    }
}
