//! Discovery of the feed ranges of every target.

use std::collections::HashSet;
use tracing::info;

use crate::bail;
use crate::error::{ErrorKind, FeedResult};
use crate::feed_error;
use crate::source::ChangeFeedSource;
use crate::store::CheckpointStore;
use crate::store::backend::CheckpointBackend;
use crate::types::{COMPLETION_MARKER, FeedRange, RangeId, TargetId};

/// Registry of the ranges of each target.
///
/// Ranges are discovered from the source once, when a target's checkpoints are first created.
/// Afterwards the known good ranges are the ones with a checkpoint in a ready
/// [`CheckpointStore`].
#[derive(Debug, Clone)]
pub struct RangeRegistry<S> {
    source: S,
}

impl<S> RangeRegistry<S>
where
    S: ChangeFeedSource,
{
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Lists the ranges of `target` from the source metadata.
    ///
    /// Failures are not retried. An empty, duplicated, or reserved range id makes discovery fail
    /// since no correct checkpoint plan can be built from it.
    pub async fn discover(&self, target: &TargetId) -> FeedResult<Vec<RangeId>> {
        let ranges = self.source.list_ranges(target).await.map_err(|err| {
            feed_error!(
                ErrorKind::RangeDiscoveryFailed,
                "Failed to list the ranges of a target",
                format!("target '{target}': {err}")
            )
        })?;

        if ranges.is_empty() {
            bail!(
                ErrorKind::RangeDiscoveryFailed,
                "Target has no ranges",
                format!("target '{target}'")
            );
        }

        let mut seen = HashSet::with_capacity(ranges.len());
        for range in &ranges {
            if range.as_str() == COMPLETION_MARKER {
                bail!(
                    ErrorKind::RangeDiscoveryFailed,
                    "Range id collides with the completion marker",
                    format!("target '{target}', range '{range}'")
                );
            }

            if !seen.insert(range) {
                bail!(
                    ErrorKind::RangeDiscoveryFailed,
                    "Range id was discovered twice",
                    format!("target '{target}', range '{range}'")
                );
            }
        }

        info!(%target, ranges = ranges.len(), "discovered feed ranges");

        Ok(ranges)
    }

    /// Returns the ranges of every target in `targets`, flattened in target order.
    ///
    /// Every target must be ready in `store`. Within a target ranges are ordered by id.
    pub async fn feed_ranges<B>(
        &self,
        store: &CheckpointStore<B>,
        targets: &[TargetId],
    ) -> FeedResult<Vec<FeedRange>>
    where
        B: CheckpointBackend,
    {
        let mut feed_ranges = Vec::new();
        for target in targets {
            for range in store.ranges(target).await? {
                feed_ranges.push(FeedRange {
                    target: target.clone(),
                    range,
                });
            }
        }

        Ok(feed_ranges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    #[tokio::test]
    async fn discovery_rejects_unusable_range_sets() {
        let source = MemorySource::new();
        source.add_ranges("dup", ["a", "a"]).await;
        source.add_ranges("marker", ["a", COMPLETION_MARKER]).await;
        source.fail_discovery("down").await;
        let registry = RangeRegistry::new(source);

        for target in ["empty", "dup", "marker", "down"] {
            let err = registry.discover(&TargetId::new(target)).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::RangeDiscoveryFailed, "target {target}");
        }
    }

    #[tokio::test]
    async fn discovery_keeps_source_order() {
        let source = MemorySource::new();
        source.add_ranges("shop.orders", ["c", "a", "b"]).await;
        let registry = RangeRegistry::new(source);

        let ranges = registry
            .discover(&TargetId::new("shop.orders"))
            .await
            .unwrap();
        assert_eq!(ranges, vec![RangeId::new("c"), RangeId::new("a"), RangeId::new("b")]);
    }
}
