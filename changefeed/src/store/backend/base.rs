use std::future::Future;

use crate::error::FeedResult;
use crate::types::{RangeId, ResumeToken, TargetId};

/// Durable table of checkpoints keyed by `(target, range id)`.
///
/// Implementations must serialize concurrent writes to distinct keys safely. Rows are never
/// deleted.
pub trait CheckpointBackend {
    /// Returns every checkpoint row stored for `target`, the completion marker included.
    fn read_all(
        &self,
        target: &TargetId,
    ) -> impl Future<Output = FeedResult<Vec<(RangeId, Option<ResumeToken>)>>> + Send;

    /// Inserts or overwrites the token of a single range.
    ///
    /// The write must be durable when the returned future resolves.
    fn upsert(
        &self,
        target: &TargetId,
        range: &RangeId,
        token: Option<&ResumeToken>,
    ) -> impl Future<Output = FeedResult<()>> + Send;
}
