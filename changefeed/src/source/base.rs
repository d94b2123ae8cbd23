use std::future::Future;

use crate::error::FeedResult;
use crate::types::{FeedPage, FeedRange, RangeId, ReadStart, TargetId};

/// Paged query API of an append-only change stream split into feed ranges.
///
/// Implementations signal rate limiting with [`crate::error::ErrorKind::SourceOverloaded`] and
/// connection loss with [`crate::error::ErrorKind::SourceUnavailable`]. Only the former is
/// retried by the poll workers.
pub trait ChangeFeedSource {
    /// Prepared, reusable query handle for a single range.
    type Reader: Send + Sync + 'static;

    /// Returns the ranges of `target` in discovery order.
    fn list_ranges(
        &self,
        target: &TargetId,
    ) -> impl Future<Output = FeedResult<Vec<RangeId>>> + Send;

    /// Prepares the query handle used for every read of `range`.
    ///
    /// Workers call this once per owned range and cache the result.
    fn prepare_reader(
        &self,
        range: &FeedRange,
    ) -> impl Future<Output = FeedResult<Self::Reader>> + Send;

    /// Reads at most `max_rows` rows starting at `start`.
    ///
    /// The returned page carries the token to resume right after its last row. A page can be
    /// empty, in which case the token still identifies the current end of the range.
    fn read_page(
        &self,
        reader: &Self::Reader,
        start: &ReadStart,
        max_rows: usize,
    ) -> impl Future<Output = FeedResult<FeedPage>> + Send;
}
