use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, FeedResult};
use crate::feed_error;
use crate::source::ChangeFeedSource;
use crate::types::{
    FeedPage, FeedRange, FeedRow, RangeId, ReadStart, ResumeToken, StartPosition, TargetId,
};

/// Rows of a single range, each stamped with the time it was appended.
#[derive(Debug, Default)]
struct RangeLog {
    rows: Vec<(DateTime<Utc>, FeedRow)>,
}

impl RangeLog {
    /// Resolves a read start to an offset into the log.
    fn offset(&self, start: &ReadStart) -> FeedResult<usize> {
        match start {
            ReadStart::Token(token) => {
                let offset = token.as_str().parse::<usize>().map_err(|err| {
                    feed_error!(
                        ErrorKind::InvalidResumeToken,
                        "Resume token is not a row offset",
                        format!("token '{token}': {err}")
                    )
                })?;

                if offset > self.rows.len() {
                    bail!(
                        ErrorKind::InvalidResumeToken,
                        "Resume token points past the end of the range",
                        format!("token '{token}', range length {}", self.rows.len())
                    );
                }

                Ok(offset)
            }
            ReadStart::Position(StartPosition::Beginning) => Ok(0),
            ReadStart::Position(StartPosition::Now) => Ok(self.rows.len()),
            ReadStart::Position(StartPosition::At { timestamp }) => Ok(self
                .rows
                .iter()
                .position(|(appended_at, _)| appended_at >= timestamp)
                .unwrap_or(self.rows.len())),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    ranges: HashMap<TargetId, Vec<RangeId>>,
    logs: HashMap<FeedRange, RangeLog>,
    discovery_failures: HashSet<TargetId>,
    read_faults: HashMap<FeedRange, VecDeque<ErrorKind>>,
    prepare_faults: HashMap<FeedRange, VecDeque<ErrorKind>>,
    reads: HashMap<FeedRange, usize>,
    prepared_readers: HashMap<FeedRange, usize>,
}

/// Query handle of a [`MemorySource`] range.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    range: FeedRange,
}

impl MemoryReader {
    pub fn range(&self) -> &FeedRange {
        &self.range
    }
}

/// In-process change feed source.
///
/// Resume tokens are row offsets into a range. Faults can be scripted per range so that reads
/// fail a given number of times before succeeding again.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers ranges for `target`, in discovery order.
    pub async fn add_ranges<I, R>(&self, target: impl Into<TargetId>, ranges: I)
    where
        I: IntoIterator<Item = R>,
        R: Into<RangeId>,
    {
        let target = target.into();
        let mut inner = self.inner.lock().await;
        for range in ranges {
            let range = range.into();
            inner
                .logs
                .entry(FeedRange::new(target.clone(), range.clone()))
                .or_default();
            inner.ranges.entry(target.clone()).or_default().push(range);
        }
    }

    /// Appends rows to a range, stamped with the current time.
    pub async fn append_rows(&self, range: &FeedRange, rows: Vec<FeedRow>) {
        self.append_rows_at(range, Utc::now(), rows).await;
    }

    /// Appends rows to a range, stamped with `appended_at`.
    pub async fn append_rows_at(
        &self,
        range: &FeedRange,
        appended_at: DateTime<Utc>,
        rows: Vec<FeedRow>,
    ) {
        let mut inner = self.inner.lock().await;
        let log = inner.logs.entry(range.clone()).or_default();
        log.rows.extend(rows.into_iter().map(|row| (appended_at, row)));
    }

    /// Makes range discovery of `target` fail with [`ErrorKind::SourceUnavailable`].
    pub async fn fail_discovery(&self, target: impl Into<TargetId>) {
        let mut inner = self.inner.lock().await;
        inner.discovery_failures.insert(target.into());
    }

    /// Makes the next `times` reads of `range` fail with an error of `kind`.
    pub async fn inject_read_faults(&self, range: &FeedRange, kind: ErrorKind, times: usize) {
        let mut inner = self.inner.lock().await;
        inner
            .read_faults
            .entry(range.clone())
            .or_default()
            .extend(std::iter::repeat_n(kind, times));
    }

    /// Makes the next `times` reader preparations of `range` fail with an error of `kind`.
    pub async fn inject_prepare_faults(&self, range: &FeedRange, kind: ErrorKind, times: usize) {
        let mut inner = self.inner.lock().await;
        inner
            .prepare_faults
            .entry(range.clone())
            .or_default()
            .extend(std::iter::repeat_n(kind, times));
    }

    /// Returns the number of read attempts on `range`, failed ones included.
    pub async fn read_count(&self, range: &FeedRange) -> usize {
        let inner = self.inner.lock().await;
        inner.reads.get(range).copied().unwrap_or(0)
    }

    /// Returns how many readers were prepared for `range`.
    pub async fn prepared_readers(&self, range: &FeedRange) -> usize {
        let inner = self.inner.lock().await;
        inner.prepared_readers.get(range).copied().unwrap_or(0)
    }

    /// Returns the number of rows currently stored for `range`.
    pub async fn row_count(&self, range: &FeedRange) -> usize {
        let inner = self.inner.lock().await;
        inner.logs.get(range).map(|log| log.rows.len()).unwrap_or(0)
    }
}

impl ChangeFeedSource for MemorySource {
    type Reader = MemoryReader;

    async fn list_ranges(&self, target: &TargetId) -> FeedResult<Vec<RangeId>> {
        let inner = self.inner.lock().await;
        if inner.discovery_failures.contains(target) {
            bail!(
                ErrorKind::SourceUnavailable,
                "Range metadata is unavailable",
                format!("target '{target}'")
            );
        }

        Ok(inner.ranges.get(target).cloned().unwrap_or_default())
    }

    async fn prepare_reader(&self, range: &FeedRange) -> FeedResult<MemoryReader> {
        let mut inner = self.inner.lock().await;
        if !inner.logs.contains_key(range) {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Range does not exist",
                format!("range '{range}'")
            );
        }

        if let Some(kind) = inner
            .prepare_faults
            .get_mut(range)
            .and_then(|faults| faults.pop_front())
        {
            debug!(%range, ?kind, "injecting prepare fault");
            bail!(kind, "Injected prepare fault", format!("range '{range}'"));
        }

        *inner.prepared_readers.entry(range.clone()).or_default() += 1;

        Ok(MemoryReader {
            range: range.clone(),
        })
    }

    async fn read_page(
        &self,
        reader: &MemoryReader,
        start: &ReadStart,
        max_rows: usize,
    ) -> FeedResult<FeedPage> {
        let mut inner = self.inner.lock().await;
        *inner.reads.entry(reader.range.clone()).or_default() += 1;

        if let Some(kind) = inner
            .read_faults
            .get_mut(&reader.range)
            .and_then(|faults| faults.pop_front())
        {
            debug!(range = %reader.range, ?kind, "injecting read fault");
            bail!(kind, "Injected read fault", format!("range '{}'", reader.range));
        }

        let Some(log) = inner.logs.get(&reader.range) else {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Range does not exist",
                format!("range '{}'", reader.range)
            );
        };

        let offset = log.offset(start)?;
        let end = offset.saturating_add(max_rows).min(log.rows.len());
        let rows = log.rows[offset..end]
            .iter()
            .map(|(_, row)| row.clone())
            .collect();

        Ok(FeedPage::new(rows, ResumeToken::new(end.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn row(id: i64) -> FeedRow {
        FeedRow::default().with_column("id", id)
    }

    async fn source_with_rows(range: &FeedRange, count: i64) -> MemorySource {
        let source = MemorySource::new();
        source
            .add_ranges(range.target.clone(), [range.range.clone()])
            .await;
        source
            .append_rows(range, (0..count).map(row).collect())
            .await;
        source
    }

    #[tokio::test]
    async fn pages_are_bounded_and_resumable() {
        let range = FeedRange::new("shop.orders", "r0");
        let source = source_with_rows(&range, 5).await;
        let reader = source.prepare_reader(&range).await.unwrap();

        let first = source
            .read_page(&reader, &ReadStart::Position(StartPosition::Beginning), 3)
            .await
            .unwrap();
        assert_eq!(first.rows, vec![row(0), row(1), row(2)]);
        assert_eq!(first.next_token, ResumeToken::new("3"));

        let second = source
            .read_page(&reader, &ReadStart::Token(first.next_token), 3)
            .await
            .unwrap();
        assert_eq!(second.rows, vec![row(3), row(4)]);

        let third = source
            .read_page(&reader, &ReadStart::Token(second.next_token.clone()), 3)
            .await
            .unwrap();
        assert!(third.is_empty());
        assert_eq!(third.next_token, second.next_token);
    }

    #[tokio::test]
    async fn start_positions_resolve_against_the_log() {
        let range = FeedRange::new("shop.orders", "r0");
        let source = MemorySource::new();
        source.add_ranges("shop.orders", ["r0"]).await;

        let cutoff = Utc::now();
        source
            .append_rows_at(&range, cutoff - Duration::minutes(5), vec![row(0)])
            .await;
        source
            .append_rows_at(&range, cutoff + Duration::minutes(5), vec![row(1)])
            .await;
        let reader = source.prepare_reader(&range).await.unwrap();

        let now = source
            .read_page(&reader, &ReadStart::Position(StartPosition::Now), 10)
            .await
            .unwrap();
        assert!(now.is_empty());
        assert_eq!(now.next_token, ResumeToken::new("2"));

        let at = source
            .read_page(
                &reader,
                &ReadStart::Position(StartPosition::At { timestamp: cutoff }),
                10,
            )
            .await
            .unwrap();
        assert_eq!(at.rows, vec![row(1)]);
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let range = FeedRange::new("shop.orders", "r0");
        let source = source_with_rows(&range, 1).await;
        source
            .inject_read_faults(&range, ErrorKind::SourceOverloaded, 2)
            .await;
        let reader = source.prepare_reader(&range).await.unwrap();
        let start = ReadStart::Position(StartPosition::Beginning);

        for _ in 0..2 {
            let err = source.read_page(&reader, &start, 10).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SourceOverloaded);
        }
        assert_eq!(source.read_page(&reader, &start, 10).await.unwrap().rows.len(), 1);
        assert_eq!(source.read_count(&range).await, 3);
    }

    #[tokio::test]
    async fn invalid_tokens_are_rejected() {
        let range = FeedRange::new("shop.orders", "r0");
        let source = source_with_rows(&range, 2).await;
        let reader = source.prepare_reader(&range).await.unwrap();

        for token in ["abc", "3"] {
            let err = source
                .read_page(&reader, &ReadStart::Token(ResumeToken::new(token)), 10)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidResumeToken);
        }
    }

    #[tokio::test]
    async fn discovery_lists_ranges_in_order_or_fails() {
        let source = MemorySource::new();
        source.add_ranges("shop.orders", ["b", "a", "c"]).await;
        source.fail_discovery("shop.users").await;

        let ranges = source
            .list_ranges(&TargetId::new("shop.orders"))
            .await
            .unwrap();
        assert_eq!(ranges, vec![RangeId::new("b"), RangeId::new("a"), RangeId::new("c")]);

        let err = source
            .list_ranges(&TargetId::new("shop.users"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    }
}
