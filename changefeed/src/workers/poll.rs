use changefeed_config::shared::FeedConfig;
use futures::FutureExt;
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::concurrency::counter::ProcessedCounter;
use crate::concurrency::shutdown::{
    ShutdownResult, ShutdownRx, ShutdownTx, is_shutdown_requested, sleep_or_shutdown,
};
use crate::destination::Destination;
use crate::error::{ErrorKind, FeedError, FeedResult};
use crate::feed_error;
use crate::metrics::{
    CHANGEFEED_CHECKPOINTS_TOTAL, CHANGEFEED_OVERLOADS_TOTAL,
    CHANGEFEED_PAGE_DRAIN_DURATION_SECONDS, CHANGEFEED_PAGE_SIZE,
    CHANGEFEED_ROWS_PROCESSED_TOTAL, DESTINATION, ORIGIN, SOURCE, TARGET,
};
use crate::processor::RowProcessor;
use crate::source::ChangeFeedSource;
use crate::store::CheckpointStore;
use crate::store::backend::CheckpointBackend;
use crate::types::FeedRange;
use crate::workers::base::{Worker, WorkerHandle};

/// Lifecycle phase of a poll worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollWorkerPhase {
    /// Rotating through the owned ranges.
    Running,
    /// Pausing after the source or destination signaled overload.
    BackingOff,
    /// Shutdown was observed, the loop is exiting.
    Stopping,
    /// The loop exited, either normally or with an error.
    Stopped,
}

/// Counters observed on a poll worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollWorkerStats {
    pub phase: PollWorkerPhase,
    /// Full passes through every owned range.
    pub rotations: u64,
    pub pages_checkpointed: u64,
    /// Pages dropped because of overload.
    pub overloads: u64,
    pub rows_processed: u64,
}

#[derive(Debug)]
struct PollWorkerStateInner {
    stats: PollWorkerStats,
    change: Arc<Notify>,
}

impl PollWorkerStateInner {
    fn set_phase(&mut self, phase: PollWorkerPhase) {
        if self.stats.phase != phase {
            debug!(
                "worker phase changing from '{:?}' to '{:?}'",
                self.stats.phase, phase
            );
        }

        self.stats.phase = phase;
        self.change.notify_waiters();
    }

    fn update(&mut self, f: impl FnOnce(&mut PollWorkerStats)) {
        f(&mut self.stats);
        self.change.notify_waiters();
    }

    fn stats(&self) -> PollWorkerStats {
        self.stats
    }
}

/// Shared, observable state of a poll worker.
#[derive(Debug, Clone)]
pub struct PollWorkerState {
    inner: Arc<RwLock<PollWorkerStateInner>>,
}

impl PollWorkerState {
    fn new() -> Self {
        let inner = PollWorkerStateInner {
            stats: PollWorkerStats {
                phase: PollWorkerPhase::Running,
                rotations: 0,
                pages_checkpointed: 0,
                overloads: 0,
                rows_processed: 0,
            },
            change: Arc::new(Notify::new()),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    pub async fn stats(&self) -> PollWorkerStats {
        self.inner.read().await.stats()
    }

    async fn set_phase(&self, phase: PollWorkerPhase) {
        self.inner.write().await.set_phase(phase);
    }

    async fn update(&self, f: impl FnOnce(&mut PollWorkerStats)) {
        self.inner.write().await.update(f);
    }

    /// Waits until `condition` holds for the worker's stats.
    pub async fn wait_for(&self, condition: impl Fn(&PollWorkerStats) -> bool) {
        loop {
            // Registering interest before checking avoids missing a change made in between.
            let change = self.inner.read().await.change.clone();
            let notified = change.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if condition(&self.stats().await) {
                return;
            }

            notified.await;
        }
    }
}

/// Outcome of a single range poll.
enum PollOutcome {
    /// The page was drained and its token checkpointed.
    Checkpointed,
    /// The page was dropped without checkpointing.
    Overloaded(FeedError),
    /// The page was drained and checkpointed, then shutdown was observed.
    Shutdown,
}

#[derive(Debug)]
pub struct PollWorkerHandle {
    worker_id: usize,
    ranges: Vec<FeedRange>,
    state: PollWorkerState,
    handle: Option<JoinHandle<FeedResult<()>>>,
}

impl PollWorkerHandle {
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn ranges(&self) -> &[FeedRange] {
        &self.ranges
    }
}

impl WorkerHandle<PollWorkerState> for PollWorkerHandle {
    fn state(&self) -> PollWorkerState {
        self.state.clone()
    }

    async fn wait(mut self) -> FeedResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await??;

        Ok(())
    }
}

/// Worker draining a fixed set of feed ranges round robin.
///
/// Each step reads one page of a range, hands every row to the processor, forwards the rows to
/// the destination in batches, and only then checkpoints the page's token. A rotation through all
/// ranges never starts sooner than the minimum cycle time after the previous one. Overload from
/// the source or destination drops the page and pauses the worker, the range is retried on its
/// next turn. Any other error stops the worker and signals shutdown to every other worker.
#[derive(Debug)]
pub struct PollWorker<S, B, P, D> {
    worker_id: usize,
    config: Arc<FeedConfig>,
    ranges: Vec<FeedRange>,
    source: S,
    store: CheckpointStore<B>,
    processor: P,
    destination: Option<D>,
    processed: ProcessedCounter,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl<S, B, P, D> PollWorker<S, B, P, D> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: usize,
        config: Arc<FeedConfig>,
        ranges: Vec<FeedRange>,
        source: S,
        store: CheckpointStore<B>,
        processor: P,
        destination: Option<D>,
        processed: ProcessedCounter,
        shutdown_tx: ShutdownTx,
    ) -> Self {
        // Subscribed here so that a shutdown sent before the worker starts is still observed.
        let shutdown_rx = shutdown_tx.subscribe();

        Self {
            worker_id,
            config,
            ranges,
            source,
            store,
            processor,
            destination,
            processed,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn ranges(&self) -> &[FeedRange] {
        &self.ranges
    }
}

impl<S, B, P, D> Worker<PollWorkerHandle, PollWorkerState> for PollWorker<S, B, P, D>
where
    S: ChangeFeedSource + Clone + Send + Sync + 'static,
    B: CheckpointBackend + Clone + Send + Sync + 'static,
    P: RowProcessor + Clone + Send + Sync + 'static,
    D: Destination + Clone + Send + Sync + 'static,
{
    type Error = FeedError;

    async fn start(self) -> FeedResult<PollWorkerHandle> {
        let worker_id = self.worker_id;
        info!(worker_id, ranges = self.ranges.len(), "starting poll worker");

        let state = PollWorkerState::new();
        let shutdown_tx = self.shutdown_tx.clone();
        let ranges = self.ranges.clone();

        let poll_worker_span = tracing::info_span!("poll_worker", worker_id);
        let poll_worker = {
            let state = state.clone();
            async move {
                let result = AssertUnwindSafe(self.run(&state)).catch_unwind().await;
                state.set_phase(PollWorkerPhase::Stopped).await;

                let result = result.unwrap_or_else(|panic| {
                    let detail = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic payload".to_owned());

                    Err(feed_error!(
                        ErrorKind::WorkerPanic,
                        "Poll worker panicked",
                        detail
                    ))
                });

                match &result {
                    Ok(()) => info!("poll worker stopped"),
                    Err(err) => {
                        error!(error = %err, "poll worker failed, shutting down all workers");
                        if shutdown_tx.shutdown().is_err() {
                            warn!("no worker was left to receive the shutdown signal");
                        }
                    }
                }

                result
            }
        }
        .instrument(poll_worker_span);

        let handle = tokio::spawn(poll_worker);

        Ok(PollWorkerHandle {
            worker_id,
            ranges,
            state,
            handle: Some(handle),
        })
    }
}

impl<S, B, P, D> PollWorker<S, B, P, D>
where
    S: ChangeFeedSource + Clone + Send + Sync + 'static,
    B: CheckpointBackend + Clone + Send + Sync + 'static,
    P: RowProcessor + Clone + Send + Sync + 'static,
    D: Destination + Clone + Send + Sync + 'static,
{
    async fn run(mut self, state: &PollWorkerState) -> FeedResult<()> {
        if self.ranges.is_empty() {
            return Ok(());
        }

        let min_cycle_time = self.config.min_cycle_time();
        let overload_backoff = self.config.overload_backoff();

        let mut readers = HashMap::with_capacity(self.ranges.len());
        let mut rotation_started: Option<Instant> = None;
        let mut index = 0;

        loop {
            if is_shutdown_requested(&self.shutdown_rx) {
                break;
            }

            if index == 0 {
                if let Some(started) = rotation_started {
                    let remaining = min_cycle_time.saturating_sub(started.elapsed());
                    if !remaining.is_zero() {
                        debug!(?remaining, "rotation finished early, waiting");
                        if sleep_or_shutdown(remaining, &mut self.shutdown_rx)
                            .await
                            .should_shutdown()
                        {
                            break;
                        }
                    }
                }

                rotation_started = Some(Instant::now());
            }

            let range = self.ranges[index].clone();
            match self.poll_range(&range, &mut readers, state).await? {
                PollOutcome::Checkpointed => {}
                PollOutcome::Overloaded(err) => {
                    if self
                        .back_off(&range, err, overload_backoff, state)
                        .await
                        .should_shutdown()
                    {
                        break;
                    }
                }
                PollOutcome::Shutdown => break,
            }

            index = (index + 1) % self.ranges.len();
            if index == 0 {
                state.update(|stats| stats.rotations += 1).await;
            }
        }

        info!("shutdown observed, stopping poll worker");
        state.set_phase(PollWorkerPhase::Stopping).await;

        Ok(())
    }

    /// Pauses after an overload, unless shutdown interrupts the pause.
    async fn back_off(
        &mut self,
        range: &FeedRange,
        err: FeedError,
        backoff: Duration,
        state: &PollWorkerState,
    ) -> ShutdownResult<(), ()> {
        let origin = if err.kind() == ErrorKind::DestinationOverloaded {
            DESTINATION
        } else {
            SOURCE
        };
        warn!(%range, error = %err, ?backoff, "overloaded, dropping page and backing off");
        counter!(CHANGEFEED_OVERLOADS_TOTAL, TARGET => range.target.to_string(), ORIGIN => origin)
            .increment(1);

        state
            .update(|stats| {
                stats.overloads += 1;
            })
            .await;
        state.set_phase(PollWorkerPhase::BackingOff).await;

        if sleep_or_shutdown(backoff, &mut self.shutdown_rx)
            .await
            .should_shutdown()
        {
            return ShutdownResult::Shutdown(());
        }

        state.set_phase(PollWorkerPhase::Running).await;

        ShutdownResult::Ok(())
    }

    async fn poll_range(
        &self,
        range: &FeedRange,
        readers: &mut HashMap<FeedRange, S::Reader>,
        state: &PollWorkerState,
    ) -> FeedResult<PollOutcome> {
        let checkpoint = self.store.get_token(&range.target, &range.range).await?;
        let start = checkpoint.read_start(&self.config.start_position);

        let reader = match readers.entry(range.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(%range, "preparing reader");
                // On overload the entry stays vacant, the next turn prepares again.
                match self.source.prepare_reader(range).await {
                    Ok(reader) => entry.insert(reader),
                    Err(err) if err.is_transient() => return Ok(PollOutcome::Overloaded(err)),
                    Err(err) => return Err(err),
                }
            }
        };

        let page = match self
            .source
            .read_page(reader, &start, self.config.page_size)
            .await
        {
            Ok(page) => page,
            Err(err) if err.is_transient() => return Ok(PollOutcome::Overloaded(err)),
            Err(err) => return Err(err),
        };

        let drain_started = Instant::now();
        let row_count = page.rows.len();
        debug!(%range, rows = row_count, "read page");
        histogram!(CHANGEFEED_PAGE_SIZE, TARGET => range.target.to_string())
            .record(row_count as f64);

        for row in &page.rows {
            self.processor.process(&range.target, row).await?;
            self.processed.increment();
        }

        if row_count > 0 {
            counter!(CHANGEFEED_ROWS_PROCESSED_TOTAL, TARGET => range.target.to_string())
                .increment(row_count as u64);
            state
                .update(|stats| stats.rows_processed += row_count as u64)
                .await;
        }

        if let Some(destination) = &self.destination {
            for batch in page.rows.chunks(self.config.batch.max_size.max(1)) {
                match destination.write_batch(&range.target, batch.to_vec()).await {
                    Ok(()) => {}
                    Err(err) if err.is_transient() => return Ok(PollOutcome::Overloaded(err)),
                    Err(err) => return Err(err),
                }
            }
        }

        // The page is fully drained here, so its token is checkpointed even when shutdown was
        // requested meanwhile.
        let shutdown_requested = is_shutdown_requested(&self.shutdown_rx);

        self.store
            .set_token(&range.target, &range.range, page.next_token)
            .await?;

        counter!(CHANGEFEED_CHECKPOINTS_TOTAL, TARGET => range.target.to_string()).increment(1);
        histogram!(CHANGEFEED_PAGE_DRAIN_DURATION_SECONDS, TARGET => range.target.to_string())
            .record(drain_started.elapsed().as_secs_f64());
        state.update(|stats| stats.pages_checkpointed += 1).await;

        if shutdown_requested {
            return Ok(PollOutcome::Shutdown);
        }

        Ok(PollOutcome::Checkpointed)
    }
}
