//! Composition of the checkpoint store, range registry, distributor, and poll workers.

use changefeed_config::shared::FeedConfig;
use metrics::gauge;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::bail;
use crate::concurrency::counter::ProcessedCounter;
use crate::concurrency::shutdown::{
    ShutdownRx, ShutdownTx, create_shutdown_channel, is_shutdown_requested,
};
use crate::destination::{Destination, LimitedDestination, NoDestination};
use crate::distributor::{WorkerAssignment, distribute};
use crate::error::{ErrorKind, FeedError, FeedResult};
use crate::feed_error;
use crate::metrics::{CHANGEFEED_WORKERS_TOTAL, register_metrics};
use crate::processor::RowProcessor;
use crate::registry::RangeRegistry;
use crate::source::ChangeFeedSource;
use crate::store::CheckpointStore;
use crate::store::backend::CheckpointBackend;
use crate::types::TargetId;
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::poll::{PollWorker, PollWorkerHandle, PollWorkerState};

#[derive(Debug)]
enum SupervisorState {
    NotStarted,
    Started { workers: Vec<PollWorkerHandle> },
    Stopped,
}

/// Runs one poll worker per partition of the configured targets' ranges.
///
/// [`Supervisor::start`] initializes the checkpoints of every target before any worker starts,
/// so discovery failures and corrupt checkpoints abort the run early. Once running, the first
/// worker failing shuts every other worker down.
#[derive(Debug)]
pub struct Supervisor<S, B, P, D = NoDestination> {
    config: Arc<FeedConfig>,
    registry: RangeRegistry<S>,
    store: CheckpointStore<B>,
    processor: P,
    destination: Option<D>,
    processed: ProcessedCounter,
    state: SupervisorState,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl<S, B, P> Supervisor<S, B, P, NoDestination>
where
    S: ChangeFeedSource + Clone + Send + Sync + 'static,
    B: CheckpointBackend + Clone + Send + Sync + 'static,
    P: RowProcessor + Clone + Send + Sync + 'static,
{
    pub fn new(config: FeedConfig, source: S, backend: B, processor: P) -> Self {
        register_metrics();

        // The receiver kept here lets a shutdown requested before `start` be detected.
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        Self {
            config: Arc::new(config),
            registry: RangeRegistry::new(source),
            store: CheckpointStore::new(backend),
            processor,
            destination: None,
            processed: ProcessedCounter::new(),
            state: SupervisorState::NotStarted,
            shutdown_tx,
            shutdown_rx,
        }
    }
}

impl<S, B, P, D> Supervisor<S, B, P, D>
where
    S: ChangeFeedSource + Clone + Send + Sync + 'static,
    B: CheckpointBackend + Clone + Send + Sync + 'static,
    P: RowProcessor + Clone + Send + Sync + 'static,
    D: Destination + Clone + Send + Sync + 'static,
{
    /// Forwards every drained page to `destination` before checkpointing it.
    pub fn with_destination<D2>(self, destination: D2) -> Supervisor<S, B, P, D2>
    where
        D2: Destination + Clone + Send + Sync + 'static,
    {
        Supervisor {
            config: self.config,
            registry: self.registry,
            store: self.store,
            processor: self.processor,
            destination: Some(destination),
            processed: self.processed,
            state: self.state,
            shutdown_tx: self.shutdown_tx,
            shutdown_rx: self.shutdown_rx,
        }
    }

    /// Like [`Supervisor::with_destination`], bounding in-flight writes by
    /// `batch.max_inflight_writes` across all workers.
    pub fn with_limited_destination<D2>(
        self,
        destination: D2,
    ) -> Supervisor<S, B, P, LimitedDestination<D2>>
    where
        D2: Destination + Clone + Send + Sync + 'static,
    {
        let max_inflight_writes = self
            .config
            .batch
            .max_inflight_writes
            .unwrap_or(Semaphore::MAX_PERMITS);

        self.with_destination(LimitedDestination::new(destination, max_inflight_writes))
    }

    pub fn store(&self) -> &CheckpointStore<B> {
        &self.store
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Rows handed to the processor so far, across all workers.
    pub fn processed_rows(&self) -> u64 {
        self.processed.get()
    }

    /// Returns the state of every running worker, ordered by worker id.
    pub fn worker_states(&self) -> Vec<PollWorkerState> {
        match &self.state {
            SupervisorState::Started { workers } => {
                workers.iter().map(|worker| worker.state()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Returns the ranges owned by every running worker, ordered by worker id.
    pub fn assignments(&self) -> Vec<WorkerAssignment> {
        match &self.state {
            SupervisorState::Started { workers } => workers
                .iter()
                .map(|worker| WorkerAssignment {
                    worker_id: worker.worker_id(),
                    ranges: worker.ranges().to_vec(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Initializes every target and starts the poll workers.
    pub async fn start(&mut self) -> FeedResult<()> {
        if !matches!(self.state, SupervisorState::NotStarted) {
            bail!(
                ErrorKind::InvalidState,
                "Supervisor was already started",
                format!("state: {:?}", self.state)
            );
        }

        if is_shutdown_requested(&self.shutdown_rx) {
            bail!(
                ErrorKind::InvalidState,
                "Supervisor was shut down before starting"
            );
        }

        self.config.validate().map_err(|err| {
            feed_error!(ErrorKind::ConfigError, "Invalid feed configuration", err)
        })?;

        let targets = self
            .config
            .targets
            .iter()
            .map(|target| TargetId::new(target.as_str()))
            .collect::<Vec<_>>();

        info!(targets = targets.len(), "initializing checkpoints");
        for target in &targets {
            self.store.initialize(target, &self.registry).await?;
        }

        let ranges = self.registry.feed_ranges(&self.store, &targets).await?;
        let assignments = distribute(ranges, self.config.max_concurrency);
        gauge!(CHANGEFEED_WORKERS_TOTAL).set(assignments.len() as f64);

        info!(workers = assignments.len(), "starting poll workers");

        let mut workers = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let worker = PollWorker::new(
                assignment.worker_id,
                self.config.clone(),
                assignment.ranges,
                self.registry.source().clone(),
                self.store.clone(),
                self.processor.clone(),
                self.destination.clone(),
                self.processed.clone(),
                self.shutdown_tx.clone(),
            );

            let handle = match worker.start().await {
                Ok(handle) => handle,
                Err(err) => {
                    // Workers started so far must not keep running unsupervised.
                    self.state = SupervisorState::Started { workers };
                    self.shutdown();
                    return Err(err);
                }
            };
            workers.push(handle);
        }

        self.state = SupervisorState::Started { workers };

        Ok(())
    }

    /// Signals every worker to stop after its current step. Idempotent.
    pub fn shutdown(&self) {
        info!("shutting down poll workers");

        if let Err(err) = self.shutdown_tx.shutdown() {
            warn!(error = %err, "failed to send the shutdown signal");
        }
    }

    /// Waits for every worker to stop, returning all worker errors aggregated.
    pub async fn wait(&mut self) -> FeedResult<()> {
        if !matches!(self.state, SupervisorState::Started { .. }) {
            info!("supervisor has no running workers to wait for");
            return Ok(());
        }

        let SupervisorState::Started { workers } =
            std::mem::replace(&mut self.state, SupervisorState::Stopped)
        else {
            return Ok(());
        };

        let mut errors: Vec<FeedError> = Vec::new();
        for worker in workers {
            let worker_id = worker.worker_id();
            if let Err(err) = worker.wait().await {
                error!(worker_id, error = %err, "poll worker failed");
                errors.push(err);
            }
        }

        info!(
            processed_rows = self.processed.get(),
            "all poll workers stopped"
        );

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(())
    }

    pub async fn shutdown_and_wait(&mut self) -> FeedResult<()> {
        self.shutdown();
        self.wait().await
    }
}
