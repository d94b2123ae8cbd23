use std::future::Future;

use crate::error::FeedResult;

/// A trait for types that can be started as workers.
///
/// `H` is the handle returned once the worker runs, `S` the state observable through it.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    type Error;

    /// Starts the worker and returns a handle to monitor and await it.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// A handle to a running worker that provides access to its state and completion status.
pub trait WorkerHandle<S> {
    /// Returns the current state of the worker.
    ///
    /// The state outlives the worker, so it keeps reporting the last observed values once the
    /// worker stopped.
    fn state(&self) -> S;

    /// Returns a future that resolves when the worker completes.
    ///
    /// Resolves to the worker's fatal error, or to a [`crate::error::ErrorKind::WorkerPanic`]
    /// error if the worker panicked.
    fn wait(self) -> impl Future<Output = FeedResult<()>> + Send;
}
