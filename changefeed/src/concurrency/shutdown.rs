use std::time::Duration;
use tokio::sync::watch;

use crate::concurrency::signal::{SignalRx, SignalTx, create_signal};

/// Broadcasts the shutdown signal to every subscribed worker.
#[derive(Debug, Clone)]
pub struct ShutdownTx(SignalTx);

impl ShutdownTx {
    pub fn wrap(tx: SignalTx) -> Self {
        Self(tx)
    }

    /// Signals shutdown. Calling it more than once is harmless.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

pub type ShutdownRx = SignalRx;

/// Outcome of an operation that can be interrupted by shutdown.
pub enum ShutdownResult<T, I> {
    Ok(T),
    Shutdown(I),
}

impl<T, I> ShutdownResult<T, I> {
    pub fn should_shutdown(&self) -> bool {
        matches!(self, ShutdownResult::Shutdown(_))
    }
}

pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = create_signal();
    (ShutdownTx::wrap(tx), rx)
}

/// Returns `true` once shutdown was signaled on `shutdown_rx`.
///
/// A dropped sender counts as shutdown, since no one is left to keep the worker running.
pub fn is_shutdown_requested(shutdown_rx: &ShutdownRx) -> bool {
    shutdown_rx.has_changed().unwrap_or(true)
}

/// Sleeps for `duration` unless shutdown is signaled first.
pub async fn sleep_or_shutdown(
    duration: Duration,
    shutdown_rx: &mut ShutdownRx,
) -> ShutdownResult<(), ()> {
    if is_shutdown_requested(shutdown_rx) {
        return ShutdownResult::Shutdown(());
    }

    tokio::select! {
        biased;

        _ = shutdown_rx.changed() => ShutdownResult::Shutdown(()),
        _ = tokio::time::sleep(duration) => ShutdownResult::Ok(()),
    }
}
