//! Concurrency primitives shared by the supervisor and its workers.
//!
//! Contains the shutdown signal broadcast to every worker, cancellable sleeps, and the atomic
//! counter of processed rows.

pub mod counter;
pub mod shutdown;
pub mod signal;
