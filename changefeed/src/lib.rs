//! Partitioned change feed consumer.
//!
//! A change stream is split into independent feed ranges. The [`supervisor::Supervisor`]
//! initializes a checkpoint for every range, spreads the ranges across a fixed pool of
//! [`workers::poll::PollWorker`]s, and coordinates their shutdown. Workers drain their ranges
//! round robin, hand every row to a [`processor::RowProcessor`], optionally forward rows to a
//! [`destination::Destination`], and checkpoint each page once it is fully drained, which makes
//! delivery at least once across restarts.

pub mod concurrency;
pub mod destination;
pub mod distributor;
pub mod error;
mod macros;
pub mod metrics;
pub mod processor;
pub mod registry;
pub mod source;
pub mod store;
pub mod supervisor;
#[cfg(feature = "test-utils")]
pub mod test_utils;
pub mod types;
pub mod workers;
