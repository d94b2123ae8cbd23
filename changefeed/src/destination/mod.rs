//! Destinations receiving the rows read from the change feed.

mod base;
pub mod limited;
pub mod memory;

pub use base::*;
pub use limited::LimitedDestination;
pub use memory::MemoryDestination;
