//! Change feed sources.
//!
//! [`ChangeFeedSource`] abstracts the paged query API of the change stream. [`MemorySource`]
//! keeps the stream in process and supports fault injection.

mod base;
pub mod memory;

pub use base::*;
pub use memory::MemorySource;
