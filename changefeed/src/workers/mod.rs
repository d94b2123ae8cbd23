//! Workers consuming feed ranges.
//!
//! Each poll worker owns a fixed set of ranges and drains them round robin until shutdown.

pub mod base;
pub mod poll;
