//! Core data types of a change feed: ranges, resume tokens, checkpoints, and rows.

mod range;
mod row;
mod token;

pub use range::*;
pub use row::*;
pub use token::*;

pub use changefeed_config::shared::StartPosition;
