mod base;
mod configured;
pub mod memory;
pub mod postgres;

pub use base::*;
pub use configured::ConfiguredCheckpointBackend;
pub use memory::{CheckpointWrite, MemoryCheckpointBackend};
pub use postgres::PostgresCheckpointBackend;
