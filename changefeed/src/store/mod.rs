//! Checkpoint persistence.
//!
//! [`CheckpointStore`] owns the per-target initialization protocol and the in-memory view of
//! every range's resume token. Durable storage is delegated to a [`backend::CheckpointBackend`].

pub mod backend;
mod checkpoint;

pub use checkpoint::*;
