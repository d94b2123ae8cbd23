mod base;
mod batch;
mod checkpoint_store;
mod connection;
mod consumer;
mod feed;

pub use base::*;
pub use batch::*;
pub use checkpoint_store::*;
pub use connection::*;
pub use consumer::*;
pub use feed::*;
