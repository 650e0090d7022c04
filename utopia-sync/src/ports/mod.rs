//! Outbound ports: the engine's only view of the network and of storage.

pub mod mock;
mod snapshot_store;
mod transport;

pub use snapshot_store::*;
pub use transport::*;
