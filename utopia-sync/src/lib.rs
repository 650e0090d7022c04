//! Local-first synchronization engine for the Utopia time tracking client.
//!
//! Local edits are recorded against a [`LocalStore`] with client-assigned
//! (negative) ids and a dirty flag, shipped to the server as a delta, and
//! reconciled with the server's answer by the [`SyncEngine`].

pub mod clock;
mod credentials;
pub mod domain;
mod engine;
mod error;
mod pending;
pub mod ports;
mod session;
mod store;

pub use credentials::*;
pub use engine::*;
pub use error::*;
pub use pending::*;
pub use session::*;
pub use store::*;
