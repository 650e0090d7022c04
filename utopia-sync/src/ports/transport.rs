use async_trait::async_trait;

use crate::domain::{SnapshotResponse, SyncRequest, SyncResponse};
use crate::error::TransportError;
use crate::Credentials;

/// Performs the two network calls of the protocol.
///
/// Implementations report network and HTTP failures as-is and never retry;
/// retrying is the caller's decision.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Fetches the full server state for the given credentials.
    async fn login(&self, credentials: &Credentials) -> Result<SnapshotResponse, TransportError>;

    /// Sends the local delta and receives the server's changes since
    /// `request.last_sync`.
    async fn sync(
        &self,
        credentials: &Credentials,
        request: &SyncRequest,
    ) -> Result<SyncResponse, TransportError>;
}
