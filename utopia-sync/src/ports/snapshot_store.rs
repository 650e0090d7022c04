use async_trait::async_trait;

use crate::domain::Snapshot;
use crate::error::SyncError;

/// Persists the engine's state between runs.
///
/// The engine never calls this itself; the application saves on exit and
/// loads on start.
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), SyncError>;

    /// `None` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<Snapshot>, SyncError>;

    /// Removes everything saved. Used on logout.
    async fn clear(&self) -> Result<(), SyncError>;
}
