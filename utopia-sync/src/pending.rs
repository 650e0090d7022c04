use time::OffsetDateTime;

use crate::clock;
use crate::domain::{EntityId, TimeEntry};
use crate::error::PreconditionError;
use crate::store::LocalStore;

/// Decides the id and dirty flag of entries produced by local edits.
///
/// Entries created on this device get negative ids (-1, -2, ...) until the
/// server confirms them. This is the only place that knows about the sign
/// convention; the store and the transport treat ids as opaque.
#[derive(Debug, Default)]
pub struct PendingTracker {
    lowest_issued: EntityId,
}

impl PendingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` was assigned locally and not yet confirmed by the server.
    pub fn is_unconfirmed(id: EntityId) -> bool {
        id < 0
    }

    /// Next free local id. Ids handed out earlier in this session are never
    /// reused, even once the server has renamed them.
    pub fn next_local_id(&self, store: &LocalStore) -> EntityId {
        let lowest_in_store = store.min_id().unwrap_or(0).min(0);
        lowest_in_store.min(self.lowest_issued) - 1
    }

    /// Creates a running entry. Fails while another entry is still running.
    pub fn start_new_entry(
        &mut self,
        store: &LocalStore,
        workspace_id: EntityId,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<TimeEntry, PreconditionError> {
        if let Some(running) = store.running() {
            return Err(PreconditionError::AlreadyRunning(running.id));
        }

        let id = self.next_local_id(store);
        self.lowest_issued = id;

        Ok(TimeEntry {
            id,
            start: now,
            at: now,
            description: description.unwrap_or_default().to_string(),
            duration: None,
            project_id: None,
            workspace_id,
            server_deleted_at: None,
            dirty: true,
        })
    }

    pub fn stop_entry(entry: &TimeEntry, now: OffsetDateTime) -> TimeEntry {
        TimeEntry {
            duration: Some(clock::elapsed_seconds(entry.start, now)),
            at: now,
            dirty: true,
            ..entry.clone()
        }
    }

    pub fn edit_description(entry: &TimeEntry, text: &str, now: OffsetDateTime) -> TimeEntry {
        TimeEntry {
            description: text.to_string(),
            at: now,
            dirty: true,
            ..entry.clone()
        }
    }

    pub fn edit_project(entry: &TimeEntry, project_id: Option<EntityId>) -> TimeEntry {
        TimeEntry {
            project_id,
            dirty: true,
            ..entry.clone()
        }
    }

    /// Flags the entry for deletion on the next sync. It stays in the store
    /// until the server answers with a `Deleted` update. A running entry is
    /// stopped at `now` so it no longer blocks starting a new one.
    pub fn mark_deleted(entry: &TimeEntry, now: OffsetDateTime) -> TimeEntry {
        TimeEntry {
            duration: entry
                .duration
                .or_else(|| Some(clock::elapsed_seconds(entry.start, now))),
            server_deleted_at: Some(now),
            at: now,
            dirty: true,
            ..entry.clone()
        }
    }

    /// Ids of every entry the server has not confirmed yet.
    pub fn unconfirmed_ids(store: &LocalStore) -> Vec<EntityId> {
        store
            .list()
            .into_iter()
            .map(|e| e.id)
            .filter(|id| Self::is_unconfirmed(*id))
            .collect()
    }
}
