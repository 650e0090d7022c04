use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::instrument;

use crate::domain::{
    Delta, EntityId, EntityUpdate, Project, Snapshot, SnapshotResponse, SyncCursor, SyncRequest,
    SyncResponse, TimeEntry, UpdateKind, User,
};
use crate::error::{PreconditionError, Result, SyncError};
use crate::pending::PendingTracker;
use crate::store::{LocalStore, StoreEventRx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    Authenticating,
    Synced,
    Syncing,
}

/// Identifies one in-flight sync round trip.
///
/// A response is only merged if the ticket it answers is still the current
/// one: same session epoch, same cursor it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncTicket {
    id: u64,
    epoch: u64,
    based_on: Option<SyncCursor>,
    sent: HashMap<EntityId, TimeEntry>,
}

impl SyncTicket {
    pub fn based_on(&self) -> Option<&SyncCursor> {
        self.based_on.as_ref()
    }

    /// Number of entries shipped with the request.
    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingSync {
    pub ticket: SyncTicket,
    pub request: SyncRequest,
}

/// What a merged sync response did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeReport {
    pub created: usize,
    pub changed: usize,
    pub deleted: usize,
    /// Entries edited locally while the request was in flight. They took the
    /// server id but kept their local fields and stay dirty.
    pub preserved: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied(MergeReport),
    /// The response answered a request from before a login/logout or an
    /// earlier cursor and was dropped without touching the store.
    Discarded,
}

/// Owns the local store and drives the login/sync protocol against it.
#[derive(Debug)]
pub struct SyncEngine {
    store: LocalStore,
    tracker: PendingTracker,
    cursor: Option<SyncCursor>,
    state: SessionState,
    state_before_login: SessionState,
    epoch: u64,
    next_ticket: u64,
    in_flight: Option<u64>,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            store: LocalStore::new(),
            tracker: PendingTracker::new(),
            cursor: None,
            state: SessionState::LoggedOut,
            state_before_login: SessionState::LoggedOut,
            epoch: 0,
            next_ticket: 0,
            in_flight: None,
        }
    }

    /// Rebuilds the engine from a persisted snapshot.
    pub fn restore(snapshot: Snapshot) -> Self {
        let cursor = snapshot.last_sync.clone();
        let store = LocalStore::from_snapshot(snapshot);
        let state = if store.user().is_some() {
            SessionState::Synced
        } else {
            SessionState::LoggedOut
        };

        Self {
            store,
            cursor,
            state,
            ..Self::new()
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            last_sync: self.cursor.clone(),
            ..self.store.to_snapshot()
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cursor(&self) -> Option<&SyncCursor> {
        self.cursor.as_ref()
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn subscribe(&mut self) -> StoreEventRx {
        self.store.subscribe()
    }

    pub fn is_sync_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    // ========================================================================
    // Login
    // ========================================================================

    pub fn begin_login(&mut self) -> Result<()> {
        match self.state {
            SessionState::Authenticating => Err(PreconditionError::LoginInProgress.into()),
            SessionState::Syncing => Err(PreconditionError::SyncInProgress.into()),
            SessionState::LoggedOut | SessionState::Synced => {
                self.state_before_login = self.state;
                self.state = SessionState::Authenticating;
                Ok(())
            }
        }
    }

    /// Returns to the state held before [`Self::begin_login`]. Nothing else changes.
    pub fn login_failed(&mut self) {
        if self.state == SessionState::Authenticating {
            self.state = self.state_before_login;
        }
    }

    /// Replaces the whole store with a snapshot and starts a new session.
    #[instrument(name = "SyncEngine::handle_login_response", skip_all)]
    pub fn handle_login_response(&mut self, response: SnapshotResponse) -> Result<()> {
        let (server_time, user, projects, time_entries) = match validate_snapshot(response) {
            Ok(parts) => parts,
            Err(err) => {
                self.login_failed();
                return Err(err);
            }
        };

        tracing::info!(
            user_id = user.id,
            projects = projects.len(),
            time_entries = time_entries.len(),
            "Applying login snapshot"
        );

        self.store.replace_all(Some(user), projects, time_entries);
        self.cursor = Some(SyncCursor::new(server_time));
        self.tracker = PendingTracker::new();
        self.start_new_epoch();
        self.state = SessionState::Synced;
        Ok(())
    }

    /// Forgets the session. Any response still in flight will be discarded.
    pub fn logout(&mut self) {
        self.store.clear();
        self.cursor = None;
        self.tracker = PendingTracker::new();
        self.start_new_epoch();
        self.state = SessionState::LoggedOut;
    }

    fn start_new_epoch(&mut self) {
        self.epoch += 1;
        self.in_flight = None;
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Everything the server has not acknowledged yet, plus the cursor.
    pub fn build_sync_request(&self) -> SyncRequest {
        SyncRequest {
            last_sync: self.cursor.clone().unwrap_or_default(),
            delta: Delta {
                time_entries: self.store.dirty_entries().into_iter().cloned().collect(),
            },
        }
    }

    /// Builds the request and latches the engine into [`SessionState::Syncing`]
    /// until the response is handled or the sync is cancelled.
    pub fn begin_sync(&mut self) -> Result<PendingSync> {
        match self.state {
            SessionState::LoggedOut => return Err(PreconditionError::NotLoggedIn.into()),
            SessionState::Authenticating => {
                return Err(PreconditionError::LoginInProgress.into())
            }
            SessionState::Syncing => return Err(PreconditionError::SyncInProgress.into()),
            SessionState::Synced => {}
        }

        let request = self.build_sync_request();
        self.next_ticket += 1;
        let ticket = SyncTicket {
            id: self.next_ticket,
            epoch: self.epoch,
            based_on: self.cursor.clone(),
            sent: request
                .delta
                .time_entries
                .iter()
                .map(|e| (e.id, e.clone()))
                .collect(),
        };

        tracing::debug!(
            ticket = ticket.id,
            dirty = request.delta.time_entries.len(),
            last_sync = %request.last_sync,
            "Built sync request"
        );

        self.in_flight = Some(ticket.id);
        self.state = SessionState::Syncing;
        Ok(PendingSync { ticket, request })
    }

    /// Releases the latch after a failed or abandoned sync. Dirty flags are
    /// untouched so the same changes go out on the next attempt.
    pub fn cancel_sync(&mut self, ticket: &SyncTicket) {
        if self.in_flight == Some(ticket.id) {
            self.in_flight = None;
            self.state = SessionState::Synced;
        }
    }

    fn is_current(&self, ticket: &SyncTicket) -> bool {
        ticket.epoch == self.epoch
            && self.in_flight == Some(ticket.id)
            && ticket.based_on == self.cursor
    }

    /// Merges a sync response into the store.
    ///
    /// The whole response is validated before anything is written, and the
    /// cursor only moves once every update has been applied.
    #[instrument(name = "SyncEngine::handle_sync_response", skip_all, fields(ticket = ticket.id))]
    pub fn handle_sync_response(
        &mut self,
        ticket: &SyncTicket,
        response: SyncResponse,
    ) -> Result<SyncOutcome> {
        if !self.is_current(ticket) {
            tracing::warn!("Dropping stale sync response");
            self.cancel_sync(ticket);
            return Ok(SyncOutcome::Discarded);
        }
        self.cancel_sync(ticket);

        validate_sync(&response)?;
        let server_time = response.server_time().map(str::to_string);
        let Some(payload) = response.payload else {
            return Err(SyncError::protocol("sync response has no payload"));
        };

        if let Some(update) = payload.user {
            self.apply_user_update(update);
        }
        for update in payload.projects {
            self.apply_project_update(update);
        }

        let mut report = MergeReport::default();
        for update in payload.time_entries {
            self.apply_time_entry_update(ticket, update, &mut report);
        }
        self.stop_superseded_running_entries();

        if let Some(server_time) = server_time {
            self.cursor = Some(SyncCursor::new(server_time));
        }

        tracing::info!(
            created = report.created,
            changed = report.changed,
            deleted = report.deleted,
            preserved = report.preserved,
            "Merged sync response"
        );
        Ok(SyncOutcome::Applied(report))
    }

    fn apply_user_update(&mut self, update: EntityUpdate<User>) {
        // Deleted and Unknown were rejected by validation.
        if matches!(update.kind, UpdateKind::Created | UpdateKind::Changed) {
            self.store.set_user(update.entity);
        }
    }

    fn apply_project_update(&mut self, update: EntityUpdate<Project>) {
        let target = update.target_id();
        match update.kind {
            UpdateKind::Created | UpdateKind::Changed => {
                if target != update.entity.id {
                    self.store.delete_project(target);
                }
                self.store.upsert_project(update.entity);
            }
            UpdateKind::Deleted => self.store.delete_project(target),
            UpdateKind::Unknown => {}
        }
    }

    fn apply_time_entry_update(
        &mut self,
        ticket: &SyncTicket,
        update: EntityUpdate<TimeEntry>,
        report: &mut MergeReport,
    ) {
        let target = update.target_id();
        match update.kind {
            UpdateKind::Created | UpdateKind::Changed => {
                let local = self
                    .store
                    .find(target)
                    .or_else(|| self.store.find(update.entity.id))
                    .cloned();

                let replacement = match local {
                    Some(local) if local.dirty && ticket.sent.get(&local.id) != Some(&local) => {
                        tracing::debug!(
                            local_id = local.id,
                            server_id = update.entity.id,
                            "Keeping local edit made while sync was in flight"
                        );
                        report.preserved += 1;
                        TimeEntry {
                            id: update.entity.id,
                            ..local
                        }
                    }
                    _ => TimeEntry {
                        dirty: false,
                        ..update.entity
                    },
                };

                self.store.delete_time_entry(target);
                self.store.upsert_time_entry(replacement);
                match update.kind {
                    UpdateKind::Created => report.created += 1,
                    _ => report.changed += 1,
                }
            }
            UpdateKind::Deleted => {
                self.store.delete_time_entry(target);
                report.deleted += 1;
            }
            UpdateKind::Unknown => {}
        }
    }

    /// The server can confirm a running entry while another one was started
    /// locally. The older one is stopped at the moment the newer one started.
    fn stop_superseded_running_entries(&mut self) {
        let mut running: Vec<TimeEntry> = self
            .store
            .list()
            .into_iter()
            .filter(|e| e.is_running() && !e.is_deleted())
            .cloned()
            .collect();
        if running.len() < 2 {
            return;
        }

        running.sort_by(|a, b| b.start.cmp(&a.start).then(a.id.cmp(&b.id)));
        let newest_start = running[0].start;
        for older in running.into_iter().skip(1) {
            tracing::warn!(id = older.id, "Stopping superseded running entry");
            self.store
                .upsert_time_entry(PendingTracker::stop_entry(&older, newest_start));
        }
    }

    // ========================================================================
    // Local edits
    // ========================================================================

    /// Starts a running entry in the user's default workspace.
    pub fn start_entry(
        &mut self,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<TimeEntry> {
        let user = self.store.user().ok_or(PreconditionError::NotLoggedIn)?;
        let workspace_id = user
            .default_workspace_id
            .ok_or(PreconditionError::NoDefaultWorkspace)?;
        self.start_entry_in(workspace_id, description, now)
    }

    pub fn start_entry_in(
        &mut self,
        workspace_id: EntityId,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<TimeEntry> {
        let entry = self
            .tracker
            .start_new_entry(&self.store, workspace_id, description, now)?;
        self.store.upsert_time_entry(entry.clone());
        Ok(entry)
    }

    pub fn stop_running(&mut self, now: OffsetDateTime) -> Option<TimeEntry> {
        let id = self.store.running()?.id;
        self.stop_entry(id, now)
    }

    /// Stops the entry if it is running. Unknown or stopped entries are left alone.
    pub fn stop_entry(&mut self, id: EntityId, now: OffsetDateTime) -> Option<TimeEntry> {
        let entry = self.store.find(id).filter(|e| e.is_running())?;
        let stopped = PendingTracker::stop_entry(entry, now);
        self.store.upsert_time_entry(stopped.clone());
        Some(stopped)
    }

    pub fn edit_description(
        &mut self,
        id: EntityId,
        text: &str,
        now: OffsetDateTime,
    ) -> Option<TimeEntry> {
        let edited = PendingTracker::edit_description(self.store.find(id)?, text, now);
        self.store.upsert_time_entry(edited.clone());
        Some(edited)
    }

    pub fn edit_project(&mut self, id: EntityId, project_id: Option<EntityId>) -> Option<TimeEntry> {
        let edited = PendingTracker::edit_project(self.store.find(id)?, project_id);
        self.store.upsert_time_entry(edited.clone());
        Some(edited)
    }

    pub fn delete_entry(&mut self, id: EntityId, now: OffsetDateTime) -> Option<TimeEntry> {
        let deleted = PendingTracker::mark_deleted(self.store.find(id)?, now);
        self.store.upsert_time_entry(deleted.clone());
        Some(deleted)
    }

    /// Stops whatever is running and starts a new entry with the description
    /// and project of `id`.
    pub fn continue_entry(&mut self, id: EntityId, now: OffsetDateTime) -> Result<Option<TimeEntry>> {
        let Some(template) = self.store.find(id).cloned() else {
            return Ok(None);
        };

        self.stop_running(now);
        let started =
            self.start_entry_in(template.workspace_id, Some(&template.description), now)?;
        if template.project_id.is_none() {
            return Ok(Some(started));
        }
        Ok(self.edit_project(started.id, template.project_id))
    }

    /// Throws away every entry the server never confirmed.
    pub fn discard_unconfirmed(&mut self) -> usize {
        let ids = PendingTracker::unconfirmed_ids(&self.store);
        for id in &ids {
            self.store.delete_time_entry(*id);
        }
        ids.len()
    }
}

fn validate_snapshot(
    response: SnapshotResponse,
) -> Result<(String, User, Vec<Project>, Vec<TimeEntry>)> {
    let server_time = response
        .meta
        .and_then(|m| m.utc_server_time)
        .ok_or_else(|| SyncError::protocol("snapshot response has no utc_server_time"))?;
    let payload = response
        .payload
        .ok_or_else(|| SyncError::protocol("snapshot response has no payload"))?;
    let user = payload
        .user
        .ok_or_else(|| SyncError::protocol("snapshot response has no user"))?;

    Ok((server_time, user, payload.projects, payload.time_entries))
}

fn validate_sync(response: &SyncResponse) -> Result<()> {
    let payload = response
        .payload
        .as_ref()
        .ok_or_else(|| SyncError::protocol("sync response has no payload"))?;

    if let Some(update) = &payload.user {
        if !matches!(update.kind, UpdateKind::Created | UpdateKind::Changed) {
            return Err(SyncError::protocol(format!(
                "unsupported user update {:?}",
                update.kind
            )));
        }
    }

    if let Some(update) = payload
        .projects
        .iter()
        .find(|u| u.kind == UpdateKind::Unknown)
    {
        return Err(SyncError::protocol(format!(
            "unknown update kind for project {}",
            update.entity.id
        )));
    }

    for update in &payload.time_entries {
        match update.kind {
            UpdateKind::Unknown => {
                return Err(SyncError::protocol(format!(
                    "unknown update kind for time entry {}",
                    update.entity.id
                )))
            }
            UpdateKind::Created | UpdateKind::Changed
                if PendingTracker::is_unconfirmed(update.entity.id) =>
            {
                return Err(SyncError::protocol(format!(
                    "server returned unconfirmed id {} for time entry",
                    update.entity.id
                )))
            }
            _ => {}
        }
    }

    Ok(())
}
