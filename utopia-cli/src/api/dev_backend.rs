use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::{Duration, OffsetDateTime};
use utopia_sync::domain::{
    EntityId, EntityUpdate, Project, SnapshotResponse, SyncRequest, SyncResponse, TimeEntry, User,
};
use utopia_sync::ports::Transport;
use utopia_sync::{Credentials, TransportError};

use crate::session_store::secure_write;

const DEV_TOKEN: &str = "dev-token";
const CURSOR_PREFIX: &str = "dev-rev-";

/// In-memory stand-in for the sync server.
///
/// Assigns positive ids to created entries, keeps the newer of two versions
/// of an entry and answers a sync with everything changed since the cursor.
/// When opened with a path the state survives between runs.
#[derive(Debug, Clone)]
pub struct DevBackend {
    state: Arc<Mutex<ServerState>>,
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerState {
    revision: u64,
    next_id: EntityId,
    user: User,
    projects: Vec<Project>,
    entries: BTreeMap<EntityId, TimeEntry>,
    /// Revision at which each entry last changed, deleted ones included.
    touched: BTreeMap<EntityId, u64>,
}

impl ServerState {
    fn cursor(&self) -> String {
        format!("{CURSOR_PREFIX}{}", self.revision)
    }

    fn bump(&mut self, id: EntityId) {
        self.revision += 1;
        self.touched.insert(id, self.revision);
    }

    fn create(&mut self, entry: TimeEntry) -> TimeEntry {
        let id = self.next_id;
        self.next_id += 1;
        let stored = TimeEntry {
            id,
            dirty: false,
            ..entry
        };
        self.entries.insert(id, stored.clone());
        self.bump(id);
        stored
    }

    /// Keeps whichever version was edited last.
    fn prefer_newer(&mut self, incoming: TimeEntry) -> TimeEntry {
        let incoming = TimeEntry {
            dirty: false,
            ..incoming
        };
        match self.entries.get(&incoming.id) {
            Some(existing) if existing.at > incoming.at => existing.clone(),
            _ => {
                self.entries.insert(incoming.id, incoming.clone());
                self.bump(incoming.id);
                incoming
            }
        }
    }

    fn delete(&mut self, entry: TimeEntry) -> TimeEntry {
        let deleted = TimeEntry {
            dirty: false,
            ..entry
        };
        self.entries.remove(&deleted.id);
        self.bump(deleted.id);
        deleted
    }

    fn apply(&mut self, entry: TimeEntry) -> EntityUpdate<TimeEntry> {
        if entry.id < 0 {
            let client_id = entry.id;
            if entry.is_deleted() {
                // Never reached the server, nothing to keep.
                return EntityUpdate::deleted(TimeEntry {
                    dirty: false,
                    ..entry
                });
            }
            return EntityUpdate::created(client_id, self.create(entry));
        }
        if entry.is_deleted() {
            return EntityUpdate::deleted(self.delete(entry));
        }
        EntityUpdate::changed(self.prefer_newer(entry))
    }

    fn changed_since(&self, revision: u64, skip: &HashSet<EntityId>) -> Vec<EntityUpdate<TimeEntry>> {
        self.touched
            .iter()
            .filter(|(id, rev)| **rev > revision && !skip.contains(id))
            .map(|(id, _)| match self.entries.get(id) {
                Some(entry) => EntityUpdate::changed(entry.clone()),
                None => EntityUpdate::deleted(tombstone(*id, self.user.default_workspace_id)),
            })
            .collect()
    }
}

/// Deleted updates only need the id to be meaningful.
fn tombstone(id: EntityId, workspace_id: Option<EntityId>) -> TimeEntry {
    TimeEntry {
        id,
        start: OffsetDateTime::UNIX_EPOCH,
        at: OffsetDateTime::UNIX_EPOCH,
        description: String::new(),
        duration: Some(0),
        project_id: None,
        workspace_id: workspace_id.unwrap_or_default(),
        server_deleted_at: Some(OffsetDateTime::UNIX_EPOCH),
        dirty: false,
    }
}

fn parse_cursor(cursor: &str) -> u64 {
    cursor
        .strip_prefix(CURSOR_PREFIX)
        .and_then(|rev| rev.parse().ok())
        .unwrap_or(0)
}

impl DevBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(seed_dev_state())),
            path: None,
        }
    }

    /// Loads the simulated server from `path`, seeding it on first use.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut backend = Self::new();
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            backend.state = Arc::new(Mutex::new(serde_json::from_str(&raw)?));
        }
        backend.path = Some(path);
        Ok(backend)
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &ServerState) -> Result<(), TransportError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_string_pretty(state).map_err(|e| {
            tracing::error!("Failed to serialize dev backend state: {}", e);
            TransportError::Status(500)
        })?;
        secure_write(path, &raw).map_err(|e| {
            tracing::error!("Failed to write dev backend state: {}", e);
            TransportError::Status(500)
        })
    }

    fn authorize(&self, credentials: &Credentials) -> Result<(), TransportError> {
        let ok = match credentials {
            Credentials::UsernamePassword { username, password } => {
                !username.is_empty() && !password.is_empty()
            }
            Credentials::Token(token) => token == DEV_TOKEN,
        };
        if ok {
            Ok(())
        } else {
            Err(TransportError::Unauthorized)
        }
    }
}

impl Default for DevBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for DevBackend {
    async fn login(&self, credentials: &Credentials) -> Result<SnapshotResponse, TransportError> {
        self.authorize(credentials)?;
        let state = self.lock();
        Ok(SnapshotResponse::new(
            state.cursor(),
            state.user.clone(),
            state.projects.clone(),
            state.entries.values().cloned().collect(),
        ))
    }

    async fn sync(
        &self,
        credentials: &Credentials,
        request: &SyncRequest,
    ) -> Result<SyncResponse, TransportError> {
        self.authorize(credentials)?;
        let mut state = self.lock();
        let since = parse_cursor(request.last_sync.as_str());

        let mut answered = HashSet::new();
        let mut updates = Vec::with_capacity(request.delta.time_entries.len());
        for entry in &request.delta.time_entries {
            let update = state.apply(entry.clone());
            answered.insert(update.entity.id);
            updates.push(update);
        }
        let mut changed = state.changed_since(since, &answered);
        changed.append(&mut updates);

        self.persist(&state)?;
        tracing::debug!(
            since,
            revision = state.revision,
            updates = changed.len(),
            "Dev backend answered sync"
        );
        Ok(SyncResponse::new(state.cursor(), changed))
    }
}

fn seed_dev_state() -> ServerState {
    let now = OffsetDateTime::now_utc();
    let yesterday = now - Duration::days(1);
    let user = User {
        api_token: DEV_TOKEN.to_string(),
        at: now,
        fullname: "Dev User".to_string(),
        id: 1,
        default_workspace_id: Some(1),
    };
    let projects = vec![
        Project {
            id: 1,
            name: "Utopia".to_string(),
            color: "#06aaf5".to_string(),
            active: true,
        },
        Project {
            id: 2,
            name: "Internal".to_string(),
            color: "#c56bff".to_string(),
            active: true,
        },
    ];
    let entries = [
        (yesterday, "Standup", Some(1), 15 * 60),
        (yesterday + Duration::hours(1), "Sync engine", Some(1), 3 * 3600),
        (yesterday + Duration::hours(5), "Planning", Some(2), 45 * 60),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, (start, description, project_id, duration))| {
        let id = i as EntityId + 1;
        (
            id,
            TimeEntry {
                id,
                start,
                at: start + Duration::seconds(duration),
                description: description.to_string(),
                duration: Some(duration),
                project_id,
                workspace_id: 1,
                server_deleted_at: None,
                dirty: false,
            },
        )
    })
    .collect::<BTreeMap<_, _>>();

    ServerState {
        revision: 1,
        next_id: entries.len() as EntityId + 1,
        user,
        projects,
        touched: BTreeMap::new(),
        entries,
    }
}
