use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Identifier of a user, project or time entry.
///
/// Time entries created on this device carry a negative id until the server
/// confirms them; see [`crate::PendingTracker`].
pub type EntityId = i64;

/// Anything the server can address by id.
pub trait Entity {
    fn id(&self) -> EntityId;
}

/// The logged-in user. Its absence means the session is logged out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub api_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub fullname: String,
    pub id: EntityId,
    #[serde(default)]
    pub default_workspace_id: Option<EntityId>,
}

/// A project owned by the server. The client never creates or edits these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: EntityId,
    pub name: String,
    /// Hex color, e.g. `#06aaf5`.
    pub color: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: EntityId,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    /// Last modification time.
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub description: String,
    /// Seconds. `None` while the entry is running.
    pub duration: Option<i64>,
    #[serde(default)]
    pub project_id: Option<EntityId>,
    pub workspace_id: EntityId,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub server_deleted_at: Option<OffsetDateTime>,
    /// Local changes not yet acknowledged by the server.
    #[serde(default)]
    pub dirty: bool,
}

impl TimeEntry {
    pub fn is_running(&self) -> bool {
        self.duration.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.server_deleted_at.is_some()
    }
}

impl Entity for User {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl Entity for Project {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl Entity for TimeEntry {
    fn id(&self) -> EntityId {
        self.id
    }
}
