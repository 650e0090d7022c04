use std::fmt;

use serde::{Deserialize, Serialize};

use super::{EntityUpdate, Project, TimeEntry, User};

/// Opaque server token marking how much server history the client has seen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCursor(String);

impl SyncCursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub utc_server_time: Option<String>,
}

impl Meta {
    pub fn at(server_time: impl Into<String>) -> Self {
        Self {
            utc_server_time: Some(server_time.into()),
        }
    }
}

/// Body of the login (`/current-snapshot`) response.
///
/// Fields are optional on the wire so that a response missing them reaches
/// the engine and is rejected as a protocol error instead of failing deep
/// inside a transport adapter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotResponse {
    #[serde(default)]
    pub meta: Option<Meta>,
    #[serde(default)]
    pub payload: Option<SnapshotPayload>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotPayload {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub time_entries: Vec<TimeEntry>,
}

impl SnapshotResponse {
    pub fn new(
        server_time: impl Into<String>,
        user: User,
        projects: Vec<Project>,
        time_entries: Vec<TimeEntry>,
    ) -> Self {
        Self {
            meta: Some(Meta::at(server_time)),
            payload: Some(SnapshotPayload {
                user: Some(user),
                projects,
                time_entries,
            }),
        }
    }
}

/// Body of the `/sync` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub meta: Option<Meta>,
    #[serde(default)]
    pub payload: Option<SyncPayload>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncPayload {
    #[serde(default)]
    pub user: Option<EntityUpdate<User>>,
    #[serde(default)]
    pub projects: Vec<EntityUpdate<Project>>,
    #[serde(default)]
    pub time_entries: Vec<EntityUpdate<TimeEntry>>,
}

impl SyncResponse {
    pub fn new(server_time: impl Into<String>, time_entries: Vec<EntityUpdate<TimeEntry>>) -> Self {
        Self {
            meta: Some(Meta::at(server_time)),
            payload: Some(SyncPayload {
                user: None,
                projects: vec![],
                time_entries,
            }),
        }
    }

    pub fn server_time(&self) -> Option<&str> {
        self.meta.as_ref()?.utc_server_time.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Delta {
    pub time_entries: Vec<TimeEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub last_sync: SyncCursor,
    pub delta: Delta,
}

/// Everything the client needs to resume after a restart.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub user: Option<User>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub time_entries: Vec<TimeEntry>,
    #[serde(default)]
    pub last_sync: Option<SyncCursor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_request_wire_shape() {
        let request = SyncRequest {
            last_sync: SyncCursor::new("2020-01-06T09:00:00Z"),
            delta: Delta::default(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "last_sync": "2020-01-06T09:00:00Z",
                "delta": { "time_entries": [] }
            })
        );
    }

    #[test]
    fn sync_response_without_user_or_projects_decodes() {
        let raw = r#"{"meta": {"utc_server_time": "T2"}, "payload": {"time_entries": []}}"#;
        let response: SyncResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.server_time(), Some("T2"));
        let payload = response.payload.unwrap();
        assert!(payload.user.is_none());
        assert!(payload.projects.is_empty());
    }

    #[test]
    fn missing_payload_still_decodes() {
        let response: SyncResponse = serde_json::from_str(r#"{"meta": {}}"#).unwrap();
        assert!(response.payload.is_none());
        assert_eq!(response.server_time(), None);
    }
}
