use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::{io::Write, os::unix::fs::OpenOptionsExt};
use utopia_sync::domain::{Snapshot, SyncCursor, User};
use utopia_sync::ports::SnapshotStore;
use utopia_sync::SyncError;

const USER_KEY: &str = "user";
const PROJECTS_KEY: &str = "projects";
const TIME_ENTRIES_KEY: &str = "time_entries";
const LAST_SYNC_KEY: &str = "last_sync";
const KEYS: [&str; 4] = [USER_KEY, PROJECTS_KEY, TIME_ENTRIES_KEY, LAST_SYNC_KEY];

/// Keeps the snapshot as one JSON document per key under a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

fn persistence(action: &str, path: &Path, err: impl std::fmt::Display) -> SyncError {
    SyncError::persistence(format!("Failed to {action} {}: {err}", path.display()))
}

pub(crate) fn secure_write(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");

    #[cfg(unix)]
    {
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp)?
            .write_all(content.as_bytes())?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(&tmp, content)?;
    }

    std::fs::rename(&tmp, path)
}

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SyncError> {
        let path = self.path(key);
        let raw = serde_json::to_string_pretty(value)
            .map_err(|e| persistence("serialize", &path, e))?;
        secure_write(&path, &raw).map_err(|e| persistence("write", &path, e))
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SyncError> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| persistence("read", &path, e))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| persistence("parse", &path, e))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), SyncError> {
        self.write(USER_KEY, &snapshot.user)?;
        self.write(PROJECTS_KEY, &snapshot.projects)?;
        self.write(TIME_ENTRIES_KEY, &snapshot.time_entries)?;
        self.write(LAST_SYNC_KEY, &snapshot.last_sync)?;
        tracing::debug!(
            dir = %self.root.display(),
            time_entries = snapshot.time_entries.len(),
            "Saved snapshot"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<Snapshot>, SyncError> {
        if KEYS.iter().all(|key| !self.path(key).exists()) {
            return Ok(None);
        }

        let snapshot = Snapshot {
            user: self.read::<Option<User>>(USER_KEY)?.flatten(),
            projects: self.read(PROJECTS_KEY)?.unwrap_or_default(),
            time_entries: self.read(TIME_ENTRIES_KEY)?.unwrap_or_default(),
            last_sync: self.read::<Option<SyncCursor>>(LAST_SYNC_KEY)?.flatten(),
        };
        tracing::debug!(
            dir = %self.root.display(),
            time_entries = snapshot.time_entries.len(),
            "Loaded snapshot"
        );
        Ok(Some(snapshot))
    }

    async fn clear(&self) -> Result<(), SyncError> {
        for key in KEYS {
            let path = self.path(key);
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| persistence("remove", &path, e))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use utopia_sync::domain::{Project, TimeEntry};

    fn snapshot() -> Snapshot {
        let at = datetime!(2020-01-06 09:00 UTC);
        Snapshot {
            user: Some(User {
                api_token: "token".to_string(),
                at,
                fullname: "Ada".to_string(),
                id: 1,
                default_workspace_id: Some(7),
            }),
            projects: vec![Project {
                id: 3,
                name: "Utopia".to_string(),
                color: "#06aaf5".to_string(),
                active: true,
            }],
            time_entries: vec![TimeEntry {
                id: -1,
                start: at,
                at,
                description: "offline".to_string(),
                duration: None,
                project_id: Some(3),
                workspace_id: 7,
                server_deleted_at: None,
                dirty: true,
            }],
            last_sync: Some(SyncCursor::new("2020-01-06T08:00:00Z")),
        }
    }

    #[tokio::test]
    async fn empty_directory_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("state"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load_keeps_dirty_flags() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());

        store.save(&snapshot()).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(snapshot()));
        for key in KEYS {
            assert!(dir.path().join(format!("{key}.json")).exists(), "{key}");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        store.save(&snapshot()).await.unwrap();

        let mode = std::fs::metadata(dir.path().join("user.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        store.save(&snapshot()).await.unwrap();

        store.clear().await.unwrap();

        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        std::fs::write(dir.path().join("time_entries.json"), "{not json").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, SyncError::Persistence(_)));
    }
}
