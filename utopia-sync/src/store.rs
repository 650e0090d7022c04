use std::collections::BTreeMap;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::domain::{EntityId, Project, Snapshot, TimeEntry, User};

/// Emitted to subscribers after every store mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Replaced,
    Upserted(EntityId),
    Removed(EntityId),
    ProjectsChanged,
    UserChanged,
    Cleared,
}

pub type StoreEventRx = UnboundedReceiver<StoreEvent>;

/// In-memory copy of everything the user sees.
///
/// Time entries are keyed by id, so no two entries can share one.
#[derive(Debug, Default)]
pub struct LocalStore {
    user: Option<User>,
    projects: BTreeMap<EntityId, Project>,
    time_entries: BTreeMap<EntityId, TimeEntry>,
    subscribers: Vec<UnboundedSender<StoreEvent>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut store = Self::new();
        store.replace_all(snapshot.user, snapshot.projects, snapshot.time_entries);
        store
    }

    /// Receives a [`StoreEvent`] for every mutation from now on.
    pub fn subscribe(&mut self) -> StoreEventRx {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self, event: StoreEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Swaps every collection at once. Only used when ingesting a full snapshot.
    pub fn replace_all(
        &mut self,
        user: Option<User>,
        projects: Vec<Project>,
        time_entries: Vec<TimeEntry>,
    ) {
        self.user = user;
        self.projects = projects.into_iter().map(|p| (p.id, p)).collect();
        self.time_entries = time_entries.into_iter().map(|e| (e.id, e)).collect();
        self.notify(StoreEvent::Replaced);
    }

    /// Drops everything, including the user. Used on logout.
    pub fn clear(&mut self) {
        self.user = None;
        self.projects.clear();
        self.time_entries.clear();
        self.notify(StoreEvent::Cleared);
    }

    /// Replaces any entry with the same id, then inserts `entry`.
    pub fn upsert_time_entry(&mut self, entry: TimeEntry) {
        let id = entry.id;
        self.time_entries.insert(id, entry);
        self.notify(StoreEvent::Upserted(id));
    }

    /// Removes the entry if present. Deleting an unknown id is a no-op.
    pub fn delete_time_entry(&mut self, id: EntityId) -> Option<TimeEntry> {
        let removed = self.time_entries.remove(&id);
        if removed.is_some() {
            self.notify(StoreEvent::Removed(id));
        }
        removed
    }

    pub fn find(&self, id: EntityId) -> Option<&TimeEntry> {
        self.time_entries.get(&id)
    }

    /// All entries, deleted-but-unsynced ones included, in id order.
    pub fn list(&self) -> Vec<&TimeEntry> {
        self.time_entries.values().collect()
    }

    /// Entries the user should see, newest start first.
    pub fn visible(&self) -> Vec<&TimeEntry> {
        let mut entries: Vec<_> = self
            .time_entries
            .values()
            .filter(|e| !e.is_deleted())
            .collect();
        entries.sort_by(|a, b| b.start.cmp(&a.start).then(a.id.cmp(&b.id)));
        entries
    }

    pub fn running(&self) -> Option<&TimeEntry> {
        self.time_entries
            .values()
            .find(|e| e.is_running() && !e.is_deleted())
    }

    pub fn dirty_entries(&self) -> Vec<&TimeEntry> {
        self.time_entries.values().filter(|e| e.dirty).collect()
    }

    pub fn min_id(&self) -> Option<EntityId> {
        self.time_entries.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.time_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_entries.is_empty()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: User) {
        self.user = Some(user);
        self.notify(StoreEvent::UserChanged);
    }

    pub fn projects(&self) -> Vec<&Project> {
        self.projects.values().collect()
    }

    pub fn project(&self, id: EntityId) -> Option<&Project> {
        self.projects.get(&id)
    }

    pub fn upsert_project(&mut self, project: Project) {
        self.projects.insert(project.id, project);
        self.notify(StoreEvent::ProjectsChanged);
    }

    pub fn delete_project(&mut self, id: EntityId) {
        if self.projects.remove(&id).is_some() {
            self.notify(StoreEvent::ProjectsChanged);
        }
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            user: self.user.clone(),
            projects: self.projects.values().cloned().collect(),
            time_entries: self.time_entries.values().cloned().collect(),
            last_sync: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn entry(id: EntityId, duration: Option<i64>) -> TimeEntry {
        TimeEntry {
            id,
            start: datetime!(2020-01-06 09:00 UTC),
            at: datetime!(2020-01-06 09:00 UTC),
            description: format!("entry {id}"),
            duration,
            project_id: None,
            workspace_id: 1,
            server_deleted_at: None,
            dirty: false,
        }
    }

    #[test]
    fn upsert_twice_keeps_latest_value() {
        let mut store = LocalStore::new();
        store.upsert_time_entry(entry(10, Some(60)));
        let newer = TimeEntry {
            description: "renamed".to_string(),
            ..entry(10, Some(60))
        };
        store.upsert_time_entry(newer.clone());
        store.upsert_time_entry(newer.clone());

        assert_eq!(store.len(), 1);
        assert_eq!(store.find(10), Some(&newer));
    }

    #[test]
    fn delete_is_idempotent() {
        let mut store = LocalStore::new();
        store.upsert_time_entry(entry(10, Some(60)));
        store.upsert_time_entry(entry(11, Some(60)));

        assert!(store.delete_time_entry(10).is_some());
        let after_once: Vec<_> = store.list().into_iter().cloned().collect();
        assert!(store.delete_time_entry(10).is_none());
        let after_twice: Vec<_> = store.list().into_iter().cloned().collect();

        assert_eq!(after_once, after_twice);
    }

    #[test]
    fn replace_all_swaps_everything() {
        let mut store = LocalStore::new();
        store.upsert_time_entry(entry(-1, None));
        store.replace_all(None, vec![], vec![entry(10, Some(300))]);

        assert!(store.find(-1).is_none());
        assert_eq!(store.len(), 1);
        assert!(store.running().is_none());
    }

    #[test]
    fn visible_hides_locally_deleted_entries() {
        let mut store = LocalStore::new();
        store.upsert_time_entry(entry(1, Some(60)));
        store.upsert_time_entry(TimeEntry {
            server_deleted_at: Some(datetime!(2020-01-06 10:00 UTC)),
            dirty: true,
            ..entry(2, Some(60))
        });

        let ids: Vec<_> = store.visible().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(store.dirty_entries().len(), 1);
    }

    #[test]
    fn subscribers_see_mutations() {
        let mut store = LocalStore::new();
        let mut rx = store.subscribe();

        store.upsert_time_entry(entry(5, None));
        store.delete_time_entry(5);
        store.delete_time_entry(5);

        assert_eq!(rx.try_recv(), Ok(StoreEvent::Upserted(5)));
        assert_eq!(rx.try_recv(), Ok(StoreEvent::Removed(5)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut store = LocalStore::new();
        drop(store.subscribe());
        store.upsert_time_entry(entry(5, None));
        assert!(store.subscribers.is_empty());
    }
}
