use time::macros::datetime;
use time::OffsetDateTime;
use utopia_sync::domain::{
    EntityUpdate, SnapshotResponse, SyncCursor, SyncResponse, TimeEntry, User,
};
use utopia_sync::{SessionState, SyncEngine, SyncOutcome};

const T0: OffsetDateTime = datetime!(2020-01-06 09:00 UTC);
const T1: OffsetDateTime = datetime!(2020-01-06 10:00 UTC);

fn user() -> User {
    User {
        api_token: "u1-token".to_string(),
        at: T0,
        fullname: "User One".to_string(),
        id: 1,
        default_workspace_id: Some(1),
    }
}

fn e1() -> TimeEntry {
    TimeEntry {
        id: 10,
        start: T0,
        at: T0,
        description: "E1".to_string(),
        duration: Some(300),
        project_id: None,
        workspace_id: 1,
        server_deleted_at: None,
        dirty: false,
    }
}

#[test]
fn login_start_sync_reconciles_local_entry() {
    let mut engine = SyncEngine::new();
    assert_eq!(engine.state(), SessionState::LoggedOut);
    assert!(engine.store().is_empty());

    engine
        .handle_login_response(SnapshotResponse::new("T1", user(), vec![], vec![e1()]))
        .unwrap();
    assert_eq!(engine.store().user(), Some(&user()));
    assert_eq!(engine.store().list(), vec![&e1()]);
    assert_eq!(engine.cursor(), Some(&SyncCursor::new("T1")));

    let local = engine.start_entry_in(1, None, T1).unwrap();
    assert_eq!(local.id, -1);
    assert_eq!(local.duration, None);

    let request = engine.build_sync_request();
    assert_eq!(request.last_sync, SyncCursor::new("T1"));
    assert_eq!(request.delta.time_entries, vec![local.clone()]);

    let pending = engine.begin_sync().unwrap();
    assert_eq!(pending.request, request);

    let confirmed = TimeEntry {
        id: 99,
        dirty: false,
        ..local
    };
    let outcome = engine
        .handle_sync_response(
            &pending.ticket,
            SyncResponse::new("T2", vec![EntityUpdate::created(-1, confirmed.clone())]),
        )
        .unwrap();

    assert!(matches!(outcome, SyncOutcome::Applied(_)));
    assert_eq!(engine.store().list(), vec![&e1(), &confirmed]);
    assert!(engine.store().find(-1).is_none());
    assert!(!engine.store().find(99).unwrap().dirty);
    assert_eq!(engine.cursor(), Some(&SyncCursor::new("T2")));
    assert!(engine.build_sync_request().delta.time_entries.is_empty());
}

#[test]
fn at_most_one_entry_runs_through_start_stop_cycles() {
    let mut engine = SyncEngine::new();
    engine
        .handle_login_response(SnapshotResponse::new("T1", user(), vec![], vec![]))
        .unwrap();

    for minute in 0..10 {
        let now = T0 + time::Duration::minutes(minute);
        engine.stop_running(now);
        engine.start_entry(Some("work"), now).unwrap();

        let running = engine
            .store()
            .list()
            .into_iter()
            .filter(|e| e.is_running())
            .count();
        assert_eq!(running, 1);
    }

    let ids: Vec<_> = engine.store().list().iter().map(|e| e.id).collect();
    assert_eq!(ids, (-10..=-1).collect::<Vec<_>>());
}

#[test]
fn replayed_response_is_harmless() {
    let mut engine = SyncEngine::new();
    engine
        .handle_login_response(SnapshotResponse::new("T1", user(), vec![], vec![e1()]))
        .unwrap();
    let local = engine.start_entry_in(1, Some("offline"), T1).unwrap();
    let confirmed = TimeEntry {
        id: 481,
        dirty: false,
        ..local
    };
    let response = SyncResponse::new(
        "T2",
        vec![
            EntityUpdate::created(-1, confirmed.clone()),
            EntityUpdate::deleted(e1()),
        ],
    );

    let first = engine.begin_sync().unwrap();
    engine
        .handle_sync_response(&first.ticket, response.clone())
        .unwrap();
    let after_first = engine.snapshot();

    // Same updates delivered again against the new cursor.
    let second = engine.begin_sync().unwrap();
    engine.handle_sync_response(&second.ticket, response).unwrap();

    assert_eq!(engine.snapshot(), after_first);
    assert_eq!(engine.store().list(), vec![&confirmed]);
}
