//! In-memory port implementations for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::domain::{Snapshot, SnapshotResponse, SyncRequest, SyncResponse};
use crate::error::{SyncError, TransportError};
use crate::ports::{SnapshotStore, Transport};
use crate::Credentials;

/// Transport that replays scripted responses and records every call.
///
/// # Examples
///
/// ```
/// use utopia_sync::domain::SyncResponse;
/// use utopia_sync::ports::mock::MockTransport;
///
/// let transport = MockTransport::new().with_sync_response(Ok(SyncResponse::new("T2", vec![])));
/// assert!(transport.sync_requests().is_empty());
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    login_responses: Arc<Mutex<VecDeque<Result<SnapshotResponse, TransportError>>>>,
    sync_responses: Arc<Mutex<VecDeque<Result<SyncResponse, TransportError>>>>,
    sync_requests: Arc<Mutex<Vec<SyncRequest>>>,
    credentials_seen: Arc<Mutex<Vec<Credentials>>>,
    gate: Option<Arc<Notify>>,
    login_gate: Option<Arc<Notify>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_login_response(self, response: Result<SnapshotResponse, TransportError>) -> Self {
        self.login_responses.lock().unwrap().push_back(response);
        self
    }

    pub fn with_sync_response(self, response: Result<SyncResponse, TransportError>) -> Self {
        self.sync_responses.lock().unwrap().push_back(response);
        self
    }

    /// Makes `sync` wait until the returned handle is notified, so tests can
    /// act while a request is in flight.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Same as [`MockTransport::gated`], but holds back `login` instead.
    pub fn gated_login(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.login_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn sync_requests(&self) -> Vec<SyncRequest> {
        self.sync_requests.lock().unwrap().clone()
    }

    pub fn credentials_seen(&self) -> Vec<Credentials> {
        self.credentials_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn login(&self, credentials: &Credentials) -> Result<SnapshotResponse, TransportError> {
        self.credentials_seen.lock().unwrap().push(credentials.clone());
        if let Some(gate) = &self.login_gate {
            gate.notified().await;
        }
        self.login_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(TransportError::Unreachable("no scripted login".to_string())))
    }

    async fn sync(
        &self,
        credentials: &Credentials,
        request: &SyncRequest,
    ) -> Result<SyncResponse, TransportError> {
        self.credentials_seen.lock().unwrap().push(credentials.clone());
        self.sync_requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.sync_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(TransportError::Unreachable("no scripted sync".to_string())))
    }
}

/// Snapshot store backed by a single in-memory slot.
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    slot: Arc<RwLock<Option<Snapshot>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), SyncError> {
        *self.slot.write().unwrap() = Some(snapshot.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Snapshot>, SyncError> {
        Ok(self.slot.read().unwrap().clone())
    }

    async fn clear(&self) -> Result<(), SyncError> {
        *self.slot.write().unwrap() = None;
        Ok(())
    }
}
