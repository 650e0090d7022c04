use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::instrument;

use crate::engine::{SyncEngine, SyncOutcome, SyncTicket};
use crate::error::{PreconditionError, Result};
use crate::ports::{SnapshotStore, Transport};
use crate::Credentials;

pub type SharedEngine = Arc<Mutex<SyncEngine>>;

/// Runs login and sync round trips against a [`Transport`].
///
/// The engine lock is only held while reading or writing the store, never
/// across the network call, so local edits keep working while a sync is in
/// flight and show up in the next request.
pub struct SyncSession<T> {
    engine: SharedEngine,
    transport: Arc<T>,
}

impl<T> Clone for SyncSession<T> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            transport: self.transport.clone(),
        }
    }
}

fn lock(engine: &Mutex<SyncEngine>) -> MutexGuard<'_, SyncEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases the sync latch if the round trip is dropped before it completes.
struct InFlight<'a> {
    engine: &'a Mutex<SyncEngine>,
    ticket: &'a SyncTicket,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("Sync abandoned before a response arrived");
            lock(self.engine).cancel_sync(self.ticket);
        }
    }
}

/// Leaves `Authenticating` if the login is dropped before it completes.
struct LoginAttempt<'a> {
    engine: &'a Mutex<SyncEngine>,
    armed: bool,
}

impl LoginAttempt<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoginAttempt<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("Login abandoned before a response arrived");
            lock(self.engine).login_failed();
        }
    }
}

impl<T: Transport> SyncSession<T> {
    pub fn new(engine: SyncEngine, transport: Arc<T>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            transport,
        }
    }

    /// Loads the last saved snapshot, or starts logged out.
    pub async fn restore(snapshots: &impl SnapshotStore, transport: Arc<T>) -> Result<Self> {
        let engine = match snapshots.load().await? {
            Some(snapshot) => {
                tracing::debug!(
                    time_entries = snapshot.time_entries.len(),
                    "Restored saved snapshot"
                );
                SyncEngine::restore(snapshot)
            }
            None => SyncEngine::new(),
        };
        Ok(Self::new(engine, transport))
    }

    pub async fn save(&self, snapshots: &impl SnapshotStore) -> Result<()> {
        let snapshot = lock(&self.engine).snapshot();
        snapshots.save(&snapshot).await
    }

    /// Handle for readers and local edits.
    pub fn engine(&self) -> SharedEngine {
        self.engine.clone()
    }

    pub fn with_engine<R>(&self, f: impl FnOnce(&mut SyncEngine) -> R) -> R {
        f(&mut lock(&self.engine))
    }

    #[instrument(name = "SyncSession::login", skip_all)]
    pub async fn login(&self, credentials: &Credentials) -> Result<()> {
        lock(&self.engine).begin_login()?;
        let guard = LoginAttempt {
            engine: &self.engine,
            armed: true,
        };

        let result = self.transport.login(credentials).await;
        guard.disarm();

        match result {
            Ok(response) => lock(&self.engine).handle_login_response(response),
            Err(err) => {
                tracing::warn!(error = %err, "Login failed");
                lock(&self.engine).login_failed();
                Err(err.into())
            }
        }
    }

    /// One full round trip: build the delta, send it, merge the answer.
    #[instrument(name = "SyncSession::sync", skip_all)]
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let (pending, credentials) = {
            let mut engine = lock(&self.engine);
            let credentials = engine
                .store()
                .user()
                .map(|user| Credentials::token(&user.api_token))
                .ok_or(PreconditionError::NotLoggedIn)?;
            (engine.begin_sync()?, credentials)
        };
        let guard = InFlight {
            engine: &self.engine,
            ticket: &pending.ticket,
            armed: true,
        };

        let result = self.transport.sync(&credentials, &pending.request).await;
        guard.disarm();

        let mut engine = lock(&self.engine);
        match result {
            Ok(response) => engine.handle_sync_response(&pending.ticket, response),
            Err(err) => {
                tracing::warn!(error = %err, "Sync failed, local changes kept for retry");
                engine.cancel_sync(&pending.ticket);
                Err(err.into())
            }
        }
    }

    /// Logs out locally and wipes the saved snapshot.
    pub async fn logout(&self, snapshots: &impl SnapshotStore) -> Result<()> {
        lock(&self.engine).logout();
        snapshots.clear().await
    }
}
