use thiserror::Error;

use crate::domain::EntityId;

/// Failures reported by a transport adapter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("server unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out")]
    Timeout,
    #[error("invalid credentials")]
    Unauthorized,
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// An operation was attempted in a state that does not allow it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreconditionError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("time entry {0} is already running")]
    AlreadyRunning(EntityId),
    #[error("a sync is already in progress")]
    SyncInProgress,
    #[error("a login is already in progress")]
    LoginInProgress,
    #[error("user has no default workspace")]
    NoDefaultWorkspace,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(TransportError),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("precondition failed: {0}")]
    Precondition(#[from] PreconditionError),
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl SyncError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Malformed(msg) => SyncError::Protocol(msg),
            other => SyncError::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_transport_body_is_a_protocol_error() {
        let err: SyncError = TransportError::Malformed("missing meta".to_string()).into();
        assert_eq!(err, SyncError::Protocol("missing meta".to_string()));
    }

    #[test]
    fn network_failures_pass_through_unmodified() {
        let err: SyncError = TransportError::Status(502).into();
        assert_eq!(err, SyncError::Transport(TransportError::Status(502)));
    }
}
