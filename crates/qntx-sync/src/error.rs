//! Error types for sync sessions.

use qntx_sync_core::StoreError;
use thiserror::Error;

/// Everything that can abort a reconciliation session.
///
/// Hitting a session limit is not an error: it is reported through the
/// `partial` flag of the session stats.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The connection failed underneath the session. Raised by `Conn`
    /// implementations over real sockets; the in-process channel reports
    /// `ConnectionClosed` instead.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer went away
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer did not answer within the phase timeout
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The peer sent a valid message at the wrong point in the protocol
    #[error("protocol violation: expected {expected}, got {got}")]
    UnexpectedMessage {
        expected: &'static str,
        got: &'static str,
    },

    /// The peer sent something that could not be decoded
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The local store failed while serving or applying attestations
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The tree observer task is no longer running
    #[error("tree observer stopped")]
    ObserverStopped,
}

impl SyncError {
    /// Protocol violations and malformed input from the peer.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SyncError::UnexpectedMessage { .. } | SyncError::Malformed(_)
        )
    }

    /// Failures of the connection itself. A fresh session may succeed.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::ConnectionClosed | SyncError::Timeout(_)
        )
    }

    /// Short label for logs: `transport`, `protocol` or `local`.
    pub fn kind(&self) -> &'static str {
        if self.is_transport() {
            "transport"
        } else if self.is_protocol_violation() {
            "protocol"
        } else {
            "local"
        }
    }
}

/// Result type alias using SyncError.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(SyncError::Timeout("sync_hello").is_transport());
        assert!(SyncError::ConnectionClosed.is_transport());
        assert!(SyncError::Malformed("bad hex".into()).is_protocol_violation());
        assert!(SyncError::UnexpectedMessage {
            expected: "sync_need",
            got: "sync_done"
        }
        .is_protocol_violation());

        let store: SyncError = StoreError::Backend("disk full".into()).into();
        assert!(!store.is_transport());
        assert!(!store.is_protocol_violation());
    }

    #[test]
    fn kind_labels() {
        assert_eq!(SyncError::Transport("reset by peer".into()).kind(), "transport");
        assert_eq!(SyncError::Timeout("sync_done").kind(), "transport");
        assert_eq!(SyncError::Malformed("odd length".into()).kind(), "protocol");
        assert_eq!(SyncError::ObserverStopped.kind(), "local");
        let store: SyncError = StoreError::Backend("disk full".into()).into();
        assert_eq!(store.kind(), "local");
    }

    #[test]
    fn messages() {
        let err = SyncError::UnexpectedMessage {
            expected: "sync_hello",
            got: "sync_attestations",
        };
        assert_eq!(
            err.to_string(),
            "protocol violation: expected sync_hello, got sync_attestations"
        );
    }
}
