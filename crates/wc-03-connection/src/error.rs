//! Connection error types.

use shared_types::{ConnectionStatus, WalletError};
use thiserror::Error;

/// Errors returned synchronously by the connection driver.
///
/// Failures discovered while an attempt is running never surface here; they
/// become an `Error(reason)` status plus a `TerminalError` bus event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Settings are incomplete or contradictory. Raised before any
    /// transition or daemon action.
    #[error("Invalid connection settings: {0}")]
    Config(String),

    /// The daemon already rejected these credentials.
    #[error("Credentials were rejected by the daemon; change them before retrying")]
    CredentialsRejected,

    /// `start` was called while an attempt is in flight or established.
    #[error("Connection already active ({0})")]
    AlreadyActive(ConnectionStatus),

    /// The service task is gone.
    #[error("Connection service has stopped")]
    ServiceStopped,
}

impl From<ConnectionError> for WalletError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Config(msg) => WalletError::Config(msg),
            ConnectionError::CredentialsRejected => WalletError::Auth(err.to_string()),
            ConnectionError::AlreadyActive(_) => WalletError::Precondition(err.to_string()),
            ConnectionError::ServiceStopped => WalletError::Cancelled,
        }
    }
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;
