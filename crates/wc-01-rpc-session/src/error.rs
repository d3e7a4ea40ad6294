//! Error types for the RPC session.

use shared_types::WalletError;
use thiserror::Error;

/// RPC error code the daemon uses while loading the block index, rescanning
/// or otherwise not yet ready to serve requests.
pub const RPC_IN_WARMUP: i64 = -28;

/// JSON-RPC parse error code, used when the daemon's reply is unreadable.
pub const RPC_PARSE_ERROR: i64 = -32700;

/// RPC session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// HTTP 401/403. Never retried by the session.
    #[error("Authentication rejected by daemon (HTTP {status})")]
    Auth { status: u16 },

    /// Connection refused, timed out or dropped before a reply arrived.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Daemon is up but not serving requests yet.
    #[error("Daemon warming up: {message}")]
    WarmingUp { message: String },

    /// Daemon returned a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Application { code: i64, message: String },

    /// Reply could not be interpreted.
    #[error("Malformed RPC response: {0}")]
    Protocol(String),

    /// Session was closed; the result (if any) was discarded.
    #[error("RPC session closed")]
    Cancelled,
}

impl RpcError {
    /// Errors worth retrying after a delay.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::WarmingUp { .. })
    }

    /// True if an HTTP server answered at all, i.e. a daemon is listening.
    #[must_use]
    pub const fn daemon_answered(&self) -> bool {
        matches!(
            self,
            RpcError::Auth { .. }
                | RpcError::WarmingUp { .. }
                | RpcError::Application { .. }
                | RpcError::Protocol(_)
        )
    }
}

impl From<RpcError> for WalletError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Auth { status } => {
                WalletError::Auth(format!("daemon rejected credentials (HTTP {status})"))
            }
            RpcError::Transport(msg) => WalletError::Transport(msg),
            RpcError::WarmingUp { message } => WalletError::RpcApplication {
                code: RPC_IN_WARMUP,
                message,
            },
            RpcError::Application { code, message } => {
                WalletError::RpcApplication { code, message }
            }
            RpcError::Protocol(message) => WalletError::RpcApplication {
                code: RPC_PARSE_ERROR,
                message,
            },
            RpcError::Cancelled => WalletError::Cancelled,
        }
    }
}

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;
