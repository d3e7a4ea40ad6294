//! Turnstile error types.

use shared_types::WalletError;
use thiserror::Error;
use wc_01_rpc_session::RpcError;

/// Errors returned by the migration engine and runner.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TurnstileError {
    #[error("Invalid turnstile configuration: {0}")]
    Config(String),

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Balances or confirmations do not allow the requested action.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("A migration is already in progress ({0})")]
    AlreadyActive(String),

    #[error("No migration to {0}")]
    NothingTo(&'static str),

    #[error("Not connected to the daemon")]
    NotConnected,

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Migration store error at {path}: {reason}")]
    Storage { path: String, reason: String },

    #[error("Migration runner has stopped")]
    RunnerStopped,
}

impl TurnstileError {
    pub(crate) fn storage(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        TurnstileError::Storage {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<TurnstileError> for WalletError {
    fn from(err: TurnstileError) -> Self {
        match err {
            TurnstileError::Rpc(e) => e.into(),
            TurnstileError::Config(msg) => WalletError::Config(msg),
            TurnstileError::NotConnected => WalletError::Transport(err.to_string()),
            TurnstileError::Storage { .. } => WalletError::Storage(err.to_string()),
            TurnstileError::RunnerStopped => WalletError::Cancelled,
            TurnstileError::InvalidAddress { .. }
            | TurnstileError::Precondition(_)
            | TurnstileError::AlreadyActive(_)
            | TurnstileError::NothingTo(_) => WalletError::Precondition(err.to_string()),
        }
    }
}

/// Result type for turnstile operations.
pub type TurnstileResult<T> = Result<T, TurnstileError>;
