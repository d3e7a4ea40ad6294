//! # Error Types
//!
//! Cross-crate error taxonomy. Each crate keeps its own detailed error enum
//! and converts into [`WalletError`] at its public boundary.

use crate::status::FailureReason;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wallet-core error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum WalletError {
    /// Settings are missing, contradictory or rejected by the daemon conf.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection refused, timed out or dropped.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Daemon rejected the RPC credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Daemon process failed to start or exited abnormally.
    #[error("Daemon process error: {detail}")]
    Process {
        detail: String,
        /// Captured daemon stderr, if any.
        output: Option<String>,
    },

    /// A proving-parameter file could not be fetched.
    #[error("Parameter download failed for {file}: {reason}")]
    ParamsDownload { file: String, reason: String },

    /// Daemon answered with an RPC error object.
    #[error("RPC error {code}: {message}")]
    RpcApplication { code: i64, message: String },

    /// A required condition for the requested operation does not hold.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Persisted state could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Operation was abandoned because of shutdown or cancellation.
    #[error("Operation cancelled")]
    Cancelled,
}

impl WalletError {
    /// Transient errors are absorbed by the owning state machine.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, WalletError::Transport(_))
    }

    /// The connection failure reason this error maps to, if it is one.
    #[must_use]
    pub const fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            WalletError::Config(_) => Some(FailureReason::Config),
            WalletError::Transport(_) => Some(FailureReason::Unreachable),
            WalletError::Auth(_) => Some(FailureReason::Auth),
            WalletError::Process { .. } => Some(FailureReason::Process),
            WalletError::ParamsDownload { .. } => Some(FailureReason::Params),
            WalletError::RpcApplication { .. } => Some(FailureReason::Protocol),
            WalletError::Precondition(_) | WalletError::Storage(_) | WalletError::Cancelled => {
                None
            }
        }
    }
}
