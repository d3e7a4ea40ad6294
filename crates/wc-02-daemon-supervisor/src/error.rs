//! Error types for the daemon supervisor.

use crate::domain::exit::DaemonExit;
use shared_types::WalletError;
use thiserror::Error;

/// Daemon supervisor errors.
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    /// Conf file is unusable for an embedded daemon.
    #[error("Daemon configuration error: {0}")]
    Config(String),

    /// A proving-parameter file could not be fetched after all retries.
    #[error("Failed to download {file} after {attempts} attempts: {reason}")]
    ParamsDownload {
        file: String,
        attempts: u32,
        reason: String,
    },

    /// Daemon binary missing or not executable.
    #[error("Failed to start daemon {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// Daemon exited without being asked to.
    #[error("Daemon exited: {0}")]
    Exited(DaemonExit),

    /// Filesystem failure around conf or params.
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },
}

impl SupervisorError {
    pub(crate) fn io(path: &std::path::Path, err: &std::io::Error) -> Self {
        SupervisorError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<SupervisorError> for WalletError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::Config(msg) => WalletError::Config(msg),
            SupervisorError::ParamsDownload { file, reason, .. } => {
                WalletError::ParamsDownload { file, reason }
            }
            SupervisorError::Spawn { program, reason } => WalletError::Process {
                detail: format!("failed to start {program}: {reason}"),
                output: None,
            },
            SupervisorError::Exited(exit) => WalletError::Process {
                detail: exit.summary(),
                output: (!exit.output.is_empty()).then_some(exit.output),
            },
            SupervisorError::Io { path, reason } => {
                WalletError::Storage(format!("{path}: {reason}"))
            }
        }
    }
}

/// Result type for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;
