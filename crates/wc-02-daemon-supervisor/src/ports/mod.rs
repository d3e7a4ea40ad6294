//! Ports (hexagonal architecture).
//!
//! The supervisor never touches `std::process` or the network directly;
//! everything goes through these traits so the lifecycle can be driven by
//! scripted fakes in tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;

// =============================================================================
// Process
// =============================================================================

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Reported by a process that has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when terminated by a signal.
    pub code: Option<i32>,
}

/// A running daemon process.
#[async_trait]
pub trait DaemonProcess: Send + Sync {
    fn id(&self) -> Option<u32>;

    /// Non-blocking liveness check.
    fn try_wait(&mut self) -> std::io::Result<Option<ProcessExit>>;

    /// Forcefully terminate and reap.
    async fn kill(&mut self) -> std::io::Result<()>;

    /// Captured stderr so far (tail).
    fn captured_output(&self) -> String;
}

/// Starts daemon processes.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Box<dyn DaemonProcess>>;
}

// =============================================================================
// Parameter download
// =============================================================================

/// Byte counters for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteProgress {
    pub done: u64,
    pub total: Option<u64>,
}

pub type ProgressSender = mpsc::UnboundedSender<ByteProgress>;

/// Errors from a single download attempt.
#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("I/O error: {0}")]
    Io(String),
}

/// Fetches one parameter file.
#[async_trait]
pub trait ParamsDownloader: Send + Sync {
    /// Download `file` into `dest` (truncating), reporting byte progress.
    async fn fetch(
        &self,
        file: &str,
        dest: &Path,
        progress: ProgressSender,
    ) -> Result<(), DownloadError>;
}
