//! # Parameter Provisioning
//!
//! Fetches whichever proving-parameter files are missing, one at a time, in
//! canonical order. Each file is written to `<name>.part` and renamed only
//! after a complete download, so a present file is always a whole file.
//!
//! Progress published on the bus is monotonic: `bytes_done` never goes back
//! for a file (a retry resumes reporting once it passes the previous mark)
//! and `files_remaining` only decreases.

use crate::domain::params::{missing_params, partial_path};
use crate::error::{SupervisorError, SupervisorResult};
use crate::ports::{ByteProgress, ParamsDownloader};
use shared_bus::{EventPublisher, WalletEvent};
use shared_types::DownloadProgress;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Attempts per file before giving up.
pub const DEFAULT_DOWNLOAD_ATTEMPTS: u32 = 3;

pub struct ParamsProvisioner {
    downloader: Arc<dyn ParamsDownloader>,
    publisher: Arc<dyn EventPublisher>,
    dir: PathBuf,
    attempts: u32,
}

impl ParamsProvisioner {
    #[must_use]
    pub fn new(
        downloader: Arc<dyn ParamsDownloader>,
        publisher: Arc<dyn EventPublisher>,
        dir: PathBuf,
    ) -> Self {
        Self {
            downloader,
            publisher,
            dir,
            attempts: DEFAULT_DOWNLOAD_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn missing(&self) -> Vec<&'static str> {
        missing_params(&self.dir)
    }

    /// Download every missing file. Returns the number fetched.
    pub async fn provision(&self) -> SupervisorResult<usize> {
        let missing = self.missing();
        if missing.is_empty() {
            return Ok(0);
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SupervisorError::io(&self.dir, &e))?;

        info!(
            dir = %self.dir.display(),
            files = missing.len(),
            "[wc-02] Provisioning proving parameters"
        );

        let total_files = missing.len();
        for (index, file) in missing.iter().enumerate() {
            let files_remaining = total_files - index;
            self.fetch_with_retries(file, files_remaining).await?;
        }
        Ok(total_files)
    }

    async fn fetch_with_retries(&self, file: &str, files_remaining: usize) -> SupervisorResult<()> {
        let part = partial_path(&self.dir, file);
        let target = self.dir.join(file);
        let mut reported = 0u64;
        let mut last_error = String::new();

        self.report(DownloadProgress {
            file: file.to_string(),
            bytes_done: 0,
            bytes_total: None,
            files_remaining,
        })
        .await;

        for attempt in 1..=self.attempts {
            let (tx, mut rx) = mpsc::unbounded_channel::<ByteProgress>();
            let fetch = self.downloader.fetch(file, &part, tx);
            tokio::pin!(fetch);

            let result = loop {
                tokio::select! {
                    res = &mut fetch => break res,
                    Some(p) = rx.recv() => {
                        self.forward(file, files_remaining, p, &mut reported).await;
                    }
                }
            };
            while let Ok(p) = rx.try_recv() {
                self.forward(file, files_remaining, p, &mut reported).await;
            }

            match result {
                Ok(()) => {
                    tokio::fs::rename(&part, &target)
                        .await
                        .map_err(|e| SupervisorError::io(&target, &e))?;
                    info!(file, "[wc-02] Parameter file ready");
                    return Ok(());
                }
                Err(e) => {
                    warn!(file, attempt, error = %e, "[wc-02] Parameter download failed");
                    last_error = e.to_string();
                    let _ = tokio::fs::remove_file(&part).await;
                }
            }
        }

        Err(SupervisorError::ParamsDownload {
            file: file.to_string(),
            attempts: self.attempts,
            reason: last_error,
        })
    }

    async fn forward(
        &self,
        file: &str,
        files_remaining: usize,
        progress: ByteProgress,
        reported: &mut u64,
    ) {
        if progress.done <= *reported && *reported != 0 {
            return;
        }
        *reported = progress.done;
        self.report(DownloadProgress {
            file: file.to_string(),
            bytes_done: progress.done,
            bytes_total: progress.total,
            files_remaining,
        })
        .await;
    }

    async fn report(&self, progress: DownloadProgress) {
        self.publisher
            .publish(WalletEvent::ParamsProgress(progress))
            .await;
    }
}
