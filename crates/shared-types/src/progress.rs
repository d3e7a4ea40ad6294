//! Progress records surfaced to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Proving-parameter download progress.
///
/// `bytes_done` never decreases for a given `file`; `files_remaining` never
/// increases over a provisioning run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub file: String,
    pub bytes_done: u64,
    /// Unknown until the server announces a length.
    pub bytes_total: Option<u64>,
    /// Files still to fetch, including the current one.
    pub files_remaining: usize,
}

impl DownloadProgress {
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        let total = self.bytes_total.filter(|t| *t > 0)?;
        Some(((self.bytes_done.min(total) * 100) / total) as u8)
    }
}

/// Turnstile migration progress.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationProgress {
    /// Index of the step currently executing or next to execute (0-based).
    pub current_step: u32,
    /// Estimated total number of steps, if a plan exists.
    pub total_steps: Option<u32>,
    /// When the next step is scheduled, if waiting on the interval.
    pub next_step_eta: Option<DateTime<Utc>>,
}
