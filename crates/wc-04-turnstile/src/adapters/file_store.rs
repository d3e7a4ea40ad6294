//! JSON file store for the migration state.

use crate::domain::{MigrationState, TurnstileConfig};
use crate::error::{TurnstileError, TurnstileResult};
use crate::ports::MigrationStore;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes the whole state as pretty JSON through a temp file and rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the network's plan file inside `datadir`.
    #[must_use]
    pub fn in_datadir(datadir: &Path, config: &TurnstileConfig) -> Self {
        Self::new(config.plan_path(datadir))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl MigrationStore for JsonFileStore {
    fn load(&self) -> TurnstileResult<Option<MigrationState>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TurnstileError::storage(&self.path, e)),
        };
        let state = serde_json::from_slice(&bytes)
            .map_err(|e| TurnstileError::storage(&self.path, e))?;
        Ok(Some(state))
    }

    fn save(&self, state: &MigrationState) -> TurnstileResult<()> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| TurnstileError::storage(&self.path, e))?;
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| TurnstileError::storage(dir, e))?;
        }

        let temp = self.temp_path();
        let mut file =
            std::fs::File::create(&temp).map_err(|e| TurnstileError::storage(&temp, e))?;
        file.write_all(&bytes)
            .map_err(|e| TurnstileError::storage(&temp, e))?;
        file.sync_all()
            .map_err(|e| TurnstileError::storage(&temp, e))?;
        std::fs::rename(&temp, &self.path).map_err(|e| TurnstileError::storage(&self.path, e))?;

        debug!(path = %self.path.display(), phase = state.phase.label(), "[wc-04] Migration state saved");
        Ok(())
    }

    fn clear(&self) -> TurnstileResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TurnstileError::storage(&self.path, e)),
        }
    }
}
