//! Test doubles for the store and the clock.

use crate::domain::MigrationState;
use crate::error::{TurnstileError, TurnstileResult};
use crate::ports::{MigrationStore, TimeSource};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory store that counts saves and can be told to fail them.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<MigrationState>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store pre-loaded with `state`, as if written by an earlier run.
    #[must_use]
    pub fn with_state(state: MigrationState) -> Arc<Self> {
        let store = Self::default();
        *store.state.lock() = Some(state);
        Arc::new(store)
    }

    #[must_use]
    pub fn stored(&self) -> Option<MigrationState> {
        self.state.lock().clone()
    }

    #[must_use]
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl MigrationStore for MemoryStore {
    fn load(&self) -> TurnstileResult<Option<MigrationState>> {
        Ok(self.state.lock().clone())
    }

    fn save(&self, state: &MigrationState) -> TurnstileResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(TurnstileError::Storage {
                path: "memory".into(),
                reason: "save disabled".into(),
            });
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = Some(state.clone());
        Ok(())
    }

    fn clear(&self) -> TurnstileResult<()> {
        *self.state.lock() = None;
        Ok(())
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualTimeSource {
    now: Mutex<DateTime<Utc>>,
}

impl ManualTimeSource {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    /// Clock fixed at 2024-01-01T00:00:00Z.
    #[must_use]
    pub fn epoch() -> Arc<Self> {
        Self::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default())
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        *self.now.lock() += delta;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
