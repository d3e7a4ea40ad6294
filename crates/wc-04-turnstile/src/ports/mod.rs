//! Outbound ports.

use crate::domain::MigrationState;
use crate::error::TurnstileResult;
use chrono::{DateTime, Utc};

/// Durable home of the migration state.
///
/// Every `save` must replace the previous state atomically: after a crash
/// `load` returns either the old or the new state, never a mix.
pub trait MigrationStore: Send + Sync {
    /// `None` when no migration was persisted.
    fn load(&self) -> TurnstileResult<Option<MigrationState>>;

    fn save(&self, state: &MigrationState) -> TurnstileResult<()>;

    /// Remove the persisted state. Clearing an empty store succeeds.
    fn clear(&self) -> TurnstileResult<()>;
}

/// Wall-clock source for plan timestamps and step scheduling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
