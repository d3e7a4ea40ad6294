//! # Turnstile Migration (wc-04)
//!
//! Drains Sprout addresses into one Sapling address through periodic,
//! bounded steps. Each step sends a slice of one source to a fresh
//! transparent address and from there to the destination, so no single
//! transaction links the whole balance.
//!
//! ## Layers
//!
//! | Layer | Type | Does I/O |
//! |-------|------|----------|
//! | Records | [`MigrationPlan`], [`MigrationStep`], [`MigrationState`] | no |
//! | Engine | [`TurnstileEngine`] | RPC through a borrowed session, store |
//! | Runner | [`MigrationRunner`] | owns the engine, timers |
//!
//! ## Guarantees
//!
//! - No plan is stored unless the aggregate confirmed source balance
//!   reaches [`MIN_MIGRATION_AMOUNT`] and no source has unconfirmed notes.
//!   The same checks run again before every step; failing them delays the
//!   step and is never fatal.
//! - A hop is sent at most once. Its "submitting" marker is persisted
//!   before the send; a marker without an operation id after a restart
//!   fails the migration.
//! - Recorded txids are never replaced and never re-broadcast.
//! - `Completed` is reached only when every source is drained and no step
//!   failed.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod runner;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use adapters::JsonFileStore;
pub use domain::{
    plan_file_name, ConfirmationStatus, DegradedPolicy, HopRecord, MigrationPhase, MigrationPlan,
    MigrationRequest, MigrationSnapshot, MigrationState, MigrationStep, SourceBalance,
    TurnstileConfig, MIN_MIGRATION_AMOUNT,
};
pub use engine::{TurnstileEngine, Wake};
pub use error::{TurnstileError, TurnstileResult};
pub use ports::{MigrationStore, SystemTimeSource, TimeSource};
pub use runner::{MigrationRunner, TurnstileCommand, TurnstileHandle};
