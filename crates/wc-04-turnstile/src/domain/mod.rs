//! Domain layer: plan, step records, phases and tuning.

pub mod config;
pub mod plan;
pub mod state;
pub mod step;

pub use config::{
    plan_file_name, DegradedPolicy, TurnstileConfig, DEFAULT_HOP_FEE, DEFAULT_STEP_CAP,
    DEFAULT_STEP_INTERVAL, PLAN_FILE_NAME,
};
pub use plan::{estimate_steps, MigrationPlan, MigrationRequest, SourceBalance, MIN_MIGRATION_AMOUNT};
pub use state::{MigrationPhase, MigrationSnapshot, MigrationState};
pub use step::{ConfirmationStatus, HopRecord, MigrationStep};
