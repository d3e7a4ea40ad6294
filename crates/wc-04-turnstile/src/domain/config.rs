//! Engine tuning.

use super::plan::MIN_MIGRATION_AMOUNT;
use crate::error::{TurnstileError, TurnstileResult};
use serde::{Deserialize, Serialize};
use shared_types::{Amount, Network, COIN};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Miner fee paid by every hop (0.0001).
pub const DEFAULT_HOP_FEE: Amount = Amount::from_zat(10_000);

/// Largest debit a single step takes from one source.
pub const DEFAULT_STEP_CAP: Amount = Amount::from_zat(10 * COIN);

pub const DEFAULT_STEP_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);

/// Base name of the persisted plan inside the daemon datadir.
pub const PLAN_FILE_NAME: &str = "turnstile-migration.json";

/// What to do with a hop that never reached the confirmation target within
/// the poll budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradedPolicy {
    /// Record the hop as degraded and carry on with the plan.
    #[default]
    Continue,
    /// Stop the migration in `Failed`.
    Halt,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnstileConfig {
    pub network: Network,
    pub hop_fee: Amount,
    pub step_cap: Amount,
    pub step_interval: Duration,
    pub min_confirmations: u32,
    pub confirmation_poll_interval: Duration,
    pub max_confirmation_polls: u32,
    pub operation_poll_interval: Duration,
    pub max_operation_polls: u32,
    /// Wait before re-evaluating unmet step preconditions.
    pub precondition_recheck: Duration,
    /// Wait after an RPC failure before the runner ticks again.
    pub retry_delay: Duration,
    pub degraded_policy: DegradedPolicy,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            hop_fee: DEFAULT_HOP_FEE,
            step_cap: DEFAULT_STEP_CAP,
            step_interval: DEFAULT_STEP_INTERVAL,
            min_confirmations: 1,
            confirmation_poll_interval: Duration::from_secs(30),
            max_confirmation_polls: 120,
            operation_poll_interval: Duration::from_secs(2),
            max_operation_polls: 300,
            precondition_recheck: Duration::from_secs(5 * 60),
            retry_delay: Duration::from_secs(30),
            degraded_policy: DegradedPolicy::Continue,
        }
    }
}

impl TurnstileConfig {
    /// Fees consumed by one full step (two hops).
    #[must_use]
    pub fn step_fees(&self) -> Amount {
        self.hop_fee + self.hop_fee
    }

    pub fn validate(&self) -> TurnstileResult<()> {
        if self.hop_fee.is_zero() {
            return Err(TurnstileError::Config("hop fee must be positive".into()));
        }
        if self.step_cap <= self.step_fees() {
            return Err(TurnstileError::Config(format!(
                "step cap {} does not cover two hop fees of {}",
                self.step_cap, self.hop_fee
            )));
        }
        if self.step_cap < MIN_MIGRATION_AMOUNT {
            return Err(TurnstileError::Config(format!(
                "step cap {} is below the minimum migration amount {}",
                self.step_cap, MIN_MIGRATION_AMOUNT
            )));
        }
        if self.min_confirmations == 0 {
            return Err(TurnstileError::Config(
                "min_confirmations must be at least 1".into(),
            ));
        }
        if self.max_confirmation_polls == 0 || self.max_operation_polls == 0 {
            return Err(TurnstileError::Config("poll budgets must be non-zero".into()));
        }
        Ok(())
    }

    /// Plan file location for this network inside `datadir`.
    #[must_use]
    pub fn plan_path(&self, datadir: &Path) -> PathBuf {
        datadir.join(plan_file_name(self.network))
    }
}

/// Testnet plans carry a `testnet-` prefix so both networks can share a
/// directory.
#[must_use]
pub fn plan_file_name(network: Network) -> String {
    if network.is_testnet() {
        format!("testnet-{PLAN_FILE_NAME}")
    } else {
        PLAN_FILE_NAME.to_string()
    }
}
