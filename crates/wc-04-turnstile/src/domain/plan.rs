//! Migration plan: what moves where, fixed at `begin`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{Amount, ShieldedPool};
use std::time::Duration;
use uuid::Uuid;

/// Smallest aggregate confirmed balance worth migrating (0.0005).
pub const MIN_MIGRATION_AMOUNT: Amount = Amount::from_zat(50_000);

/// Caller input to start a migration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationRequest {
    /// Sapling address that receives the funds.
    pub destination: String,
    /// Sprout addresses to drain; every Sprout address in the wallet when
    /// `None`.
    pub sources: Option<Vec<String>>,
}

impl MigrationRequest {
    #[must_use]
    pub fn all_sprout(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            sources: None,
        }
    }

    #[must_use]
    pub fn from_sources(destination: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            destination: destination.into(),
            sources: Some(sources),
        }
    }
}

/// A source address and an amount tied to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBalance {
    pub address: String,
    pub balance: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub id: Uuid,
    pub source_pool: ShieldedPool,
    pub destination: String,
    /// Confirmed balances at plan creation.
    pub sources: Vec<SourceBalance>,
    pub hop_fee: Amount,
    pub step_cap: Amount,
    /// `hop_fee * 2 * estimated_steps`.
    pub fee_budget: Amount,
    pub step_interval_secs: u64,
    pub estimated_steps: u32,
    pub created_at: DateTime<Utc>,
}

impl MigrationPlan {
    #[must_use]
    pub fn new(
        destination: String,
        sources: Vec<SourceBalance>,
        hop_fee: Amount,
        step_cap: Amount,
        step_interval: Duration,
        created_at: DateTime<Utc>,
    ) -> Self {
        let estimated_steps = estimate_steps(&sources, step_cap, hop_fee);
        let fee_budget = hop_fee
            .checked_mul(2 * u64::from(estimated_steps))
            .unwrap_or(Amount::from_zat(u64::MAX));
        Self {
            id: Uuid::new_v4(),
            source_pool: ShieldedPool::Sprout,
            destination,
            sources,
            hop_fee,
            step_cap,
            fee_budget,
            step_interval_secs: step_interval.as_secs(),
            estimated_steps,
            created_at,
        }
    }

    #[must_use]
    pub fn total(&self) -> Amount {
        self.sources.iter().map(|s| s.balance).sum()
    }

    #[must_use]
    pub fn step_interval(&self) -> Duration {
        Duration::from_secs(self.step_interval_secs)
    }

    /// Balance below which a source counts as drained.
    #[must_use]
    pub fn dust_limit(&self) -> Amount {
        self.hop_fee + self.hop_fee
    }
}

/// Steps needed to drain `sources` in slices of at most `cap`.
///
/// A source holding no more than two hop fees cannot fund a step and
/// contributes nothing.
#[must_use]
pub fn estimate_steps(sources: &[SourceBalance], cap: Amount, hop_fee: Amount) -> u32 {
    let dust = hop_fee + hop_fee;
    if cap.is_zero() {
        return 0;
    }
    sources
        .iter()
        .filter(|s| s.balance > dust)
        .map(|s| {
            let steps = s.balance.zat().div_ceil(cap.zat());
            u32::try_from(steps).unwrap_or(u32::MAX)
        })
        .fold(0u32, u32::saturating_add)
}
