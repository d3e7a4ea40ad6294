//! Persisted engine state.

use super::plan::{MigrationPlan, SourceBalance};
use super::step::MigrationStep;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{Amount, MigrationProgress};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationPhase {
    #[default]
    Idle,
    /// Plan fixed; the next step starts once its preconditions hold.
    Locked,
    /// `z_sendmany` issued; waiting for the operation to yield a txid.
    ComputingTx,
    /// Txid recorded.
    Broadcasting,
    AwaitingConfirmation,
    WaitingInterval { until: DateTime<Utc> },
    Completed,
    Failed { reason: String },
}

impl MigrationPhase {
    /// A plan exists and is being worked on.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            MigrationPhase::Locked
                | MigrationPhase::ComputingTx
                | MigrationPhase::Broadcasting
                | MigrationPhase::AwaitingConfirmation
                | MigrationPhase::WaitingInterval { .. }
        )
    }

    /// A hop of the current step is between submission and settlement.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(
            self,
            MigrationPhase::ComputingTx
                | MigrationPhase::Broadcasting
                | MigrationPhase::AwaitingConfirmation
        )
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, MigrationPhase::Completed | MigrationPhase::Failed { .. })
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            MigrationPhase::Idle => "idle",
            MigrationPhase::Locked => "locked",
            MigrationPhase::ComputingTx => "computing transaction",
            MigrationPhase::Broadcasting => "broadcasting",
            MigrationPhase::AwaitingConfirmation => "awaiting confirmation",
            MigrationPhase::WaitingInterval { .. } => "waiting for next step",
            MigrationPhase::Completed => "completed",
            MigrationPhase::Failed { .. } => "failed",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationState {
    pub phase: MigrationPhase,
    pub plan: Option<MigrationPlan>,
    pub steps: Vec<MigrationStep>,
    /// Amount still to move per source, in plan order.
    pub remaining: Vec<SourceBalance>,
    pub last_completed_step: Option<u32>,
    /// Polls spent in the current in-flight phase.
    #[serde(default)]
    pub polls: u32,
}

impl MigrationState {
    /// Fresh state for a newly created plan.
    #[must_use]
    pub fn locked(plan: MigrationPlan) -> Self {
        Self {
            phase: MigrationPhase::Locked,
            remaining: plan.sources.clone(),
            plan: Some(plan),
            steps: Vec::new(),
            last_completed_step: None,
            polls: 0,
        }
    }

    /// Step whose hops are being worked on, if the last one is unsettled.
    #[must_use]
    pub fn open_step(&self) -> Option<&MigrationStep> {
        self.steps.last().filter(|s| s.current_hop().is_some())
    }

    pub fn open_step_mut(&mut self) -> Option<&mut MigrationStep> {
        self.steps.last_mut().filter(|s| s.current_hop().is_some())
    }

    #[must_use]
    pub fn completed_steps(&self) -> u32 {
        self.last_completed_step.map_or(0, |i| i + 1)
    }

    /// Sources that still hold more than `dust`, in plan order.
    #[must_use]
    pub fn pending_sources(&self, dust: Amount) -> Vec<&SourceBalance> {
        self.remaining.iter().filter(|s| s.balance > dust).collect()
    }

    pub fn debit_source(&mut self, address: &str, amount: Amount) {
        if let Some(entry) = self.remaining.iter_mut().find(|s| s.address == address) {
            entry.balance = entry.balance.saturating_sub(amount);
        }
    }

    #[must_use]
    pub fn progress(&self) -> MigrationProgress {
        let Some(plan) = &self.plan else {
            return MigrationProgress::default();
        };
        let current_step = self.completed_steps();
        let next_step_eta = match &self.phase {
            MigrationPhase::WaitingInterval { until } => Some(*until),
            _ => None,
        };
        MigrationProgress {
            current_step,
            total_steps: Some(plan.estimated_steps.max(current_step)),
            next_step_eta,
        }
    }
}

/// What observers see of the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationSnapshot {
    pub phase: MigrationPhase,
    pub plan_id: Option<uuid::Uuid>,
    pub progress: MigrationProgress,
}

impl From<&MigrationState> for MigrationSnapshot {
    fn from(state: &MigrationState) -> Self {
        Self {
            phase: state.phase.clone(),
            plan_id: state.plan.as_ref().map(|p| p.id),
            progress: state.progress(),
        }
    }
}
