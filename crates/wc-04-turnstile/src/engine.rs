//! # Turnstile Engine
//!
//! Single owner of the [`MigrationState`]. The engine never sleeps: each
//! [`TurnstileEngine::tick`] performs at most one unit of work against the
//! daemon and returns when it wants to be called again.
//!
//! ```text
//!   Idle ──begin──→ Locked ──step──→ ComputingTx ──txid──→ Broadcasting
//!                     ↑                   ↑                     │
//!                     │                   └──── hop 0 settled ──┤
//!                     │                                         ↓
//!              WaitingInterval ←──── hop 1 settled ──── AwaitingConfirmation
//!                                          │
//!                                          └── sources drained ──→ Completed
//!
//!   any active phase ──unknown outcome / rejected / conflicted──→ Failed
//! ```
//!
//! ## Persistence order
//!
//! State that changes what the daemon will be asked to do is saved before
//! the request goes out. The "submitting" marker of a hop is on disk before
//! `z_sendmany` is issued, so a crash between the two leaves a hop with a
//! marker and no operation id; on restart that hop is failed rather than
//! sent again.

use crate::domain::{
    ConfirmationStatus, DegradedPolicy, MigrationPhase, MigrationPlan, MigrationRequest,
    MigrationSnapshot, MigrationState, MigrationStep, SourceBalance, TurnstileConfig,
    MIN_MIGRATION_AMOUNT,
};
use crate::error::{TurnstileError, TurnstileResult};
use crate::ports::{MigrationStore, TimeSource};
use chrono::{DateTime, Utc};
use shared_bus::{component, EventPublisher, WalletEvent};
use shared_types::{AddressKind, Amount, MigrationProgress, ShieldedPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use wc_01_rpc_session::{OperationState, Recipient, RpcError, RpcSession};

/// When the engine wants its next tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    /// Immediately.
    Now,
    /// Not before this instant.
    At(DateTime<Utc>),
    /// No migration; wait for a command.
    Idle,
    /// Finished or failed; wait for a command.
    Done,
}

enum StepCheck {
    Ready { source: String, debit: Amount },
    Unmet(String),
}

pub struct TurnstileEngine {
    config: TurnstileConfig,
    store: Arc<dyn MigrationStore>,
    clock: Arc<dyn TimeSource>,
    publisher: Arc<dyn EventPublisher>,
    state: MigrationState,
}

impl TurnstileEngine {
    /// Validate `config`, load any persisted migration and resume it.
    pub async fn open(
        config: TurnstileConfig,
        store: Arc<dyn MigrationStore>,
        clock: Arc<dyn TimeSource>,
        publisher: Arc<dyn EventPublisher>,
    ) -> TurnstileResult<Self> {
        config.validate()?;
        let state = store.load()?.unwrap_or_default();
        let mut engine = Self {
            config,
            store,
            clock,
            publisher,
            state,
        };
        engine.resume().await;
        Ok(engine)
    }

    async fn resume(&mut self) {
        let phase = self.state.phase.clone();
        if phase == MigrationPhase::Idle {
            return;
        }
        let Some(plan_id) = self.state.plan.as_ref().map(|p| p.id) else {
            if phase.is_active() {
                warn!(phase = phase.label(), "[wc-04] Persisted migration has no plan, discarding");
                self.state = MigrationState::default();
                if let Err(e) = self.store.clear() {
                    warn!(error = %e, "[wc-04] Failed to clear migration store");
                }
            }
            return;
        };

        if phase == MigrationPhase::Completed {
            self.state = MigrationState::default();
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "[wc-04] Failed to clear migration store");
            }
            return;
        }

        if phase.is_in_flight() {
            let unknown = self.open_hop().map(|(step, hop)| {
                (step, hop, self.state.steps[step as usize].hops[hop].outcome_unknown())
            });
            match unknown {
                Some((step, hop, true)) => {
                    let _ = self
                        .fail(format!(
                            "hop {hop} of step {step} was being submitted when the wallet stopped; its outcome is unknown"
                        ))
                        .await;
                    return;
                }
                None => {
                    let _ = self
                        .fail(format!("{} without an open step", phase.label()))
                        .await;
                    return;
                }
                Some(_) => {}
            }
        }

        info!(
            %plan_id,
            phase = phase.label(),
            completed_steps = self.state.completed_steps(),
            "[wc-04] Resuming persisted migration"
        );
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    #[must_use]
    pub fn phase(&self) -> &MigrationPhase {
        &self.state.phase
    }

    #[must_use]
    pub fn plan(&self) -> Option<&MigrationPlan> {
        self.state.plan.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &TurnstileConfig {
        &self.config
    }

    #[must_use]
    pub fn progress(&self) -> MigrationProgress {
        self.state.progress()
    }

    #[must_use]
    pub fn snapshot(&self) -> MigrationSnapshot {
        MigrationSnapshot::from(&self.state)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Wake-up wanted by the current phase without doing any work.
    #[must_use]
    pub fn pending_wake(&self) -> Wake {
        match &self.state.phase {
            MigrationPhase::Idle => Wake::Idle,
            MigrationPhase::Completed | MigrationPhase::Failed { .. } => Wake::Done,
            MigrationPhase::WaitingInterval { until } => Wake::At(*until),
            _ => Wake::Now,
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Lock a new plan. Nothing is stored unless every check passes.
    pub async fn begin(
        &mut self,
        session: &RpcSession,
        request: MigrationRequest,
    ) -> TurnstileResult<MigrationPlan> {
        if self.state.phase != MigrationPhase::Idle {
            return Err(TurnstileError::AlreadyActive(
                self.state.phase.label().to_string(),
            ));
        }
        if AddressKind::classify(&request.destination)
            != AddressKind::Shielded(ShieldedPool::Sapling)
        {
            return Err(TurnstileError::InvalidAddress {
                address: request.destination,
                reason: "destination must be a Sapling address".into(),
            });
        }

        let sources = match request.sources {
            Some(list) => {
                let mut sources: Vec<String> = Vec::with_capacity(list.len());
                for address in list {
                    if AddressKind::classify(&address) != AddressKind::Shielded(ShieldedPool::Sprout)
                    {
                        return Err(TurnstileError::InvalidAddress {
                            address,
                            reason: "source must be a Sprout address".into(),
                        });
                    }
                    if !sources.contains(&address) {
                        sources.push(address);
                    }
                }
                sources
            }
            None => session
                .z_list_addresses()
                .await?
                .into_iter()
                .filter(|a| AddressKind::classify(a) == AddressKind::Shielded(ShieldedPool::Sprout))
                .collect(),
        };
        if sources.is_empty() {
            return Err(TurnstileError::Precondition(
                "no Sprout addresses to migrate".into(),
            ));
        }

        let notes = session.z_list_unspent(0, &sources).await?;
        if let Some(note) = notes.iter().find(|n| n.confirmations == 0) {
            return Err(TurnstileError::Precondition(format!(
                "unconfirmed funds at {}",
                note.address
            )));
        }

        let dust = self.config.step_fees();
        let mut balances = Vec::with_capacity(sources.len());
        for address in sources {
            let balance = session
                .z_get_balance(&address, self.config.min_confirmations)
                .await?;
            if balance > dust {
                balances.push(SourceBalance { address, balance });
            } else {
                debug!(%address, %balance, "[wc-04] Skipping source below hop fees");
            }
        }
        let total: Amount = balances.iter().map(|s| s.balance).sum();
        if total < MIN_MIGRATION_AMOUNT {
            return Err(TurnstileError::Precondition(format!(
                "insufficient confirmed balance: {total} is below {MIN_MIGRATION_AMOUNT}"
            )));
        }

        let plan = MigrationPlan::new(
            request.destination,
            balances,
            self.config.hop_fee,
            self.config.step_cap,
            self.config.step_interval,
            self.clock.now(),
        );
        let locked = MigrationState::locked(plan.clone());
        self.commit(|state| *state = locked)?;

        info!(
            plan_id = %plan.id,
            destination = %plan.destination,
            sources = plan.sources.len(),
            %total,
            estimated_steps = plan.estimated_steps,
            "[wc-04] Migration plan locked"
        );
        self.publish_progress().await;
        Ok(plan)
    }

    /// Forget a finished or failed migration.
    pub async fn reset(&mut self) -> TurnstileResult<()> {
        match &self.state.phase {
            MigrationPhase::Idle => Ok(()),
            phase if phase.is_terminal() => {
                self.store.clear()?;
                self.state = MigrationState::default();
                info!("[wc-04] Migration reset");
                self.publish_progress().await;
                Ok(())
            }
            phase => Err(TurnstileError::AlreadyActive(phase.label().to_string())),
        }
    }

    /// Abandon an active migration. Hops already sent stay where they are.
    pub async fn cancel(&mut self) -> TurnstileResult<()> {
        if !self.state.phase.is_active() {
            return Err(TurnstileError::NothingTo("cancel"));
        }
        self.store.clear()?;
        let plan_id = self.plan_id();
        warn!(
            %plan_id,
            phase = self.state.phase.label(),
            completed_steps = self.state.completed_steps(),
            "[wc-04] Migration cancelled"
        );
        self.state = MigrationState::default();
        self.publisher
            .publish(WalletEvent::MigrationFinished {
                plan_id,
                failed: Some("cancelled".into()),
            })
            .await;
        self.publish_progress().await;
        Ok(())
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advance the migration by one unit of work.
    ///
    /// RPC failures while polling come back as `Err` with the state left
    /// untouched; the caller retries later.
    pub async fn tick(&mut self, session: &RpcSession) -> TurnstileResult<Wake> {
        match self.state.phase.clone() {
            MigrationPhase::Idle => Ok(Wake::Idle),
            MigrationPhase::Completed | MigrationPhase::Failed { .. } => Ok(Wake::Done),
            MigrationPhase::Locked => self.start_step(session).await,
            MigrationPhase::ComputingTx => self.poll_operation(session).await,
            MigrationPhase::Broadcasting => self.mark_broadcast(),
            MigrationPhase::AwaitingConfirmation => self.poll_confirmation(session).await,
            MigrationPhase::WaitingInterval { until } => {
                if self.clock.now() < until {
                    return Ok(Wake::At(until));
                }
                self.commit(|state| state.phase = MigrationPhase::Locked)?;
                Ok(Wake::Now)
            }
        }
    }

    async fn start_step(&mut self, session: &RpcSession) -> TurnstileResult<Wake> {
        let Some(plan) = self.state.plan.clone() else {
            return self.fail("migration locked without a plan".into()).await;
        };
        if self.state.pending_sources(plan.dust_limit()).is_empty() {
            return self.complete().await;
        }

        match self.check_step(session, &plan).await? {
            StepCheck::Unmet(reason) => self.defer(reason).await,
            StepCheck::Ready { source, debit } => {
                let intermediate = session.get_new_address().await?;
                let index = u32::try_from(self.state.steps.len()).unwrap_or(u32::MAX);
                let step = MigrationStep::new(
                    index,
                    &source,
                    &intermediate,
                    &plan.destination,
                    debit,
                    plan.hop_fee,
                );
                info!(
                    step = index,
                    %source,
                    %intermediate,
                    %debit,
                    "[wc-04] Starting migration step"
                );
                self.submit_hop(session, Some(step)).await
            }
        }
    }

    /// Preconditions for the next step, evaluated against live balances.
    async fn check_step(
        &self,
        session: &RpcSession,
        plan: &MigrationPlan,
    ) -> TurnstileResult<StepCheck> {
        // The connection may have been Connected when this tick started and
        // still fall behind later; spends wait for a caught-up node.
        let sync = session.sync_info().await?;
        if sync.peers == 0 {
            return Ok(StepCheck::Unmet("node has no peers".into()));
        }
        if sync.lag > 0 {
            return Ok(StepCheck::Unmet(format!(
                "node is syncing: {} blocks behind",
                sync.lag
            )));
        }

        let dust = plan.dust_limit();
        let pending: Vec<SourceBalance> = self
            .state
            .pending_sources(dust)
            .into_iter()
            .cloned()
            .collect();
        let addresses: Vec<String> = pending.iter().map(|s| s.address.clone()).collect();

        let notes = session.z_list_unspent(0, &addresses).await?;
        if let Some(note) = notes
            .iter()
            .find(|n| n.confirmations == 0 && addresses.contains(&n.address))
        {
            return Ok(StepCheck::Unmet(format!(
                "unconfirmed funds at {}",
                note.address
            )));
        }

        let mut confirmed = Vec::with_capacity(pending.len());
        for source in &pending {
            confirmed.push(
                session
                    .z_get_balance(&source.address, self.config.min_confirmations)
                    .await?,
            );
        }
        let aggregate: Amount = confirmed.iter().copied().sum();
        let outstanding: Amount = pending.iter().map(|s| s.balance).sum();
        let floor = MIN_MIGRATION_AMOUNT.min(outstanding);
        if aggregate < floor {
            return Ok(StepCheck::Unmet(format!(
                "insufficient confirmed balance: {aggregate} is below {floor}"
            )));
        }

        for (source, balance) in pending.iter().zip(confirmed) {
            let debit = source.balance.min(plan.step_cap).min(balance);
            if debit > dust {
                return Ok(StepCheck::Ready {
                    source: source.address.clone(),
                    debit,
                });
            }
        }
        Ok(StepCheck::Unmet(
            "no source has enough confirmed balance to cover the hop fees".into(),
        ))
    }

    async fn defer(&mut self, reason: String) -> TurnstileResult<Wake> {
        let retry_at = self.after(self.config.precondition_recheck);
        warn!(%reason, %retry_at, "[wc-04] Migration step deferred");
        self.publisher
            .publish(WalletEvent::PreconditionUnmet { reason })
            .await;
        Ok(Wake::At(retry_at))
    }

    /// Send the first unsettled hop of the open step, pushing `new_step`
    /// first when given.
    async fn submit_hop(
        &mut self,
        session: &RpcSession,
        new_step: Option<MigrationStep>,
    ) -> TurnstileResult<Wake> {
        let now = self.clock.now();
        self.commit(|state| {
            if let Some(step) = new_step {
                state.steps.push(step);
            }
            if let Some(step) = state.open_step_mut() {
                if let Some(hop) = step.current_hop() {
                    step.hops[hop].mark_submitting(now);
                }
            }
            state.phase = MigrationPhase::ComputingTx;
            state.polls = 0;
        })?;

        let Some((index, hop)) = self.open_hop() else {
            return self.fail("no hop left to submit".into()).await;
        };
        let step = &self.state.steps[index as usize];
        let record = &step.hops[hop];
        let from = record.from.clone();
        let recipient = Recipient {
            address: record.to.clone(),
            amount: record.amount,
        };
        // Funds on the intermediate address may still be unconfirmed after
        // a degraded first hop.
        let min_conf = match step.hops.first() {
            Some(first) if hop > 0 && first.status == ConfirmationStatus::Degraded => 0,
            _ => self.config.min_confirmations,
        };

        match session
            .z_send_many(&from, &[recipient], min_conf, self.config.hop_fee)
            .await
        {
            Ok(opid) => {
                info!(step = index, hop, %opid, "[wc-04] Hop submitted");
                self.record(|state| {
                    if let Some(step) = state.open_step_mut() {
                        step.hops[hop].opid = Some(opid);
                    }
                });
                Ok(Wake::At(self.after(self.config.operation_poll_interval)))
            }
            Err(e @ RpcError::Application { .. }) => {
                self.fail(format!("hop {hop} of step {index} was rejected: {e}"))
                    .await
            }
            Err(e) => {
                self.fail(format!(
                    "hop {hop} of step {index} has an unknown outcome: {e}"
                ))
                .await
            }
        }
    }

    async fn poll_operation(&mut self, session: &RpcSession) -> TurnstileResult<Wake> {
        let Some((index, hop)) = self.open_hop() else {
            return self.fail("computing transaction without an open step".into()).await;
        };
        let record = &self.state.steps[index as usize].hops[hop];
        let Some(opid) = record.opid.clone() else {
            if record.outcome_unknown() {
                return self
                    .fail(format!("hop {hop} of step {index} has an unknown outcome"))
                    .await;
            }
            return self.submit_hop(session, None).await;
        };

        let Some(status) = session.z_get_operation_status(&opid).await? else {
            return self
                .fail(format!(
                    "operation {opid} for hop {hop} of step {index} is unknown to the daemon"
                ))
                .await;
        };

        match status.status {
            OperationState::Queued | OperationState::Executing => {
                let polls = self.state.polls + 1;
                if polls >= self.config.max_operation_polls {
                    return self
                        .fail(format!("operation {opid} did not finish after {polls} polls"))
                        .await;
                }
                self.state.polls = polls;
                debug!(%opid, polls, "[wc-04] Operation still running");
                Ok(Wake::At(self.after(self.config.operation_poll_interval)))
            }
            OperationState::Success => {
                let Some(txid) = status.txid().map(str::to_string) else {
                    return self
                        .fail(format!("operation {opid} succeeded without a txid"))
                        .await;
                };
                let mut fresh = false;
                self.record(|state| {
                    if let Some(step) = state.open_step_mut() {
                        fresh = step.hops[hop].record_txid(&txid);
                    }
                    state.phase = MigrationPhase::Broadcasting;
                    state.polls = 0;
                });
                if !fresh {
                    warn!(%opid, %txid, "[wc-04] Hop already had a txid, keeping the recorded one");
                }
                info!(step = index, hop, %txid, "[wc-04] Hop transaction created");
                self.publisher
                    .publish(WalletEvent::MigrationStepRecorded {
                        step_index: index,
                        hop: u8::try_from(hop).unwrap_or(u8::MAX),
                        txid,
                    })
                    .await;
                Ok(Wake::Now)
            }
            OperationState::Failed | OperationState::Cancelled => {
                self.fail(format!(
                    "hop {hop} of step {index} failed: {}",
                    status.error_message()
                ))
                .await
            }
        }
    }

    fn mark_broadcast(&mut self) -> TurnstileResult<Wake> {
        let now = self.clock.now();
        self.commit(|state| {
            if let Some(step) = state.open_step_mut() {
                if let Some(hop) = step.current_hop() {
                    step.hops[hop].broadcast_at.get_or_insert(now);
                }
            }
            state.phase = MigrationPhase::AwaitingConfirmation;
            state.polls = 0;
        })?;
        Ok(Wake::Now)
    }

    async fn poll_confirmation(&mut self, session: &RpcSession) -> TurnstileResult<Wake> {
        let Some((index, hop)) = self.open_hop() else {
            return self
                .fail("awaiting confirmation without an open step".into())
                .await;
        };
        let Some(txid) = self.state.steps[index as usize].hops[hop].txid.clone() else {
            return self
                .fail(format!("hop {hop} of step {index} has no txid to confirm"))
                .await;
        };

        let tx = session.get_transaction(&txid).await?;
        if let Some(step) = self.state.open_step_mut() {
            step.hops[hop].confirmations = tx.confirmations;
        }
        if tx.confirmations < 0 {
            return self
                .fail(format!("transaction {txid} conflicts with the best chain"))
                .await;
        }
        if tx.confirmations >= i64::from(self.config.min_confirmations) {
            debug!(%txid, confirmations = tx.confirmations, "[wc-04] Hop confirmed");
            return self.settle_hop(ConfirmationStatus::Confirmed).await;
        }

        let polls = self.state.polls + 1;
        if polls >= self.config.max_confirmation_polls {
            warn!(
                step = index,
                hop,
                %txid,
                polls,
                policy = ?self.config.degraded_policy,
                "[wc-04] Hop not confirmed within the poll budget"
            );
            return match self.config.degraded_policy {
                DegradedPolicy::Halt => {
                    self.fail(format!(
                        "transaction {txid} still unconfirmed after {polls} polls"
                    ))
                    .await
                }
                DegradedPolicy::Continue => self.settle_hop(ConfirmationStatus::Degraded).await,
            };
        }
        self.state.polls = polls;
        Ok(Wake::At(self.after(self.config.confirmation_poll_interval)))
    }

    /// Close the current hop with `status` and move to the next hop, the
    /// next step, or completion.
    async fn settle_hop(&mut self, status: ConfirmationStatus) -> TurnstileResult<Wake> {
        let Some((index, hop)) = self.open_hop() else {
            return self.fail("no hop to settle".into()).await;
        };
        let step = &self.state.steps[index as usize];
        if hop + 1 < step.hops.len() {
            self.commit(|state| {
                if let Some(step) = state.open_step_mut() {
                    step.hops[hop].status = status;
                }
                state.phase = MigrationPhase::ComputingTx;
                state.polls = 0;
            })?;
            return Ok(Wake::Now);
        }

        let source = step.source.clone();
        let debit = step.debit;
        let dust = self.config.step_fees();
        let mut next = self.state.clone();
        if let Some(step) = next.steps.last_mut() {
            step.hops[hop].status = status;
            step.status = step.settled_status();
        }
        next.debit_source(&source, debit);
        next.last_completed_step = Some(index);
        next.polls = 0;

        if next.pending_sources(dust).is_empty() {
            self.state = next;
            return self.complete().await;
        }

        let until = self.after(self.config.step_interval);
        next.phase = MigrationPhase::WaitingInterval { until };
        self.store.save(&next)?;
        self.state = next;
        info!(step = index, %debit, next_step_at = %until, "[wc-04] Migration step finished");
        self.publish_progress().await;
        Ok(Wake::At(until))
    }

    async fn complete(&mut self) -> TurnstileResult<Wake> {
        self.state.phase = MigrationPhase::Completed;
        self.state.polls = 0;
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "[wc-04] Failed to clear migration store");
        }
        let plan_id = self.plan_id();
        info!(%plan_id, steps = self.state.completed_steps(), "[wc-04] Migration completed");
        self.publish_progress().await;
        self.publisher
            .publish(WalletEvent::MigrationFinished {
                plan_id,
                failed: None,
            })
            .await;
        Ok(Wake::Done)
    }

    async fn fail(&mut self, reason: String) -> TurnstileResult<Wake> {
        error!(%reason, "[wc-04] Migration failed");
        if let Some(step) = self.state.open_step_mut() {
            if let Some(hop) = step.current_hop() {
                step.hops[hop].status = ConfirmationStatus::Failed;
            }
            step.status = ConfirmationStatus::Failed;
        }
        self.state.phase = MigrationPhase::Failed {
            reason: reason.clone(),
        };
        self.state.polls = 0;
        if let Err(e) = self.store.save(&self.state) {
            warn!(error = %e, "[wc-04] Failed to persist migration failure");
        }

        let plan_id = self.plan_id();
        self.publisher
            .publish(WalletEvent::TerminalError {
                source: component::TURNSTILE,
                reason: None,
                message: reason.clone(),
            })
            .await;
        self.publisher
            .publish(WalletEvent::MigrationFinished {
                plan_id,
                failed: Some(reason),
            })
            .await;
        Ok(Wake::Done)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// `(step index, hop index)` of the first unsettled hop of the last step.
    fn open_hop(&self) -> Option<(u32, usize)> {
        let step = self.state.open_step()?;
        let hop = step.current_hop()?;
        let position = self.state.steps.len().checked_sub(1)?;
        Some((u32::try_from(position).ok()?, hop))
    }

    /// Apply `update` only if the result was persisted.
    fn commit(&mut self, update: impl FnOnce(&mut MigrationState)) -> TurnstileResult<()> {
        let mut next = self.state.clone();
        update(&mut next);
        self.store.save(&next)?;
        self.state = next;
        Ok(())
    }

    /// Apply `update` unconditionally. Used for facts the daemon already
    /// acted on; a failed save is logged and retried by the next commit.
    fn record(&mut self, update: impl FnOnce(&mut MigrationState)) {
        update(&mut self.state);
        if let Err(e) = self.store.save(&self.state) {
            warn!(error = %e, "[wc-04] Failed to persist migration state");
        }
    }

    fn after(&self, delay: Duration) -> DateTime<Utc> {
        let now = self.clock.now();
        chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(now)
    }

    fn plan_id(&self) -> String {
        self.state
            .plan
            .as_ref()
            .map(|p| p.id.to_string())
            .unwrap_or_default()
    }

    async fn publish_progress(&self) {
        self.publisher
            .publish(WalletEvent::MigrationProgress(self.state.progress()))
            .await;
    }
}

impl std::fmt::Debug for TurnstileEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnstileEngine")
            .field("phase", &self.state.phase)
            .field("plan", &self.state.plan.as_ref().map(|p| p.id))
            .field("steps", &self.state.steps.len())
            .finish_non_exhaustive()
    }
}
