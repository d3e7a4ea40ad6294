//! Step and hop records.
//!
//! A step moves one debit out of a Sprout address in two hops:
//!
//! ```text
//!   hop 0:  source (Sprout) ──(debit - fee)──→ intermediate (transparent)
//!   hop 1:  intermediate ──(debit - 2·fee)──→ destination (Sapling)
//! ```
//!
//! Records are append-only. A txid, once recorded, is never replaced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::Amount;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    #[default]
    Pending,
    Confirmed,
    /// Gave up waiting for the confirmation target.
    Degraded,
    Failed,
}

impl ConfirmationStatus {
    /// The hop is finished and the step may move on.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, ConfirmationStatus::Confirmed | ConfirmationStatus::Degraded)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopRecord {
    pub from: String,
    pub to: String,
    pub amount: Amount,
    /// Set right before `z_sendmany` is issued.
    pub submitting: bool,
    pub opid: Option<String>,
    pub txid: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub broadcast_at: Option<DateTime<Utc>>,
    pub confirmations: i64,
    pub status: ConfirmationStatus,
}

impl HopRecord {
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: Amount) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
            submitting: false,
            opid: None,
            txid: None,
            submitted_at: None,
            broadcast_at: None,
            confirmations: 0,
            status: ConfirmationStatus::Pending,
        }
    }

    pub fn mark_submitting(&mut self, now: DateTime<Utc>) {
        self.submitting = true;
        self.submitted_at = Some(now);
    }

    /// A send was issued but its operation id never made it to disk, so
    /// whether funds moved cannot be known.
    #[must_use]
    pub fn outcome_unknown(&self) -> bool {
        self.submitting && self.opid.is_none() && self.txid.is_none()
    }

    /// Store the txid. Returns `false` and keeps the old value if one is
    /// already recorded.
    pub fn record_txid(&mut self, txid: &str) -> bool {
        if self.txid.is_some() {
            return false;
        }
        self.txid = Some(txid.to_string());
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub index: u32,
    pub source: String,
    pub intermediate: String,
    pub debit: Amount,
    pub hops: Vec<HopRecord>,
    pub status: ConfirmationStatus,
}

impl MigrationStep {
    /// Lay out both hops for `debit` taken from `source`.
    #[must_use]
    pub fn new(
        index: u32,
        source: &str,
        intermediate: &str,
        destination: &str,
        debit: Amount,
        hop_fee: Amount,
    ) -> Self {
        let first = debit.saturating_sub(hop_fee);
        let second = first.saturating_sub(hop_fee);
        Self {
            index,
            source: source.to_string(),
            intermediate: intermediate.to_string(),
            debit,
            hops: vec![
                HopRecord::new(source, intermediate, first),
                HopRecord::new(intermediate, destination, second),
            ],
            status: ConfirmationStatus::Pending,
        }
    }

    /// Index of the first hop that is not settled.
    #[must_use]
    pub fn current_hop(&self) -> Option<usize> {
        self.hops.iter().position(|h| !h.status.is_settled())
    }

    /// Status the step takes once every hop settled.
    #[must_use]
    pub fn settled_status(&self) -> ConfirmationStatus {
        if self
            .hops
            .iter()
            .all(|h| h.status == ConfirmationStatus::Confirmed)
        {
            ConfirmationStatus::Confirmed
        } else {
            ConfirmationStatus::Degraded
        }
    }
}
