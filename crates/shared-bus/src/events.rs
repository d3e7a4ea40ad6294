//! # Wallet Events
//!
//! Every event that flows through the shared bus. Observers (UI shell, logs,
//! tests) subscribe with an [`EventFilter`]; producers never know who listens.

use serde::{Deserialize, Serialize};
use shared_types::{DownloadProgress, FailureReason, MigrationProgress, StatusSnapshot};

/// Component identifiers used as event sources.
pub mod component {
    pub const RPC_SESSION: u8 = 1;
    pub const DAEMON_SUPERVISOR: u8 = 2;
    pub const CONNECTION: u8 = 3;
    pub const TURNSTILE: u8 = 4;
    pub const RUNTIME: u8 = 0;
}

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalletEvent {
    // =========================================================================
    // CONNECTION (wc-03)
    // =========================================================================
    /// Connection status changed. Emitted exactly once per actual change.
    StatusChanged(StatusSnapshot),

    // =========================================================================
    // DAEMON SUPERVISOR (wc-02)
    // =========================================================================
    /// Proving-parameter download advanced.
    ParamsProgress(DownloadProgress),

    /// Embedded daemon exited without being asked to.
    DaemonExited {
        /// `external`, `misconfiguration` or `crashed`.
        kind: String,
        exit_code: Option<i32>,
        output: Option<String>,
    },

    // =========================================================================
    // TURNSTILE (wc-04)
    // =========================================================================
    /// Migration progress changed.
    MigrationProgress(MigrationProgress),

    /// A migration hop obtained its transaction id.
    MigrationStepRecorded {
        step_index: u32,
        hop: u8,
        txid: String,
    },

    /// A step was deferred because its preconditions do not hold.
    PreconditionUnmet { reason: String },

    /// The migration plan finished; `failed` carries the reason on failure.
    MigrationFinished {
        plan_id: String,
        failed: Option<String>,
    },

    // =========================================================================
    // ANY COMPONENT
    // =========================================================================
    /// A terminal error that requires user attention.
    TerminalError {
        source: u8,
        reason: Option<FailureReason>,
        message: String,
    },
}

/// Coarse grouping used for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    Connection,
    Daemon,
    Migration,
    Errors,
    All,
}

impl WalletEvent {
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            WalletEvent::StatusChanged(_) => EventTopic::Connection,
            WalletEvent::ParamsProgress(_) | WalletEvent::DaemonExited { .. } => {
                EventTopic::Daemon
            }
            WalletEvent::MigrationProgress(_)
            | WalletEvent::MigrationStepRecorded { .. }
            | WalletEvent::PreconditionUnmet { .. }
            | WalletEvent::MigrationFinished { .. } => EventTopic::Migration,
            WalletEvent::TerminalError { .. } => EventTopic::Errors,
        }
    }

    #[must_use]
    pub fn source_component(&self) -> u8 {
        match self {
            WalletEvent::StatusChanged(_) => component::CONNECTION,
            WalletEvent::ParamsProgress(_) | WalletEvent::DaemonExited { .. } => {
                component::DAEMON_SUPERVISOR
            }
            WalletEvent::MigrationProgress(_)
            | WalletEvent::MigrationStepRecorded { .. }
            | WalletEvent::PreconditionUnmet { .. }
            | WalletEvent::MigrationFinished { .. } => component::TURNSTILE,
            WalletEvent::TerminalError { source, .. } => *source,
        }
    }
}

/// Which events a subscriber wants. Both lists empty accepts everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub topics: Vec<EventTopic>,
    /// See [`component`].
    pub source_components: Vec<u8>,
}

impl EventFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_components(components: Vec<u8>) -> Self {
        Self {
            source_components: components,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn matches(&self, event: &WalletEvent) -> bool {
        let wants_topic = |t: &EventTopic| *t == EventTopic::All || *t == event.topic();
        let topic_ok = self.topics.is_empty() || self.topics.iter().any(wants_topic);
        let source_ok = self.source_components.is_empty()
            || self.source_components.contains(&event.source_component());
        topic_ok && source_ok
    }
}
