//! Daemon exit classification and restart budget.

use std::fmt;

/// How the daemon ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// We asked it to stop.
    Graceful,
    /// Exit code 0 without a request: someone else stopped it.
    External,
    /// Exit code 1: the daemon refused its configuration.
    Misconfiguration,
    /// Any other code, or killed by a signal.
    Crashed,
}

impl ExitKind {
    #[must_use]
    pub fn classify(stop_requested: bool, code: Option<i32>) -> Self {
        if stop_requested {
            return ExitKind::Graceful;
        }
        match code {
            Some(0) => ExitKind::External,
            Some(1) => ExitKind::Misconfiguration,
            _ => ExitKind::Crashed,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ExitKind::Graceful => "graceful",
            ExitKind::External => "external",
            ExitKind::Misconfiguration => "misconfiguration",
            ExitKind::Crashed => "crashed",
        }
    }

    /// Restarting only makes sense when the daemon died on its own.
    #[must_use]
    pub const fn is_restartable(self) -> bool {
        matches!(self, ExitKind::Crashed)
    }
}

/// A finished daemon process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonExit {
    pub kind: ExitKind,
    pub code: Option<i32>,
    /// Captured stderr (tail).
    pub output: String,
}

impl DaemonExit {
    #[must_use]
    pub fn summary(&self) -> String {
        match self.code {
            Some(code) => format!("{} (exit code {code})", self.kind.as_str()),
            None => format!("{} (terminated by signal)", self.kind.as_str()),
        }
    }
}

impl fmt::Display for DaemonExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())?;
        if !self.output.is_empty() {
            write!(f, ": {}", self.output.trim())?;
        }
        Ok(())
    }
}

/// Bounded number of automatic relaunches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    max_restarts: u32,
    used: u32,
}

impl RestartPolicy {
    #[must_use]
    pub const fn new(max_restarts: u32) -> Self {
        Self {
            max_restarts,
            used: 0,
        }
    }

    /// Consume one restart if any remain.
    pub fn try_consume(&mut self) -> bool {
        if self.used < self.max_restarts {
            self.used += 1;
            true
        } else {
            false
        }
    }

    /// Called once the daemon is healthy again.
    pub fn reset(&mut self) {
        self.used = 0;
    }

    #[must_use]
    pub const fn used(&self) -> u32 {
        self.used
    }

    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.max_restarts.saturating_sub(self.used)
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
