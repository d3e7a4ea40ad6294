//! # Shutdown Signal
//!
//! One controller, many cheap listeners. Every spawned task takes a
//! [`ShutdownSignal`] and selects on [`ShutdownSignal::triggered`].

use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of the shutdown channel.
#[derive(Debug)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

/// Listener side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
    /// Set only by [`ShutdownSignal::never`], which has no controller.
    _detached: Option<Arc<watch::Sender<bool>>>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    #[must_use]
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
            _detached: None,
        }
    }

    /// Ask every listener to stop. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// A signal that never fires. Useful for one-shot calls in tests.
    #[must_use]
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _detached: Some(Arc::new(tx)),
        }
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested or the controller is dropped.
    pub async fn triggered(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
