//! # Application Context
//!
//! The single owned root of a running wallet. Built from a validated
//! [`WalletConfig`], it wires the subsystems together and is the only place
//! that knows about all of them.
//!
//! ```text
//!   DaemonSupervisor (wc-02) ──owned by──→ ConnectionStateMachine (wc-03)
//!                                                │
//!                                    ConnectionService task
//!                                      │ status watch │ session watch
//!                                      ↓              ↓
//!                                    MigrationRunner task (wc-04)
//!
//!   every subsystem ──WalletEvent──→ InMemoryEventBus ──→ event log task
//! ```
//!
//! ## Shutdown
//!
//! [`AppContext::shutdown`] triggers the shared [`ShutdownController`] and
//! awaits every task. The connection service stops an owned daemon before
//! its task ends, so returning from `shutdown` means the daemon is gone.

use crate::container::config::WalletConfig;
use anyhow::{bail, Context, Result};
use shared_bus::{
    EventFilter, EventPublisher, InMemoryEventBus, ShutdownController, ShutdownSignal,
    Subscription, WalletEvent,
};
use shared_types::{ConnectionStatus, StatusSnapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wc_02_daemon_supervisor::{DaemonSupervisor, HttpParamsDownloader, TokioProcessLauncher};
use wc_03_connection::{
    ConnectionHandle, ConnectionMode, ConnectionService, ConnectionStateMachine,
    HttpSessionFactory,
};
use wc_04_turnstile::{
    JsonFileStore, MigrationRequest, MigrationRunner, SystemTimeSource, TurnstileEngine,
    TurnstileError, TurnstileHandle,
};

pub struct AppContext {
    config: WalletConfig,
    datadir: PathBuf,
    bus: Arc<InMemoryEventBus>,
    shutdown: ShutdownController,
    connection: Option<ConnectionHandle>,
    turnstile: Option<TurnstileHandle>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl AppContext {
    pub fn new(config: WalletConfig) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let datadir = config
            .datadir()
            .context("no data directory could be determined")?;
        info!(
            datadir = %datadir.display(),
            mode = ?config.mode(),
            network = ?config.network(),
            "Creating wallet runtime"
        );
        Ok(Self {
            config,
            datadir,
            bus: Arc::new(InMemoryEventBus::new()),
            shutdown: ShutdownController::new(),
            connection: None,
            turnstile: None,
            tasks: Vec::new(),
        })
    }

    /// Spawn every subsystem task and begin connecting.
    ///
    /// ## Start-up Order
    ///
    /// 1. Event log task
    /// 2. Connection service (owning the supervisor unless in manual mode)
    /// 3. Migration runner, resuming any persisted plan once connected
    /// 4. Connection attempt
    /// 5. Requested migration, begun after the first `Connected`
    pub async fn start(&mut self) -> Result<()> {
        if self.connection.is_some() {
            bail!("wallet runtime already started");
        }
        let publisher: Arc<dyn EventPublisher> = self.bus.clone();

        let events = self.bus.subscribe(EventFilter::all());
        self.spawn_task("event-log", log_events(events, self.shutdown.signal()));

        let supervisor = match self.config.mode() {
            ConnectionMode::Manual => None,
            ConnectionMode::Embedded | ConnectionMode::AttachOnly => {
                let downloader = HttpParamsDownloader::new(
                    self.config.supervisor.params_url.clone(),
                    self.config.connection.tor,
                )
                .context("failed to build the params downloader")?;
                Some(DaemonSupervisor::new(
                    self.config.supervisor_config(&self.datadir),
                    Arc::new(TokioProcessLauncher::new()),
                    Arc::new(downloader),
                    Arc::clone(&publisher),
                ))
            }
        };
        let sessions = Arc::new(HttpSessionFactory::new(self.config.request_timeout()));
        let machine = ConnectionStateMachine::new(sessions, supervisor, Arc::clone(&publisher))
            .with_policy(self.config.retry_policy());
        let (connection, connection_task) =
            ConnectionService::spawn(machine, self.shutdown.signal());
        self.tasks.push(("connection", connection_task));

        let turnstile_config = self.config.turnstile_config()?;
        let store = JsonFileStore::in_datadir(&self.datadir, &turnstile_config);
        debug!(path = %store.path().display(), "Migration state file");
        let engine = TurnstileEngine::open(
            turnstile_config,
            Arc::new(store),
            Arc::new(SystemTimeSource),
            publisher,
        )
        .await
        .context("failed to open the migration state")?;
        let (turnstile, runner_task) = MigrationRunner::spawn(
            engine,
            connection.status_watch(),
            connection.session_watch(),
            self.shutdown.signal(),
        );
        self.tasks.push(("turnstile", runner_task));

        self.connection = Some(connection.clone());
        self.turnstile = Some(turnstile.clone());

        connection
            .start(self.config.connection_config(&self.datadir))
            .await
            .context("failed to start the connection")?;

        if let Some(request) = self.config.migration_request() {
            self.spawn_task(
                "migration-start",
                begin_when_connected(
                    turnstile,
                    connection.status_watch(),
                    request,
                    self.shutdown.signal(),
                ),
            );
        }

        info!("Wallet runtime started");
        Ok(())
    }

    /// Trigger shutdown and wait for every task to finish.
    pub async fn shutdown(mut self) {
        info!("Shutting down wallet runtime");
        self.shutdown.trigger();
        for (name, task) in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "Task ended abnormally");
            }
        }
        info!("Wallet runtime stopped");
    }

    fn spawn_task<F>(&mut self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.push((name, tokio::spawn(future)));
    }

    #[must_use]
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    #[must_use]
    pub fn datadir(&self) -> &Path {
        &self.datadir
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    /// `None` until [`AppContext::start`] has run.
    #[must_use]
    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    /// `None` until [`AppContext::start`] has run.
    #[must_use]
    pub fn turnstile(&self) -> Option<&TurnstileHandle> {
        self.turnstile.as_ref()
    }

    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("datadir", &self.datadir)
            .field("mode", &self.config.mode())
            .field("started", &self.connection.is_some())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

async fn begin_when_connected(
    turnstile: TurnstileHandle,
    mut status: watch::Receiver<StatusSnapshot>,
    request: MigrationRequest,
    mut shutdown: ShutdownSignal,
) {
    tokio::select! {
        _ = shutdown.triggered() => return,
        ready = status.wait_for(|s| s.status == ConnectionStatus::Connected) => {
            if ready.is_err() {
                return;
            }
        }
    }

    match turnstile.begin(request).await {
        Ok(plan) => info!(
            plan_id = %plan.id,
            total = %plan.total(),
            estimated_steps = plan.estimated_steps,
            "Migration started"
        ),
        Err(TurnstileError::AlreadyActive(phase)) => {
            info!(phase = %phase, "Migration already in progress; resuming it");
        }
        Err(e) => warn!(error = %e, "Migration could not be started"),
    }
}

async fn log_events(mut events: Subscription, mut shutdown: ShutdownSignal) {
    loop {
        let event = tokio::select! {
            _ = shutdown.triggered() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else { break };

        match event {
            WalletEvent::StatusChanged(snapshot) => {
                info!(status = ?snapshot.status, detail = %snapshot.detail, "Connection status");
            }
            WalletEvent::ParamsProgress(progress) => debug!(
                file = %progress.file,
                bytes_done = progress.bytes_done,
                bytes_total = ?progress.bytes_total,
                files_remaining = progress.files_remaining,
                "Params download"
            ),
            WalletEvent::DaemonExited {
                kind,
                exit_code,
                output,
            } => warn!(kind = %kind, exit_code = ?exit_code, output = ?output, "Daemon exited"),
            WalletEvent::MigrationProgress(progress) => info!(
                current_step = progress.current_step,
                total_steps = ?progress.total_steps,
                next_step_eta = ?progress.next_step_eta,
                "Migration progress"
            ),
            WalletEvent::MigrationStepRecorded {
                step_index,
                hop,
                txid,
            } => info!(step_index, hop, txid = %txid, "Migration transaction recorded"),
            WalletEvent::PreconditionUnmet { reason } => {
                warn!(reason = %reason, "Migration step deferred");
            }
            WalletEvent::MigrationFinished { plan_id, failed } => match failed {
                None => info!(plan_id = %plan_id, "Migration completed"),
                Some(reason) => warn!(plan_id = %plan_id, reason = %reason, "Migration stopped"),
            },
            WalletEvent::TerminalError {
                source,
                reason,
                message,
            } => error!(source, reason = ?reason, message = %message, "Terminal error"),
        }
    }
}
