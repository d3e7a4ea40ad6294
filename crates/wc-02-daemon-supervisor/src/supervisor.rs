//! # Daemon Supervisor
//!
//! Exclusive owner of the embedded daemon process.
//!
//! ## Lifecycle
//!
//! ```text
//! prepare_conf ──→ (params missing? provision) ──→ launch ──→ poll_exit ...
//!                                                     ↑            │
//!                                                     └─ restart ──┘ (crash, budget left)
//!
//! shutdown: stop RPC ──→ poll every interval (bounded) ──→ kill ──→ handle released
//! ```
//!
//! A daemon the wallet merely attached to (already running on start-up) is
//! never stopped by [`DaemonSupervisor::shutdown`].

use crate::domain::conf::{ensure_conf, DaemonConf, CONF_FILE_NAME};
use crate::domain::exit::{DaemonExit, ExitKind, RestartPolicy};
use crate::error::{SupervisorError, SupervisorResult};
use crate::ports::{DaemonProcess, LaunchSpec, ParamsDownloader, ProcessLauncher};
use crate::provisioner::{ParamsProvisioner, DEFAULT_DOWNLOAD_ATTEMPTS};
use shared_bus::{EventPublisher, WalletEvent};
use shared_types::Network;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use wc_01_rpc_session::{NodeInfo, RpcResult, RpcSession};

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub datadir: PathBuf,
    pub params_dir: PathBuf,
    pub daemon_binary: PathBuf,
    pub network: Network,
    pub use_tor: bool,
    pub max_restarts: u32,
    pub download_attempts: u32,
    pub shutdown_poll_interval: Duration,
    pub shutdown_poll_attempts: u32,
}

impl SupervisorConfig {
    #[must_use]
    pub fn new(datadir: PathBuf, params_dir: PathBuf, daemon_binary: PathBuf) -> Self {
        Self {
            datadir,
            params_dir,
            daemon_binary,
            network: Network::Mainnet,
            use_tor: false,
            max_restarts: 3,
            download_attempts: DEFAULT_DOWNLOAD_ATTEMPTS,
            shutdown_poll_interval: Duration::from_secs(1),
            shutdown_poll_attempts: 30,
        }
    }

    #[must_use]
    pub fn conf_path(&self) -> PathBuf {
        self.datadir.join(CONF_FILE_NAME)
    }
}

/// `commerciumd` next to the running executable.
#[must_use]
pub fn default_daemon_binary() -> PathBuf {
    let name = format!("commerciumd{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .unwrap_or_else(|| PathBuf::from(name))
}

/// Arguments passed to the daemon.
#[must_use]
pub fn daemon_args(config: &SupervisorConfig, conf: &DaemonConf) -> Vec<String> {
    let mut args = vec![format!("-datadir={}", config.datadir.display())];
    if config.network.is_testnet() && !conf.testnet {
        args.push("-testnet".to_string());
    }
    if config.use_tor && conf.proxy.is_none() {
        args.push("-proxy=127.0.0.1:9050".to_string());
        args.push("-listen=0".to_string());
    }
    args
}

pub struct DaemonSupervisor {
    config: SupervisorConfig,
    launcher: Arc<dyn ProcessLauncher>,
    provisioner: ParamsProvisioner,
    publisher: Arc<dyn EventPublisher>,
    process: Option<Box<dyn DaemonProcess>>,
    conf: Option<DaemonConf>,
    stop_requested: bool,
    restarts: RestartPolicy,
}

impl DaemonSupervisor {
    pub fn new(
        config: SupervisorConfig,
        launcher: Arc<dyn ProcessLauncher>,
        downloader: Arc<dyn ParamsDownloader>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let provisioner = ParamsProvisioner::new(
            downloader,
            Arc::clone(&publisher),
            config.params_dir.clone(),
        )
        .with_attempts(config.download_attempts);
        let restarts = RestartPolicy::new(config.max_restarts);
        Self {
            config,
            launcher,
            provisioner,
            publisher,
            process: None,
            conf: None,
            stop_requested: false,
            restarts,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// True while we own a live child process.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    #[must_use]
    pub fn restart_policy(&self) -> RestartPolicy {
        self.restarts
    }

    /// Look for a daemon already listening on the configured port.
    ///
    /// `None` when nothing answered. Any HTTP answer counts as found, even a
    /// credential rejection or a warm-up error, and is returned as is so the
    /// caller never has to repeat the request.
    pub async fn probe_existing(&self, session: &RpcSession) -> Option<RpcResult<NodeInfo>> {
        match session.get_info().await {
            Err(e) if !e.daemon_answered() => {
                debug!(error = %e, "[wc-02] No daemon listening");
                None
            }
            answered => Some(answered),
        }
    }

    /// Load (or create) the daemon conf and check it is usable.
    pub fn prepare_conf(&mut self) -> SupervisorResult<DaemonConf> {
        let path = self.config.conf_path();
        let (conf, created) = ensure_conf(&path, self.config.network)?;
        if created {
            info!(path = %path.display(), "[wc-02] Created daemon conf file");
        }
        conf.validate_for_embedded()?;
        self.conf = Some(conf.clone());
        Ok(conf)
    }

    #[must_use]
    pub fn params_missing(&self) -> bool {
        !self.provisioner.missing().is_empty()
    }

    /// Fetch missing parameter files, publishing progress on the bus.
    pub async fn provision_params(&self) -> SupervisorResult<usize> {
        self.provisioner.provision().await
    }

    /// Start the daemon. A no-op if one is already owned.
    pub fn launch(&mut self) -> SupervisorResult<()> {
        if self.process.is_some() {
            return Ok(());
        }
        let conf = match &self.conf {
            Some(conf) => conf.clone(),
            None => self.prepare_conf()?,
        };
        let spec = LaunchSpec {
            program: self.config.daemon_binary.clone(),
            args: daemon_args(&self.config, &conf),
            working_dir: self.config.daemon_binary.parent().map(PathBuf::from),
        };

        let process = self
            .launcher
            .launch(&spec)
            .map_err(|e| SupervisorError::Spawn {
                program: spec.program.display().to_string(),
                reason: e.to_string(),
            })?;
        info!(
            program = %spec.program.display(),
            pid = ?process.id(),
            "[wc-02] Daemon launched"
        );
        self.process = Some(process);
        self.stop_requested = false;
        Ok(())
    }

    /// Non-blocking liveness check. Returns the exit once, then releases
    /// the handle.
    pub async fn poll_exit(&mut self) -> Option<DaemonExit> {
        let process = self.process.as_mut()?;
        let status = match process.try_wait() {
            Ok(Some(status)) => status,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "[wc-02] Failed to query daemon status");
                return None;
            }
        };

        let exit = DaemonExit {
            kind: ExitKind::classify(self.stop_requested, status.code),
            code: status.code,
            output: process.captured_output(),
        };
        self.process = None;

        if exit.kind != ExitKind::Graceful {
            error!(exit = %exit, "[wc-02] Daemon exited unexpectedly");
            self.publisher
                .publish(WalletEvent::DaemonExited {
                    kind: exit.kind.as_str().to_string(),
                    exit_code: exit.code,
                    output: (!exit.output.is_empty()).then(|| exit.output.clone()),
                })
                .await;
        }
        Some(exit)
    }

    /// Consume one automatic restart if the exit warrants it.
    pub fn should_restart(&mut self, exit: &DaemonExit) -> bool {
        exit.kind.is_restartable() && self.restarts.try_consume()
    }

    /// Daemon reached a healthy state; restore the restart budget.
    pub fn mark_healthy(&mut self) {
        self.restarts.reset();
    }

    /// Stop the owned daemon: `stop` RPC, bounded wait, then kill.
    ///
    /// Always releases the process handle.
    pub async fn shutdown(&mut self, session: Option<&RpcSession>) -> Option<DaemonExit> {
        self.process.as_ref()?;
        self.stop_requested = true;

        if let Some(session) = session {
            if let Err(e) = session.stop().await {
                warn!(error = %e, "[wc-02] stop RPC failed, waiting for exit anyway");
            }
        }

        for attempt in 0..self.config.shutdown_poll_attempts {
            if let Some(exit) = self.poll_exit().await {
                info!(attempt, "[wc-02] Daemon stopped");
                return Some(exit);
            }
            debug!(attempt, "[wc-02] Waiting for daemon to exit");
            tokio::time::sleep(self.config.shutdown_poll_interval).await;
        }

        let mut process = self.process.take()?;
        warn!("[wc-02] Daemon did not exit in time, killing");
        if let Err(e) = process.kill().await {
            error!(error = %e, "[wc-02] Failed to kill daemon");
        }
        Some(DaemonExit {
            kind: ExitKind::Graceful,
            code: None,
            output: process.captured_output(),
        })
    }
}
