//! # Wallet Configuration
//!
//! One [`WalletConfig`] with a defaulted section per subsystem. Layers are
//! applied in this order, each overriding the previous one:
//!
//! 1. built-in defaults
//! 2. the TOML file named by `--config` or `WALLET_CONFIG`
//! 3. `WALLET_*` environment variables
//! 4. command-line flags
//!
//! The result is validated once, before any subsystem is built.
//!
//! ```toml
//! [connection]
//! testnet = true
//! datadir = "/srv/commercium"
//!
//! [retry]
//! max_attempts = 20
//!
//! [turnstile]
//! step_cap = "5.0"
//! step_interval_secs = 7200
//! degraded_policy = "halt"
//!
//! [logging]
//! level = "info,wc_04_turnstile=debug"
//! json = true
//! ```

use crate::cli::Args;
use serde::Deserialize;
use shared_types::{AddressKind, Amount, Network, ShieldedPool};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use wc_01_rpc_session::RpcCredentials;
use wc_02_daemon_supervisor::domain::DEFAULT_PARAMS_BASE_URL;
use wc_02_daemon_supervisor::{default_daemon_binary, SupervisorConfig};
use wc_03_connection::{ConnectionConfig, ConnectionMode, RetryPolicy};
use wc_04_turnstile::{DegradedPolicy, MigrationRequest, TurnstileConfig};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "WALLET_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("failed to parse config file: {0}")]
    Parse(String),

    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete wallet configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalletConfig {
    pub connection: ConnectionSection,
    pub retry: RetrySection,
    pub supervisor: SupervisorSection,
    pub turnstile: TurnstileSection,
    pub logging: LoggingSection,
}

/// How to reach the daemon.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionSection {
    /// Read the datadir conf and launch a daemon when none answers.
    /// Turned off by giving a host, which selects manual mode.
    pub embedded: bool,
    /// Attach only; never launch.
    pub no_embedded: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub tor: bool,
    pub testnet: bool,
    /// Defaults to the platform's Commercium directory.
    pub datadir: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            embedded: true,
            no_embedded: false,
            host: None,
            port: None,
            rpc_user: None,
            rpc_password: None,
            tor: false,
            testnet: false,
            datadir: None,
            request_timeout_secs: 30,
        }
    }
}

/// Connection attempt budget and heartbeat cadence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub max_duration_secs: u64,
    pub warmup_timeout_secs: u64,
    pub warmup_poll_secs: u64,
    pub heartbeat_interval_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_secs: policy.base_delay.as_secs(),
            max_delay_secs: policy.max_delay.as_secs(),
            max_duration_secs: policy.max_duration.as_secs(),
            warmup_timeout_secs: policy.warmup_timeout.as_secs(),
            warmup_poll_secs: policy.warmup_poll.as_secs(),
            heartbeat_interval_secs: policy.heartbeat_interval.as_secs(),
        }
    }
}

/// Embedded daemon supervision.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorSection {
    /// Defaults to `commerciumd` next to this executable.
    pub daemon_binary: Option<PathBuf>,
    /// Defaults to the platform's proving-parameter directory.
    pub params_dir: Option<PathBuf>,
    pub params_url: String,
    pub max_restarts: u32,
    pub download_attempts: u32,
    pub shutdown_poll_interval_secs: u64,
    pub shutdown_poll_attempts: u32,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            daemon_binary: None,
            params_dir: None,
            params_url: DEFAULT_PARAMS_BASE_URL.to_string(),
            max_restarts: 3,
            download_attempts: 3,
            shutdown_poll_interval_secs: 1,
            shutdown_poll_attempts: 30,
        }
    }
}

/// Sprout to Sapling migration. Amounts are decimal coin strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TurnstileSection {
    pub hop_fee: String,
    pub step_cap: String,
    pub step_interval_secs: u64,
    pub min_confirmations: u32,
    pub confirmation_poll_secs: u64,
    pub max_confirmation_polls: u32,
    pub operation_poll_secs: u64,
    pub max_operation_polls: u32,
    pub precondition_recheck_secs: u64,
    pub retry_delay_secs: u64,
    pub degraded_policy: DegradedPolicy,
    /// Begin a migration to this Sapling address once connected.
    pub migrate_to: Option<String>,
    /// Sprout sources; empty means every Sprout address in the wallet.
    pub migrate_from: Vec<String>,
}

impl Default for TurnstileSection {
    fn default() -> Self {
        let defaults = TurnstileConfig::default();
        Self {
            hop_fee: defaults.hop_fee.to_rpc_string(),
            step_cap: defaults.step_cap.to_rpc_string(),
            step_interval_secs: defaults.step_interval.as_secs(),
            min_confirmations: defaults.min_confirmations,
            confirmation_poll_secs: defaults.confirmation_poll_interval.as_secs(),
            max_confirmation_polls: defaults.max_confirmation_polls,
            operation_poll_secs: defaults.operation_poll_interval.as_secs(),
            max_operation_polls: defaults.max_operation_polls,
            precondition_recheck_secs: defaults.precondition_recheck.as_secs(),
            retry_delay_secs: defaults.retry_delay.as_secs(),
            degraded_policy: defaults.degraded_policy,
            migrate_to: None,
            migrate_from: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl WalletConfig {
    /// Build the effective configuration from every layer.
    pub fn load(args: &Args) -> ConfigResult<Self> {
        Self::load_with(args, |key| std::env::var(key).ok())
    }

    /// [`WalletConfig::load`] with an explicit environment lookup.
    pub fn load_with(args: &Args, env: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let path = args
            .config
            .clone()
            .or_else(|| env(CONFIG_ENV).map(PathBuf::from));
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(env)?;
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse TOML; missing sections and keys keep their defaults.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `WALLET_*` overrides. Unparseable values are errors.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        if let Some(level) = env("WALLET_LOG") {
            self.logging.level = level;
        }
        if let Some(json) = env_flag(&env, "WALLET_JSON_LOGS")? {
            self.logging.json = json;
        }
        if let Some(dir) = env("WALLET_DATADIR") {
            self.connection.datadir = Some(PathBuf::from(dir));
        }
        if let Some(testnet) = env_flag(&env, "WALLET_TESTNET")? {
            self.connection.testnet = testnet;
        }
        if let Some(tor) = env_flag(&env, "WALLET_TOR")? {
            self.connection.tor = tor;
        }
        if let Some(no_embedded) = env_flag(&env, "WALLET_NO_EMBEDDED")? {
            self.connection.no_embedded = no_embedded;
        }
        if let Some(host) = env("WALLET_RPC_HOST") {
            self.select_manual(host);
        }
        if let Some(port) = env("WALLET_RPC_PORT") {
            let parsed = port.parse().map_err(|_| ConfigError::Env {
                var: "WALLET_RPC_PORT",
                value: port.clone(),
            })?;
            self.connection.port = Some(parsed);
        }
        if let Some(user) = env("WALLET_RPC_USER") {
            self.connection.rpc_user = Some(user);
        }
        if let Some(password) = env("WALLET_RPC_PASSWORD") {
            self.connection.rpc_password = Some(password);
        }
        if let Some(binary) = env("WALLET_DAEMON_BINARY") {
            self.supervisor.daemon_binary = Some(PathBuf::from(binary));
        }
        if let Some(dir) = env("WALLET_PARAMS_DIR") {
            self.supervisor.params_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Apply command-line flags. Boolean flags only ever switch features on.
    pub fn apply_args(&mut self, args: &Args) {
        if args.no_embedded {
            self.connection.no_embedded = true;
        }
        if args.testnet {
            self.connection.testnet = true;
        }
        if args.tor {
            self.connection.tor = true;
        }
        if let Some(dir) = &args.datadir {
            self.connection.datadir = Some(dir.clone());
        }
        if let Some(host) = &args.host {
            self.select_manual(host.clone());
        }
        if let Some(port) = args.port {
            self.connection.port = Some(port);
        }
        if let Some(user) = &args.rpc_user {
            self.connection.rpc_user = Some(user.clone());
        }
        if let Some(password) = &args.rpc_password {
            self.connection.rpc_password = Some(password.clone());
        }
        if let Some(dest) = &args.migrate_to {
            self.turnstile.migrate_to = Some(dest.clone());
        }
        if !args.migrate_from.is_empty() {
            self.turnstile.migrate_from = args.migrate_from.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json = true;
        }
    }

    fn select_manual(&mut self, host: String) {
        self.connection.host = Some(host);
        self.connection.embedded = false;
    }

    /// Reject settings no subsystem could start with.
    pub fn validate(&self) -> ConfigResult<()> {
        let datadir = self.datadir().ok_or_else(|| {
            ConfigError::Invalid("no data directory; set --datadir or WALLET_DATADIR".into())
        })?;
        self.connection_config(&datadir)
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.connection.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "connection.request_timeout_secs must be non-zero".into(),
            ));
        }
        if self.retry.max_attempts == 0 || self.retry.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts and retry.heartbeat_interval_secs must be non-zero".into(),
            ));
        }
        self.turnstile_config()?
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let Some(dest) = &self.turnstile.migrate_to {
            if AddressKind::classify(dest) != AddressKind::Shielded(ShieldedPool::Sapling) {
                return Err(ConfigError::Invalid(format!(
                    "migration destination {dest} is not a Sapling address"
                )));
            }
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level is empty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn network(&self) -> Network {
        if self.connection.testnet {
            Network::Testnet
        } else {
            Network::Mainnet
        }
    }

    #[must_use]
    pub fn mode(&self) -> ConnectionMode {
        match (self.connection.embedded, self.connection.no_embedded) {
            (true, false) => ConnectionMode::Embedded,
            (true, true) => ConnectionMode::AttachOnly,
            (false, _) => ConnectionMode::Manual,
        }
    }

    #[must_use]
    pub fn datadir(&self) -> Option<PathBuf> {
        self.connection.datadir.clone().or_else(default_datadir)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.request_timeout_secs)
    }

    #[must_use]
    pub fn connection_config(&self, datadir: &Path) -> ConnectionConfig {
        let c = &self.connection;
        let credentials = (c.rpc_user.is_some() || c.rpc_password.is_some()).then(|| {
            RpcCredentials::new(
                c.rpc_user.clone().unwrap_or_default(),
                c.rpc_password.clone().unwrap_or_default(),
            )
        });
        ConnectionConfig {
            host: c.host.clone(),
            port: c.port,
            credentials,
            use_embedded: c.embedded,
            no_embedded: c.no_embedded,
            use_tor: c.tor,
            datadir: Some(datadir.to_path_buf()),
            network: self.network(),
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let r = &self.retry;
        RetryPolicy {
            max_attempts: r.max_attempts,
            base_delay: Duration::from_secs(r.base_delay_secs),
            max_delay: Duration::from_secs(r.max_delay_secs),
            max_duration: Duration::from_secs(r.max_duration_secs),
            warmup_timeout: Duration::from_secs(r.warmup_timeout_secs),
            warmup_poll: Duration::from_secs(r.warmup_poll_secs),
            heartbeat_interval: Duration::from_secs(r.heartbeat_interval_secs),
        }
    }

    #[must_use]
    pub fn supervisor_config(&self, datadir: &Path) -> SupervisorConfig {
        let s = &self.supervisor;
        let params_dir = s
            .params_dir
            .clone()
            .or_else(default_params_dir)
            .unwrap_or_else(|| datadir.join("params"));
        let binary = s.daemon_binary.clone().unwrap_or_else(default_daemon_binary);

        let mut config = SupervisorConfig::new(datadir.to_path_buf(), params_dir, binary);
        config.network = self.network();
        config.use_tor = self.connection.tor;
        config.max_restarts = s.max_restarts;
        config.download_attempts = s.download_attempts;
        config.shutdown_poll_interval = Duration::from_secs(s.shutdown_poll_interval_secs);
        config.shutdown_poll_attempts = s.shutdown_poll_attempts;
        config
    }

    pub fn turnstile_config(&self) -> ConfigResult<TurnstileConfig> {
        let t = &self.turnstile;
        let amount = |key: &str, value: &str| {
            Amount::from_coins_str(value)
                .map_err(|e| ConfigError::Invalid(format!("turnstile.{key}: {e}")))
        };
        Ok(TurnstileConfig {
            network: self.network(),
            hop_fee: amount("hop_fee", &t.hop_fee)?,
            step_cap: amount("step_cap", &t.step_cap)?,
            step_interval: Duration::from_secs(t.step_interval_secs),
            min_confirmations: t.min_confirmations,
            confirmation_poll_interval: Duration::from_secs(t.confirmation_poll_secs),
            max_confirmation_polls: t.max_confirmation_polls,
            operation_poll_interval: Duration::from_secs(t.operation_poll_secs),
            max_operation_polls: t.max_operation_polls,
            precondition_recheck: Duration::from_secs(t.precondition_recheck_secs),
            retry_delay: Duration::from_secs(t.retry_delay_secs),
            degraded_policy: t.degraded_policy,
        })
    }

    /// The migration to begin at start-up, if one was asked for.
    #[must_use]
    pub fn migration_request(&self) -> Option<MigrationRequest> {
        let dest = self.turnstile.migrate_to.clone()?;
        Some(if self.turnstile.migrate_from.is_empty() {
            MigrationRequest::all_sprout(dest)
        } else {
            MigrationRequest::from_sources(dest, self.turnstile.migrate_from.clone())
        })
    }
}

fn env_flag(env: &impl Fn(&str) -> Option<String>, var: &'static str) -> ConfigResult<Option<bool>> {
    let Some(value) = env(var) else {
        return Ok(None);
    };
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(Some(true)),
        "0" | "false" | "no" => Ok(Some(false)),
        _ => Err(ConfigError::Env { var, value }),
    }
}

/// Best-effort home directory lookup without extra dependencies.
fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

fn app_data_dir() -> Option<PathBuf> {
    std::env::var_os("APPDATA").map(PathBuf::from)
}

/// Platform location of the daemon datadir.
#[must_use]
pub fn default_datadir() -> Option<PathBuf> {
    if cfg!(windows) {
        app_data_dir().map(|dir| dir.join("Commercium"))
    } else if cfg!(target_os = "macos") {
        home_dir().map(|home| home.join("Library/Application Support/Commercium"))
    } else {
        home_dir().map(|home| home.join(".commercium"))
    }
}

/// Platform location of the shared proving parameters.
#[must_use]
pub fn default_params_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        app_data_dir().map(|dir| dir.join("ZcashParams"))
    } else if cfg!(target_os = "macos") {
        home_dir().map(|home| home.join("Library/Application Support/ZcashParams"))
    } else {
        home_dir().map(|home| home.join(".zcash-params"))
    }
}
