//! Configuration and the owned application context.

pub mod config;
pub mod context;

pub use config::{
    default_datadir, default_params_dir, ConfigError, ConfigResult, ConnectionSection,
    LoggingSection, RetrySection, SupervisorSection, TurnstileSection, WalletConfig,
};
pub use context::AppContext;
