//! Domain layer for the daemon supervisor.

pub mod conf;
pub mod exit;
pub mod params;

pub use conf::{ensure_conf, DaemonConf, CONF_FILE_NAME};
pub use exit::{DaemonExit, ExitKind, RestartPolicy};
pub use params::{missing_params, partial_path, DEFAULT_PARAMS_BASE_URL, PARAM_FILES};
