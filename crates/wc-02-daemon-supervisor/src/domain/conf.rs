//! Daemon conf file (`commercium.conf`).
//!
//! Plain `key=value` lines. Blank lines and `#` comments are ignored, keys
//! are case-insensitive, the last occurrence of a key wins.

use crate::error::{SupervisorError, SupervisorResult};
use rand::distributions::Alphanumeric;
use rand::Rng;
use shared_types::Network;
use std::path::Path;
use wc_01_rpc_session::RpcCredentials;

/// Conf file name inside the data directory.
pub const CONF_FILE_NAME: &str = "commercium.conf";

/// RPC port written into a freshly generated conf.
pub const GENERATED_RPC_PORT: u16 = 12019;

/// RPC user written into a freshly generated conf.
pub const GENERATED_RPC_USER: &str = "cmm-qt-wallet";

/// Seed node written into a freshly generated conf.
pub const GENERATED_ADDNODE: &str = "seed01.commercium.net";

const GENERATED_PASSWORD_LEN: usize = 10;

/// Settings read from the daemon conf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonConf {
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub rpc_port: Option<u16>,
    /// `daemon=1`: the daemon would fork into the background.
    pub daemonize: bool,
    pub proxy: Option<String>,
    pub testnet: bool,
}

impl DaemonConf {
    /// Parse conf file contents.
    pub fn parse(contents: &str) -> SupervisorResult<Self> {
        let mut conf = DaemonConf::default();
        for raw in contents.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "rpcuser" => conf.rpc_user = Some(value.to_string()),
                "rpcpassword" => conf.rpc_password = Some(value.to_string()),
                "rpcport" => {
                    let port = value.parse().map_err(|_| {
                        SupervisorError::Config(format!("invalid rpcport value '{value}'"))
                    })?;
                    conf.rpc_port = Some(port);
                }
                "daemon" => conf.daemonize = value == "1",
                "proxy" => conf.proxy = Some(value.to_string()),
                "testnet" => conf.testnet = value == "1",
                _ => {}
            }
        }
        Ok(conf)
    }

    /// Read and parse a conf file.
    pub fn load(path: &Path) -> SupervisorResult<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| SupervisorError::io(path, &e))?;
        Self::parse(&contents)
    }

    /// Reject settings an embedded daemon cannot run with.
    pub fn validate_for_embedded(&self) -> SupervisorResult<()> {
        if self.daemonize {
            return Err(SupervisorError::Config(
                "daemon=1 is set in the conf file; the wallet cannot supervise a daemon that forks \
                 into the background. Remove the line and restart."
                    .into(),
            ));
        }
        Ok(())
    }

    /// Credentials, if both user and password are present.
    #[must_use]
    pub fn credentials(&self) -> Option<RpcCredentials> {
        match (&self.rpc_user, &self.rpc_password) {
            (Some(user), Some(pass)) => Some(RpcCredentials::new(user.clone(), pass.clone())),
            _ => None,
        }
    }

    #[must_use]
    pub fn network(&self) -> Network {
        if self.testnet {
            Network::Testnet
        } else {
            Network::Mainnet
        }
    }

    /// Explicit `rpcport`, else the network default.
    #[must_use]
    pub fn rpc_port(&self) -> u16 {
        self.rpc_port
            .unwrap_or_else(|| self.network().default_rpc_port())
    }
}

/// Contents of a conf file for a first run.
#[must_use]
pub fn generated_conf_contents(network: Network, password: &str) -> String {
    let mut out = String::new();
    out.push_str("server=1\n");
    out.push_str(&format!("rpcport={GENERATED_RPC_PORT}\n"));
    out.push_str(&format!("addnode={GENERATED_ADDNODE}\n"));
    out.push_str(&format!("rpcuser={GENERATED_RPC_USER}\n"));
    out.push_str(&format!("rpcpassword={password}\n"));
    if network.is_testnet() {
        out.push_str("testnet=1\n");
    }
    out
}

#[must_use]
pub fn random_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Load the conf at `path`, writing a generated one first if it is missing.
///
/// Returns the parsed conf and whether it was created.
pub fn ensure_conf(path: &Path, network: Network) -> SupervisorResult<(DaemonConf, bool)> {
    if path.exists() {
        return Ok((DaemonConf::load(path)?, false));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SupervisorError::io(parent, &e))?;
    }
    let contents = generated_conf_contents(network, &random_password());
    std::fs::write(path, &contents).map_err(|e| SupervisorError::io(path, &e))?;
    Ok((DaemonConf::parse(&contents)?, true))
}
