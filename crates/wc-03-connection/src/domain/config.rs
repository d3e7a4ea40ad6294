//! Connection settings and their validation.

use crate::error::{ConnectionError, ConnectionResult};
use shared_types::Network;
use std::path::PathBuf;
use wc_01_rpc_session::RpcCredentials;

/// How the wallet reaches its daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Read the datadir conf, attach to a running daemon or launch one.
    Embedded,
    /// Read the datadir conf and attach; never launch.
    AttachOnly,
    /// Explicit host, port and credentials.
    Manual,
}

/// Settings for one connection attempt. Immutable once the attempt starts.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub credentials: Option<RpcCredentials>,
    pub use_embedded: bool,
    /// Forbid launching even when `use_embedded` is set.
    pub no_embedded: bool,
    pub use_tor: bool,
    pub datadir: Option<PathBuf>,
    pub network: Network,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            credentials: None,
            use_embedded: true,
            no_embedded: false,
            use_tor: false,
            datadir: None,
            network: Network::Mainnet,
        }
    }
}

impl ConnectionConfig {
    /// Embedded mode rooted at `datadir`.
    #[must_use]
    pub fn embedded(datadir: impl Into<PathBuf>) -> Self {
        Self {
            datadir: Some(datadir.into()),
            ..Self::default()
        }
    }

    /// Manual mode against an explicit endpoint.
    #[must_use]
    pub fn manual(host: impl Into<String>, port: u16, credentials: RpcCredentials) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            credentials: Some(credentials),
            use_embedded: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn mode(&self) -> ConnectionMode {
        match (self.use_embedded, self.no_embedded) {
            (true, false) => ConnectionMode::Embedded,
            (true, true) => ConnectionMode::AttachOnly,
            (false, _) => ConnectionMode::Manual,
        }
    }

    /// Host used for RPC, `127.0.0.1` unless overridden.
    #[must_use]
    pub fn rpc_host(&self) -> String {
        self.host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or("127.0.0.1")
            .to_string()
    }

    /// Reject settings that can never lead to a connection.
    pub fn validate(&self) -> ConnectionResult<()> {
        match self.mode() {
            ConnectionMode::Manual => {
                if self.host.as_deref().map_or(true, |h| h.trim().is_empty()) {
                    return Err(ConnectionError::Config("RPC host is required".into()));
                }
                if matches!(self.port, None | Some(0)) {
                    return Err(ConnectionError::Config("RPC port is required".into()));
                }
                if !self
                    .credentials
                    .as_ref()
                    .is_some_and(RpcCredentials::is_complete)
                {
                    return Err(ConnectionError::Config(
                        "RPC username and password are required".into(),
                    ));
                }
            }
            ConnectionMode::Embedded | ConnectionMode::AttachOnly => {
                if self.datadir.is_none() {
                    return Err(ConnectionError::Config(
                        "a data directory is required to locate the daemon conf".into(),
                    ));
                }
                if self.port == Some(0) {
                    return Err(ConnectionError::Config("RPC port 0 is invalid".into()));
                }
            }
        }
        Ok(())
    }
}
