//! Endpoint and credential values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SOCKS proxy used when routing through a local Tor daemon.
pub const TOR_SOCKS_PROXY: &str = "socks5h://127.0.0.1:9050";

/// RPC username/password pair.
///
/// Immutable for the life of a session. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcCredentials {
    username: String,
    password: String,
}

impl RpcCredentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for RpcCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where the daemon's RPC server listens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEndpoint {
    pub host: String,
    pub port: u16,
}

impl RpcEndpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    #[must_use]
    pub fn localhost(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

impl fmt::Display for RpcEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
