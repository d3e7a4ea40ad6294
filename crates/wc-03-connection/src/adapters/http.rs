//! Session factory backed by the HTTP JSON-RPC transport.

use crate::ports::SessionFactory;
use std::sync::Arc;
use std::time::Duration;
use wc_01_rpc_session::adapters::http::DEFAULT_REQUEST_TIMEOUT;
use wc_01_rpc_session::{
    HttpTransport, HttpTransportConfig, RpcCredentials, RpcEndpoint, RpcResult, RpcSession,
};

/// Creates sessions talking HTTP to the daemon.
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    request_timeout: Duration,
}

impl Default for HttpSessionFactory {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl HttpSessionFactory {
    #[must_use]
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl SessionFactory for HttpSessionFactory {
    fn create(
        &self,
        endpoint: &RpcEndpoint,
        credentials: &RpcCredentials,
        use_tor: bool,
    ) -> RpcResult<RpcSession> {
        let config = HttpTransportConfig::new(endpoint.clone(), credentials.clone())
            .with_tor(use_tor)
            .with_request_timeout(self.request_timeout);
        let transport = HttpTransport::new(config)?;
        Ok(RpcSession::new(Arc::new(transport)))
    }
}
