//! Scripted session factory for tests.

use crate::ports::SessionFactory;
use parking_lot::Mutex;
use std::sync::Arc;
use wc_01_rpc_session::testing::ScriptedTransport;
use wc_01_rpc_session::{RpcCredentials, RpcEndpoint, RpcResult, RpcSession};

/// One session the machine asked for.
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub endpoint: RpcEndpoint,
    pub credentials: RpcCredentials,
    pub use_tor: bool,
}

/// Hands out sessions that all share one [`ScriptedTransport`].
pub struct ScriptedSessionFactory {
    transport: Arc<ScriptedTransport>,
    created: Mutex<Vec<CreatedSession>>,
}

impl ScriptedSessionFactory {
    #[must_use]
    pub fn new(transport: Arc<ScriptedTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            created: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<ScriptedTransport> {
        &self.transport
    }

    #[must_use]
    pub fn created(&self) -> Vec<CreatedSession> {
        self.created.lock().clone()
    }
}

impl SessionFactory for ScriptedSessionFactory {
    fn create(
        &self,
        endpoint: &RpcEndpoint,
        credentials: &RpcCredentials,
        use_tor: bool,
    ) -> RpcResult<RpcSession> {
        self.created.lock().push(CreatedSession {
            endpoint: endpoint.clone(),
            credentials: credentials.clone(),
            use_tor,
        });
        Ok(RpcSession::new(self.transport.clone()))
    }
}
