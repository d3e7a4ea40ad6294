//! Scripted in-memory transport for tests.
//!
//! Replies are looked up per method: one-shot replies first (FIFO), then a
//! sticky per-method default, then a global fallback. Every call is recorded.

use crate::error::{RpcError, RpcResult};
use crate::ports::RpcTransport;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// One recorded call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<RpcResult<Value>>>,
    sticky: HashMap<String, RpcResult<Value>>,
    fallback: Option<RpcResult<Value>>,
    delays: HashMap<String, Duration>,
}

/// Transport whose answers are scripted by the test.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a one-shot reply for `method`.
    pub fn push(&self, method: &str, reply: RpcResult<Value>) {
        self.script
            .lock()
            .queued
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Reply used for `method` whenever its queue is empty.
    pub fn set_default(&self, method: &str, reply: RpcResult<Value>) {
        self.script.lock().sticky.insert(method.to_string(), reply);
    }

    /// Reply for any method with nothing else scripted.
    pub fn set_fallback(&self, reply: RpcResult<Value>) {
        self.script.lock().fallback = Some(reply);
    }

    /// Hold every `method` call for `delay` before answering.
    pub fn set_delay(&self, method: &str, delay: Duration) {
        self.script.lock().delays.insert(method.to_string(), delay);
    }

    /// Remove every queued, sticky and fallback reply.
    pub fn clear(&self) {
        *self.script.lock() = Script::default();
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    #[must_use]
    pub fn calls_to(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.method == method).count()
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    fn next_reply(&self, method: &str) -> (RpcResult<Value>, Option<Duration>) {
        let mut script = self.script.lock();
        let delay = script.delays.get(method).copied();
        if let Some(reply) = script.queued.get_mut(method).and_then(VecDeque::pop_front) {
            return (reply, delay);
        }
        if let Some(reply) = script.sticky.get(method) {
            return (reply.clone(), delay);
        }
        let reply = script
            .fallback
            .clone()
            .unwrap_or_else(|| Err(RpcError::Transport(format!("no scripted reply for {method}"))));
        (reply, delay)
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> RpcResult<Value> {
        self.calls.lock().push(RecordedCall {
            method: method.to_string(),
            params,
        });
        let (reply, delay) = self.next_reply(method);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }

    fn describe(&self) -> String {
        "scripted".into()
    }
}
