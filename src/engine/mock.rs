use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use serde_json::Value;
use tokio::sync::mpsc;

use super::{EngineCall, EngineTransport, Inbound};
use crate::protocol::EngineMessage;

/// How the mock answers a dispatched call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Never answer.
    Silent,
    /// Post a `success` message with this payload.
    Succeed(Value),
    /// Post an `error` message.
    Fail(String),
    /// Refuse the dispatch itself.
    Reject(String),
}

type Responder = Box<dyn Fn(&EngineCall) -> Reply + Send + Sync>;

/// A scripted engine for tests. Records every dispatch and answers
/// through the same inbound channel a real host would use.
pub struct MockEngine {
    calls: Mutex<Vec<EngineCall>>,
    responder: Mutex<Responder>,
    outbox: mpsc::UnboundedSender<EngineMessage>,
}

impl MockEngine {
    /// A mock that answers every call with `success` / `null`.
    pub fn new() -> (Arc<Self>, Inbound) {
        Self::with_reply(|_| Reply::Succeed(Value::Null))
    }

    /// A mock that never answers.
    pub fn silent() -> (Arc<Self>, Inbound) {
        Self::with_reply(|_| Reply::Silent)
    }

    pub fn with_reply<F>(responder: F) -> (Arc<Self>, Inbound)
    where
        F: Fn(&EngineCall) -> Reply + Send + Sync + 'static,
    {
        let (outbox, inbound) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responder: Mutex::new(Box::new(responder)),
            outbox,
        });
        (engine, inbound)
    }

    /// Replace the responder for subsequent calls.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&EngineCall) -> Reply + Send + Sync + 'static,
    {
        *self.responder.lock().unwrap() = Box::new(responder);
    }

    /// Push an unsolicited message, as if the engine posted it.
    pub fn send(&self, message: EngineMessage) {
        let _ = self.outbox.send(message);
    }

    pub fn signal_ready(&self) {
        self.send(EngineMessage::Ready);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Bare commands in dispatch order.
    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.command.clone())
            .collect()
    }

    pub fn dispatch_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of dispatched commands starting with `prefix`.
    pub fn count_prefixed(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.command.starts_with(prefix))
            .count()
    }
}

impl EngineTransport for MockEngine {
    fn dispatch(&self, call: &EngineCall) -> Result<()> {
        self.calls.lock().unwrap().push(call.clone());
        let reply = (self.responder.lock().unwrap())(call);
        match reply {
            Reply::Silent => {}
            Reply::Succeed(result) => self.send(EngineMessage::Success {
                operation_id: call.id,
                result,
            }),
            Reply::Fail(error) => self.send(EngineMessage::Error {
                operation_id: Some(call.id),
                error,
            }),
            Reply::Reject(reason) => bail!(reason),
        }
        Ok(())
    }
}
