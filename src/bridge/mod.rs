//! Request/response correlation with the embedded engine.
//!
//! Every remote operation follows the same shape: allocate an id,
//! register a completion slot, dispatch a wrapped statement, then wait for
//! the matching `success`/`error` message or the timeout. Each exit path
//! removes the slot from the pending table before resolving, so an id is
//! resolved at most once no matter which side gets there first.

mod ops;
pub mod params;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::consts::{DEFAULT_CALL_TIMEOUT, DEFAULT_POST_MESSAGE, LOG_PREVIEW_CHARS, preview};
use crate::engine::{EngineCall, EngineTransport, Inbound};
use crate::error::BridgeError;
use crate::events::{Event, EventBus};
use crate::protocol::{self, EngineMessage, LogLevel};

pub use params::{ContainerSize, DisplayOption, DisplayToggles, PageMargins, Parameter};

type Completion = oneshot::Sender<Result<Value, BridgeError>>;
type ReadyListener = Box<dyn FnOnce() + Send>;
type ErrorListener = Arc<dyn Fn(&BridgeError) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Fixed wait for each call's response.
    pub timeout: Duration,
    /// Engine-side function the wrapped call posts its outcome to.
    pub post_message: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CALL_TIMEOUT,
            post_message: DEFAULT_POST_MESSAGE.to_string(),
        }
    }
}

/// Call counters for the session summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub issued: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Default)]
struct Counters {
    issued: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

/// Values the engine resets whenever new content is loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Derived {
    pub zoom: f64,
    pub transpose: i32,
}

impl Default for Derived {
    fn default() -> Self {
        Self {
            zoom: crate::consts::DEFAULT_ZOOM,
            transpose: 0,
        }
    }
}

/// Owns the one connection to the engine.
///
/// Operations may run concurrently; each is tracked by its own id and
/// completes independently of issue order.
pub struct Bridge {
    transport: Arc<dyn EngineTransport>,
    config: BridgeConfig,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, Completion>>,
    ready: AtomicBool,
    in_flight: AtomicUsize,
    last_failure: Mutex<Option<BridgeError>>,
    derived: Mutex<Derived>,
    on_ready: Mutex<Option<ReadyListener>>,
    on_error: Mutex<Option<ErrorListener>>,
    events: EventBus,
    counters: Counters,
}

impl Bridge {
    pub fn new(transport: Arc<dyn EngineTransport>, config: BridgeConfig) -> Self {
        Self {
            transport,
            config,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            ready: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            last_failure: Mutex::new(None),
            derived: Mutex::new(Derived::default()),
            on_ready: Mutex::new(None),
            on_error: Mutex::new(None),
            events: EventBus::default(),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// True once the engine has signalled readiness. Never reset.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// True while a load or render cycle is outstanding.
    pub fn is_operation_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn last_failure(&self) -> Option<BridgeError> {
        lock(&self.last_failure).clone()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        lock(&self.pending).contains_key(&id)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn stats(&self) -> CallStats {
        CallStats {
            issued: self.counters.issued.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
        }
    }

    /// Run `listener` on the first readiness signal. At most one firing
    /// per bridge; a listener set after readiness never runs.
    pub fn set_on_ready<F>(&self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *lock(&self.on_ready) = Some(Box::new(listener));
    }

    /// Run `listener` for each spontaneous engine error.
    pub fn set_on_error<F>(&self, listener: F)
    where
        F: Fn(&BridgeError) + Send + Sync + 'static,
    {
        *lock(&self.on_error) = Some(Arc::new(listener));
    }

    /// Drain `inbound` into [`Bridge::handle_message`] until the engine
    /// hangs up, then fail whatever is still pending.
    pub fn listen(self: &Arc<Self>, mut inbound: Inbound) -> JoinHandle<()> {
        let bridge = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let Some(bridge) = bridge.upgrade() else {
                    return;
                };
                bridge.handle_message(message);
            }
            if let Some(bridge) = bridge.upgrade() {
                bridge.disconnect();
            }
        })
    }

    /// Wait for readiness, giving up after `timeout`.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), BridgeError> {
        let mut events = self.events.subscribe();
        if self.is_ready() {
            return Ok(());
        }
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(Event::EngineReady) => return Ok(()),
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        if self.is_ready() {
                            return Ok(());
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        return Err(BridgeError::DispatchFailure(
                            "engine disconnected".to_string(),
                        ));
                    }
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| BridgeError::Timeout(timeout))?
    }

    /// Parse and route a raw JSON message, for hosts whose channel carries
    /// strings. Returns whether a pending call was resolved.
    pub fn handle_raw(&self, raw: &str) -> bool {
        match EngineMessage::parse(raw) {
            Ok(message) => self.handle_message(message),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw = %preview(raw, LOG_PREVIEW_CHARS),
                    "ignoring malformed engine message"
                );
                false
            }
        }
    }

    /// Route one inbound message. Returns whether a pending call was
    /// resolved by it.
    pub fn handle_message(&self, message: EngineMessage) -> bool {
        match message {
            EngineMessage::Ready => {
                self.mark_ready();
                false
            }
            EngineMessage::Log { level, message } => {
                match level {
                    LogLevel::Debug => tracing::debug!(target: "engine", "{message}"),
                    LogLevel::Info => tracing::info!(target: "engine", "{message}"),
                    LogLevel::Warn => tracing::warn!(target: "engine", "{message}"),
                    LogLevel::Error => tracing::error!(target: "engine", "{message}"),
                }
                false
            }
            EngineMessage::Error {
                operation_id: None,
                error,
            } => {
                self.spontaneous_error(BridgeError::EngineError(error));
                false
            }
            message => {
                let Some((id, outcome)) = message.into_outcome() else {
                    return false;
                };
                match self.take_pending(id) {
                    Some(completion) => {
                        tracing::debug!(operation_id = id, "resolving call");
                        let _ = completion.send(outcome.into_result());
                        true
                    }
                    None => {
                        tracing::debug!(operation_id = id, "no pending call for response");
                        false
                    }
                }
            }
        }
    }

    /// Fail every pending call. Used when the engine connection is gone.
    pub fn disconnect(&self) {
        let drained: Vec<(u64, Completion)> = lock(&self.pending).drain().collect();
        if !drained.is_empty() {
            tracing::warn!(count = drained.len(), "engine disconnected with calls pending");
        }
        for (_, completion) in drained {
            let _ = completion.send(Err(BridgeError::DispatchFailure(
                "engine disconnected".to_string(),
            )));
        }
    }

    /// Issue `command` and wait for its correlated outcome.
    ///
    /// Fails with [`BridgeError::NotReady`] without touching the engine
    /// when readiness has not been signalled.
    pub async fn call(&self, command: impl Into<String>) -> Result<Value, BridgeError> {
        let result = self.call_inner(command.into()).await;
        match &result {
            Ok(_) => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Err(BridgeError::NotReady) => {}
            Err(e) => {
                if matches!(e, BridgeError::Timeout(_)) {
                    self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                }
                self.record_failure(e);
            }
        }
        result
    }

    async fn call_inner(&self, command: String) -> Result<Value, BridgeError> {
        if !self.is_ready() {
            return Err(BridgeError::NotReady);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (completion, mut outcome) = oneshot::channel();
        lock(&self.pending).insert(id, completion);
        let _registration = Registration { bridge: self, id };
        self.counters.issued.fetch_add(1, Ordering::Relaxed);

        let call = EngineCall {
            id,
            script: protocol::wrap_call(&self.config.post_message, id, &command),
            command,
        };
        tracing::debug!(
            operation_id = id,
            command = %preview(&call.command, LOG_PREVIEW_CHARS),
            "dispatching call"
        );

        if let Err(e) = self.transport.dispatch(&call) {
            self.take_pending(id);
            return Err(BridgeError::DispatchFailure(e.to_string()));
        }

        match tokio::time::timeout(self.config.timeout, &mut outcome).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(closed()),
            Err(_) => {
                if self.take_pending(id).is_some() {
                    tracing::warn!(operation_id = id, timeout = ?self.config.timeout, "call timed out");
                    Err(BridgeError::Timeout(self.config.timeout))
                } else {
                    // The response won the race and has already been sent.
                    outcome.await.unwrap_or_else(|_| Err(closed()))
                }
            }
        }
    }

    /// Check-and-remove in one step. Whoever gets `Some` owns resolution.
    fn take_pending(&self, id: u64) -> Option<Completion> {
        lock(&self.pending).remove(&id)
    }

    fn mark_ready(&self) {
        if self.ready.swap(true, Ordering::SeqCst) {
            tracing::debug!("duplicate readiness signal ignored");
            return;
        }
        tracing::info!("engine ready");
        let listener = lock(&self.on_ready).take();
        if let Some(listener) = listener {
            listener();
        }
        self.events.emit(Event::EngineReady);
    }

    fn spontaneous_error(&self, error: BridgeError) {
        tracing::warn!(error = %error, "engine reported an error outside any call");
        self.record_failure(&error);
        let listener = lock(&self.on_error).clone();
        if let Some(listener) = listener {
            listener(&error);
        }
        self.events.emit(Event::EngineFault {
            message: error.to_string(),
        });
    }

    fn record_failure(&self, error: &BridgeError) {
        *lock(&self.last_failure) = Some(error.clone());
    }

    pub(crate) fn update_derived(&self, f: impl FnOnce(&mut Derived)) {
        f(&mut lock(&self.derived));
    }

    /// Apply `change` and return the state it replaced, or `None` when it
    /// changed nothing. Check and write happen under one lock.
    pub(crate) fn claim_derived(&self, change: impl FnOnce(&mut Derived)) -> Option<Derived> {
        let mut derived = lock(&self.derived);
        let previous = *derived;
        change(&mut derived);
        (*derived != previous).then_some(previous)
    }

    /// Mark a load/render cycle as outstanding until the guard drops.
    pub(crate) fn begin_cycle(&self) -> CycleGuard<'_> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) == 0 {
            self.events.emit(Event::InFlightChanged { in_flight: true });
        }
        CycleGuard { bridge: self }
    }
}

/// Drops the pending slot if the call future is abandoned mid-wait.
struct Registration<'a> {
    bridge: &'a Bridge,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.bridge.take_pending(self.id);
    }
}

pub(crate) struct CycleGuard<'a> {
    bridge: &'a Bridge,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if self.bridge.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.bridge
                .events
                .emit(Event::InFlightChanged { in_flight: false });
        }
    }
}

fn closed() -> BridgeError {
    BridgeError::DispatchFailure("engine connection closed".to_string())
}

/// The bridge never holds a lock across user code, so a poisoned lock
/// still guards consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
