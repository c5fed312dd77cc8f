pub mod mock;
pub mod process;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::protocol::EngineMessage;

/// Inbound half of an engine connection. The bridge drains it with
/// [`Bridge::listen`](crate::bridge::Bridge::listen).
pub type Inbound = mpsc::UnboundedReceiver<EngineMessage>;

/// One outbound call, as handed to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCall {
    /// Correlation id the engine echoes back as `operationId`.
    pub id: u64,
    /// The bare command, e.g. `setZoom(1.5)`.
    pub command: String,
    /// The full statement to evaluate, wrapped for correlated reporting.
    pub script: String,
}

/// The engine's call-dispatch primitive.
///
/// Fire-and-forget: the outcome arrives later on the [`Inbound`] channel.
/// An `Err` means the call was not delivered at all.
pub trait EngineTransport: Send + Sync {
    fn dispatch(&self, call: &EngineCall) -> Result<()>;
}
