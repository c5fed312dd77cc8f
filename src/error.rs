//! Failure taxonomy shared by every bridge operation.

use std::time::Duration;

use thiserror::Error;

/// Why a bridge operation did not produce a result.
///
/// None of these are fatal to the [`Bridge`](crate::bridge::Bridge): after
/// any failure the coordinator keeps accepting calls.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Called before the engine signalled readiness. Nothing was dispatched.
    #[error("engine is not ready")]
    NotReady,
    /// The call never reached the engine.
    #[error("dispatch failed: {0}")]
    DispatchFailure(String),
    /// The engine ran the call and reported a failure.
    #[error("engine error: {0}")]
    EngineError(String),
    /// No response within the window. Engine state afterwards is unknown.
    #[error("no response from engine within {0:?}")]
    Timeout(Duration),
    /// Rejected on the host side before any engine call was issued.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl BridgeError {
    /// Short tag for logs and stats.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::NotReady => "not_ready",
            BridgeError::DispatchFailure(_) => "dispatch",
            BridgeError::EngineError(_) => "engine",
            BridgeError::Timeout(_) => "timeout",
            BridgeError::InvalidParameter(_) => "invalid_parameter",
        }
    }
}
