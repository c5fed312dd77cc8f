//! Wire shapes exchanged with the engine.
//!
//! Outbound traffic is a single JavaScript statement per call, built by
//! [`wrap_call`]. Inbound traffic is a JSON object discriminated by `type`,
//! decoded into [`EngineMessage`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

/// Severity attached to forwarded engine console output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    #[serde(alias = "log")]
    Info,
    Warn,
    Error,
}

/// A message delivered through the engine's message channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineMessage {
    /// One-time initialization signal.
    Ready,
    /// A correlated call completed.
    Success {
        #[serde(rename = "operationId")]
        operation_id: u64,
        #[serde(default)]
        result: Value,
    },
    /// A correlated call failed, or (without an id) a spontaneous engine error.
    Error {
        #[serde(
            rename = "operationId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        operation_id: Option<u64>,
        #[serde(deserialize_with = "error_text")]
        error: String,
    },
    /// Engine console output.
    Log {
        #[serde(default)]
        level: LogLevel,
        message: String,
    },
}

impl EngineMessage {
    /// Decode a raw JSON message.
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// The correlated outcome carried by this message, if any.
    pub fn into_outcome(self) -> Option<(u64, RemoteCallResult)> {
        match self {
            EngineMessage::Success {
                operation_id,
                result,
            } => Some((operation_id, RemoteCallResult::Success(result))),
            EngineMessage::Error {
                operation_id: Some(id),
                error,
            } => Some((id, RemoteCallResult::Failure(error))),
            _ => None,
        }
    }
}

/// Engines throw anything; keep strings as-is and render the rest as JSON.
fn error_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => "unknown engine error".to_string(),
        other => other.to_string(),
    })
}

/// The outcome of one remote call. Never partially populated.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCallResult {
    /// Opaque, engine-defined payload.
    Success(Value),
    Failure(String),
}

impl RemoteCallResult {
    pub fn into_result(self) -> Result<Value, BridgeError> {
        match self {
            RemoteCallResult::Success(value) => Ok(value),
            RemoteCallResult::Failure(message) => Err(BridgeError::EngineError(message)),
        }
    }
}

/// Build `function(arg, ...)` with every argument JSON-encoded.
pub fn js_call(function: &str, args: &[Value]) -> String {
    let args: Vec<String> = args.iter().map(Value::to_string).collect();
    format!("{function}({})", args.join(", "))
}

/// Wrap `command` so exactly one `success` or `error` message comes back
/// for `operation_id`, whether the command returns, throws, rejects or
/// fails to parse.
///
/// The command travels as a string literal and is run through indirect
/// `eval`, which keeps syntax errors inside the `try`. The output is a
/// single line.
pub fn wrap_call(post_message: &str, operation_id: u64, command: &str) -> String {
    let source = Value::String(command.to_string());
    format!(
        "(async () => {{ try {{ const result = await (0, eval)({source}); \
         {post_message}({{ type: \"success\", operationId: {operation_id}, \
         result: result === undefined ? null : result }}); }} catch (e) {{ \
         {post_message}({{ type: \"error\", operationId: {operation_id}, \
         error: String((e && e.message) || e) }}); }} }})();"
    )
}
