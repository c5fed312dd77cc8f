//! Engine host running as a child process.
//!
//! The host evaluates one statement per stdin line and writes one JSON
//! message per stdout line (`ready`, `success`, `error`, `log`). Its
//! `postMessage` function is whatever [`BridgeConfig::post_message`]
//! names; a Node host typically defines
//! `globalThis.bridge = { postMessage: m => console.log(JSON.stringify(m)) }`.
//!
//! [`BridgeConfig::post_message`]: crate::bridge::BridgeConfig::post_message

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::{EngineCall, EngineTransport, Inbound};
use crate::consts::{LOG_PREVIEW_CHARS, preview};
use crate::protocol::EngineMessage;

/// How to launch the engine host.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            args: Vec::new(),
            working_dir: None,
        }
    }
}

/// Transport that writes scripts to a child's stdin.
pub struct ProcessEngine {
    scripts: mpsc::UnboundedSender<String>,
    child: tokio::sync::Mutex<Child>,
}

impl ProcessEngine {
    /// Spawn the host and start the stdin writer and stdout reader tasks.
    /// The returned [`Inbound`] yields every message the host prints.
    pub fn spawn(config: &ProcessConfig) -> Result<(Self, Inbound)> {
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to start engine host `{}`", config.program))?;

        let mut stdin = child.stdin.take().context("engine host has no stdin")?;
        let stdout = child.stdout.take().context("engine host has no stdout")?;
        let stderr = child.stderr.take().context("engine host has no stderr")?;

        let (script_tx, mut script_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(script) = script_rx.recv().await {
                let line = format!("{script}\n");
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    tracing::warn!(error = %e, "engine stdin closed");
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    tracing::warn!(error = %e, "engine stdin flush failed");
                    break;
                }
            }
        });

        let (message_tx, message_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match EngineMessage::parse(line) {
                            Ok(message) => {
                                if message_tx.send(message).is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!(
                                error = %e,
                                line = %preview(line, LOG_PREVIEW_CHARS),
                                "dropping unparseable engine output"
                            ),
                        }
                    }
                    Ok(None) => {
                        tracing::info!("engine host closed stdout");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "engine stdout read failed");
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "engine", "{line}");
            }
        });

        Ok((
            Self {
                scripts: script_tx,
                child: tokio::sync::Mutex::new(child),
            },
            message_rx,
        ))
    }

    /// Kill the host. Pending calls fail once the inbound stream ends.
    pub async fn shutdown(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        if child.try_wait()?.is_none() {
            child.kill().await.context("failed to stop engine host")?;
        }
        Ok(())
    }
}

impl EngineTransport for ProcessEngine {
    fn dispatch(&self, call: &EngineCall) -> Result<()> {
        self.scripts
            .send(call.script.clone())
            .map_err(|_| anyhow!("engine host is not running"))
    }
}
