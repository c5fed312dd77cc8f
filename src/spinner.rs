//! A terminal spinner shown while a load/render cycle is in flight.

use std::io::Write;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::events::Event;

/// Braille spinner frames.
const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Frame interval.
const INTERVAL: Duration = Duration::from_millis(80);

/// A terminal spinner that runs in a background task.
///
/// Writes to stderr so it doesn't interfere with results on stdout.
pub struct Spinner {
    handle: JoinHandle<()>,
    cancel: tokio::sync::watch::Sender<bool>,
}

impl Spinner {
    /// Start a spinner with the given message (e.g. `"rendering"`).
    pub fn start(message: &str) -> Self {
        let (cancel_tx, mut cancel_rx) = tokio::sync::watch::channel(false);
        let message = message.to_string();

        let handle = tokio::spawn(async move {
            let mut i = 0;
            loop {
                let frame = FRAMES[i % FRAMES.len()];
                // \r moves to start of line, \x1b[2K clears the line
                eprint!("\x1b[2K\r{frame} {message}");
                let _ = std::io::stderr().flush();

                tokio::select! {
                    _ = tokio::time::sleep(INTERVAL) => {}
                    _ = cancel_rx.changed() => break,
                }
                i += 1;
            }
            eprint!("\x1b[2K\r");
            let _ = std::io::stderr().flush();
        });

        Self {
            handle,
            cancel: cancel_tx,
        }
    }

    /// Stop the spinner and clear its line.
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        let _ = self.handle.await;
    }

    /// Show a spinner whenever the bridge reports an operation in flight.
    /// Runs until the event bus closes.
    pub fn follow(mut events: broadcast::Receiver<Event>, message: &str) -> JoinHandle<()> {
        let message = message.to_string();
        tokio::spawn(async move {
            let mut active: Option<Spinner> = None;
            loop {
                match events.recv().await {
                    Ok(Event::InFlightChanged { in_flight: true }) => {
                        if active.is_none() {
                            active = Some(Spinner::start(&message));
                        }
                    }
                    Ok(Event::InFlightChanged { in_flight: false }) => {
                        if let Some(spinner) = active.take() {
                            spinner.stop().await;
                        }
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
            if let Some(spinner) = active {
                spinner.stop().await;
            }
        })
    }
}
