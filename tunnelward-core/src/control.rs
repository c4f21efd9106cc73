//! Operator control loop.
//!
//! Reads newline-delimited commands (normally from stdin) and turns
//! `reconnect [delay]` into [`ReconnectRequest`]s for the tunnel transport.
//! The request queue holds one entry, so a second reconnect waits until the
//! transport has picked up the first.

use crate::error::ControlError;
use crate::supervisor::ShutdownObserver;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tunnelward_common::{format_duration, parse_duration};

/// Capacity of the reconnect request queue.
pub const RECONNECT_QUEUE_CAPACITY: usize = 1;

pub const HELP_TEXT: &str = "Supported command:
reconnect [delay]
- restarts one randomly chosen connection with optional delay before reconnect";

/// Ask the transport to restart one connection after `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconnectRequest {
    pub delay: Duration,
}

impl fmt::Display for ReconnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reconnect after {}", format_duration(self.delay))
    }
}

pub fn reconnect_channel() -> (
    mpsc::Sender<ReconnectRequest>,
    mpsc::Receiver<ReconnectRequest>,
) {
    mpsc::channel(RECONNECT_QUEUE_CAPACITY)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Blank line
    Empty,
    Reconnect(ReconnectRequest),
    Help,
    Unknown(String),
}

/// Parse one operator line.
///
/// The command ends at the first space and everything after it is the delay,
/// so a line starting with a space is blank.
pub fn parse_command(line: &str) -> Result<ControlCommand, ControlError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (command, argument) = match line.split_once(' ') {
        Some((command, rest)) => (command, Some(rest)),
        None => (line, None),
    };

    match command {
        "" => Ok(ControlCommand::Empty),
        "reconnect" => {
            let delay = match argument {
                Some(argument) => parse_duration(argument)?,
                None => Duration::ZERO,
            };
            Ok(ControlCommand::Reconnect(ReconnectRequest { delay }))
        }
        "help" => Ok(ControlCommand::Help),
        _ => Ok(ControlCommand::Unknown(line.to_string())),
    }
}

/// Single reader turning operator input into reconnect requests.
pub struct ControlLoop<R> {
    input: R,
    requests: mpsc::Sender<ReconnectRequest>,
    shutdown: ShutdownObserver,
}

impl<R> ControlLoop<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(
        input: R,
        requests: mpsc::Sender<ReconnectRequest>,
        shutdown: ShutdownObserver,
    ) -> Self {
        Self {
            input,
            requests,
            shutdown,
        }
    }

    /// Run until the input closes, the transport stops listening, or
    /// shutdown is forced.
    pub async fn run(self) {
        let shutdown = self.shutdown;
        let requests = self.requests;
        let mut lines = self.input.lines();

        loop {
            let line = tokio::select! {
                () = shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Control input closed, no further commands will be read");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read control input: {}", e);
                    break;
                }
            };

            match parse_command(&line) {
                Ok(ControlCommand::Empty) => {}
                Ok(ControlCommand::Reconnect(request)) => {
                    info!("Operator requested {}", request);
                    let sent = tokio::select! {
                        () = shutdown.cancelled() => break,
                        sent = requests.send(request) => sent,
                    };
                    if sent.is_err() {
                        info!("Transport no longer accepts reconnect requests");
                        break;
                    }

                    #[cfg(feature = "metrics")]
                    if let Some(m) = tunnelward_observability::tunnel_metrics() {
                        m.reconnect_requested();
                    }
                }
                Ok(ControlCommand::Help) => info!("{}", HELP_TEXT),
                Ok(ControlCommand::Unknown(command)) => {
                    info!("Unknown command: {}", command);
                    info!("{}", HELP_TEXT);
                }
                Err(e) => error!("{}", e),
            }
        }
    }
}
