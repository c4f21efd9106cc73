//! Two-phase shutdown signal and the external trigger handle.

use std::fmt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Phase of the process-wide shutdown. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    Running,
    /// Listeners keep accepting; subsystems finish outstanding work.
    Graceful,
    /// Every subsystem must stop now.
    Forced,
}

impl ShutdownPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownPhase::Running => "running",
            ShutdownPhase::Graceful => "graceful",
            ShutdownPhase::Forced => "forced",
        }
    }
}

impl fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner side of the shutdown phase. Held only by the supervisor.
#[derive(Debug)]
pub struct ShutdownSignal {
    phase: watch::Sender<ShutdownPhase>,
    token: CancellationToken,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Self {
            phase,
            token: CancellationToken::new(),
        }
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Move to `Graceful`. Returns `false` if already there or beyond.
    pub fn begin_graceful(&self) -> bool {
        self.advance(ShutdownPhase::Graceful)
    }

    /// Move to `Forced` and raise cancellation. Safe to call repeatedly.
    pub fn force(&self) -> bool {
        let advanced = self.advance(ShutdownPhase::Forced);
        self.token.cancel();
        advanced
    }

    pub fn observer(&self) -> ShutdownObserver {
        ShutdownObserver {
            phase: self.phase.subscribe(),
            token: self.token.clone(),
        }
    }

    fn advance(&self, to: ShutdownPhase) -> bool {
        self.phase.send_if_modified(|current| {
            if to > *current {
                *current = to;
                true
            } else {
                false
            }
        })
    }
}

/// Read-only view of the shutdown phase handed to subsystems.
#[derive(Debug, Clone)]
pub struct ShutdownObserver {
    phase: watch::Receiver<ShutdownPhase>,
    token: CancellationToken,
}

impl ShutdownObserver {
    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    pub fn is_draining(&self) -> bool {
        self.phase() >= ShutdownPhase::Graceful
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the phase reaches `Graceful` (or beyond).
    pub async fn draining(&self) {
        let mut phase = self.phase.clone();
        if phase
            .wait_for(|p| *p >= ShutdownPhase::Graceful)
            .await
            .is_err()
        {
            // Signal owner is gone; only cancellation can tell us more.
            self.token.cancelled().await;
        }
    }

    /// Resolves once the phase reaches `Forced`. Returns immediately if it
    /// already has.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Where an external shutdown request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// An OS signal, by name (`SIGINT`, `SIGTERM`)
    Signal(&'static str),
    /// Requested programmatically
    Requested,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Signal(name) => write!(f, "signal {name}"),
            TriggerSource::Requested => f.write_str("shutdown request"),
        }
    }
}

/// Cloneable handle that feeds external shutdown triggers to the supervisor.
///
/// The first trigger starts the drain; a second one forces the stop.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: mpsc::UnboundedSender<TriggerSource>,
}

impl ShutdownTrigger {
    pub(crate) fn new(tx: mpsc::UnboundedSender<TriggerSource>) -> Self {
        Self { tx }
    }

    /// Returns `false` once the supervisor is gone.
    pub fn trigger(&self, source: TriggerSource) -> bool {
        self.tx.send(source).is_ok()
    }
}
