//! Subsystem launcher and shutdown state machine.
//!
//! Every subsystem is spawned on one [`TaskTracker`] and reports exactly one
//! [`SubsystemOutcome`]. The first outcome or external trigger is latched as
//! the shutdown cause; the supervisor then drains for the grace period (if
//! any), raises cancellation, and waits until every launched task is done.

pub mod listeners;
pub mod outcome;
pub mod readiness;
pub mod shutdown;

pub use listeners::ListenerSet;
pub use outcome::{OutcomeLatch, ShutdownCause, SubsystemId, SubsystemOutcome};
pub use readiness::ReadinessSignal;
pub use shutdown::{ShutdownObserver, ShutdownPhase, ShutdownSignal, ShutdownTrigger, TriggerSource};

use crate::error::SupervisorError;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use tunnelward_common::{format_duration, SubsystemError};
use uuid::Uuid;

/// Lifecycle of the supervisor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SupervisorState::Running => "running",
            SupervisorState::Draining => "draining",
            SupervisorState::Stopped => "stopped",
        })
    }
}

/// Everything a subsystem may observe about the daemon it runs in.
#[derive(Debug, Clone)]
pub struct SubsystemContext {
    pub shutdown: ShutdownObserver,
    /// Fires once the tunnel transport has its first edge connection
    pub connected: ReadinessSignal,
    /// Identifies this daemon instance to the edge
    pub connector_id: Uuid,
    pub version: &'static str,
}

/// What the supervisor saw between start and exit.
#[derive(Debug)]
pub struct ShutdownReport {
    pub cause: Option<ShutdownCause>,
    pub launched: usize,
    pub observed: usize,
}

impl ShutdownReport {
    pub fn error(&self) -> Option<(SubsystemId, &SubsystemError)> {
        self.cause.as_ref().and_then(ShutdownCause::error)
    }

    pub fn into_result(self) -> Result<(), SupervisorError> {
        match self.cause {
            Some(ShutdownCause::Outcome {
                id,
                error: Some(source),
            }) => Err(SupervisorError {
                subsystem: id,
                source,
            }),
            _ => Ok(()),
        }
    }
}

pub struct Supervisor {
    grace_period: Duration,
    signal: ShutdownSignal,
    tracker: TaskTracker,
    outcome_tx: mpsc::UnboundedSender<SubsystemOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<SubsystemOutcome>,
    trigger_tx: mpsc::UnboundedSender<TriggerSource>,
    trigger_rx: mpsc::UnboundedReceiver<TriggerSource>,
    state: watch::Sender<SupervisorState>,
    latch: OutcomeLatch,
    launched: usize,
    observed: usize,
    listeners: Arc<ListenerSet>,
    connected: ReadinessSignal,
    connector_id: Uuid,
}

impl Supervisor {
    pub fn new(grace_period: Duration) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SupervisorState::Running);

        Self {
            grace_period,
            signal: ShutdownSignal::new(),
            tracker: TaskTracker::new(),
            outcome_tx,
            outcome_rx,
            trigger_tx,
            trigger_rx,
            state,
            latch: OutcomeLatch::new(),
            launched: 0,
            observed: 0,
            listeners: Arc::new(ListenerSet::new()),
            connected: ReadinessSignal::new(),
            connector_id: Uuid::new_v4(),
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn context(&self) -> SubsystemContext {
        SubsystemContext {
            shutdown: self.signal.observer(),
            connected: self.connected.clone(),
            connector_id: self.connector_id,
            version: crate::VERSION,
        }
    }

    pub fn trigger_handle(&self) -> ShutdownTrigger {
        ShutdownTrigger::new(self.trigger_tx.clone())
    }

    pub fn state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Listeners bound so far. Clone the `Arc` to watch the set from outside.
    pub fn listeners(&self) -> &Arc<ListenerSet> {
        &self.listeners
    }

    /// Number of subsystems launched so far, startup failures included.
    pub fn launched(&self) -> usize {
        self.launched
    }

    /// Start `task` as subsystem `id`.
    ///
    /// The task's return value (or panic) becomes its one outcome. Failure of
    /// one subsystem does not cancel any other; only the shutdown sequence
    /// does.
    pub fn launch<F>(&mut self, id: SubsystemId, task: F)
    where
        F: Future<Output = Result<(), SubsystemError>> + Send + 'static,
    {
        self.launched += 1;
        let outcome_tx = self.outcome_tx.clone();
        info!(subsystem = %id, "Starting subsystem");

        self.tracker.spawn(async move {
            #[cfg(feature = "metrics")]
            if let Some(m) = tunnelward_observability::tunnel_metrics() {
                m.subsystem_started();
            }

            let error = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(panic) => Some(SubsystemError::Panicked(panic_message(&*panic))),
            };

            #[cfg(feature = "metrics")]
            if let Some(m) = tunnelward_observability::tunnel_metrics() {
                m.subsystem_exited(id.as_str(), error.is_some());
            }

            // Only fails once the supervisor has been dropped.
            let _ = outcome_tx.send(SubsystemOutcome { id, error });
        });
    }

    /// Report a subsystem that failed before it could be launched.
    pub fn record_startup_failure(&mut self, id: SubsystemId, error: SubsystemError) {
        self.launched += 1;
        error!(subsystem = %id, error = %error, "Subsystem failed to start");
        let _ = self.outcome_tx.send(SubsystemOutcome::failed(id, error));
    }

    /// Wait for `gate` before opening further listeners.
    ///
    /// Returns `false` if a subsystem outcome or shutdown trigger arrives
    /// first; that event is latched and the caller should go straight to
    /// [`Supervisor::wait_to_shutdown`].
    pub async fn pass_gate(&mut self, gate: &ReadinessSignal) -> bool {
        if gate.is_ready() {
            return true;
        }
        debug!("Waiting for readiness gate");

        tokio::select! {
            () = gate.wait() => true,
            Some(outcome) = self.outcome_rx.recv() => {
                self.observe(outcome);
                false
            }
            Some(source) = self.trigger_rx.recv() => {
                self.observe_trigger(source);
                false
            }
        }
    }

    /// Run the shutdown state machine to completion.
    pub async fn wait_to_shutdown(mut self) -> ShutdownReport {
        if !self.latch.is_set() {
            tokio::select! {
                Some(outcome) = self.outcome_rx.recv() => self.observe(outcome),
                Some(source) = self.trigger_rx.recv() => self.observe_trigger(source),
                else => warn!("Shutdown channels closed unexpectedly"),
            }
        }

        if !self.grace_period.is_zero() {
            self.signal.begin_graceful();
            self.set_state(SupervisorState::Draining);
            info!(
                "Initiating graceful shutdown, waiting up to {} (signal again to force)",
                format_duration(self.grace_period)
            );

            let deadline = tokio::time::sleep(self.grace_period);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    () = &mut deadline => {
                        debug!("Grace period elapsed");
                        break;
                    }
                    Some(source) = self.trigger_rx.recv() => {
                        info!("Received {} during grace period, stopping now", source);
                        break;
                    }
                    Some(outcome) = self.outcome_rx.recv() => self.observe(outcome),
                }
            }
        }

        self.signal.force();
        self.set_state(SupervisorState::Stopped);

        match self.latch.get().and_then(ShutdownCause::error) {
            Some((id, error)) => error!("Quitting due to error: {} failed: {}", id, error),
            None => info!("Quitting..."),
        }

        self.tracker.close();
        loop {
            tokio::select! {
                () = self.tracker.wait() => break,
                Some(outcome) = self.outcome_rx.recv() => self.observe(outcome),
            }
        }
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.observe(outcome);
        }

        debug!(
            launched = self.launched,
            observed = self.observed,
            "All subsystems stopped"
        );

        ShutdownReport {
            cause: self.latch.into_inner(),
            launched: self.launched,
            observed: self.observed,
        }
    }

    fn observe(&mut self, outcome: SubsystemOutcome) {
        self.observed += 1;
        match &outcome.error {
            Some(e) => error!(subsystem = %outcome.id, error = %e, "Subsystem failed"),
            None => info!(subsystem = %outcome.id, "Subsystem stopped"),
        }

        let running = *self.state.borrow() == SupervisorState::Running;
        if running && self.latch.latch(outcome.into()) {
            debug!("Shutdown cause latched");
        }
    }

    fn observe_trigger(&mut self, source: TriggerSource) {
        info!("Received {}", source);
        self.latch.latch(ShutdownCause::Trigger(source));
    }

    fn set_state(&self, state: SupervisorState) {
        self.state.send_replace(state);
        debug!("Supervisor {}", state);

        #[cfg(feature = "metrics")]
        if let Some(m) = tunnelward_observability::tunnel_metrics() {
            m.set_shutdown_phase(self.signal.phase() as i64);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
