//! Forward process signals to the supervisor as shutdown triggers.
//!
//! The first signal starts the graceful drain; a second one during the grace
//! period stops everything immediately.

use tokio::task::JoinHandle;
use tracing::warn;
use tunnelward_core::{ShutdownTrigger, TriggerSource};

/// Installs the handlers before returning, so no signal sent after this call
/// is lost.
pub fn spawn_forwarder(trigger: ShutdownTrigger) -> JoinHandle<()> {
    match Signals::install() {
        Ok(signals) => tokio::spawn(signals.forward(trigger)),
        Err(e) => {
            warn!("Signal handling unavailable: {}", e);
            tokio::spawn(async {})
        }
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn forward(mut self, trigger: ShutdownTrigger) {
        loop {
            let name = tokio::select! {
                Some(()) = self.interrupt.recv() => "SIGINT",
                Some(()) = self.terminate.recv() => "SIGTERM",
                else => return,
            };

            if !trigger.trigger(TriggerSource::Signal(name)) {
                return;
            }
        }
    }
}

#[cfg(not(unix))]
struct Signals {
    interrupt: tokio::signal::windows::CtrlC,
}

#[cfg(not(unix))]
impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: tokio::signal::windows::ctrl_c()?,
        })
    }

    async fn forward(mut self, trigger: ShutdownTrigger) {
        while self.interrupt.recv().await.is_some() {
            if !trigger.trigger(TriggerSource::Signal("SIGINT")) {
                return;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tunnelward_core::{Supervisor, SupervisorState};

    fn send_sigint() {
        let status = std::process::Command::new("kill")
            .arg("-INT")
            .arg(std::process::id().to_string())
            .status()
            .unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_second_sigint_forces_stop() {
        let supervisor = Supervisor::new(Duration::from_secs(60));
        let ctx = supervisor.context();
        let mut state = supervisor.state();
        let forwarder = spawn_forwarder(supervisor.trigger_handle());
        let shutdown = tokio::spawn(supervisor.wait_to_shutdown());

        send_sigint();
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == SupervisorState::Draining),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(!ctx.shutdown.is_cancelled());

        send_sigint();
        let report = tokio::time::timeout(Duration::from_secs(5), shutdown)
            .await
            .unwrap()
            .unwrap();
        assert!(ctx.shutdown.is_cancelled());
        assert!(report.into_result().is_ok());
        forwarder.abort();
    }
}
