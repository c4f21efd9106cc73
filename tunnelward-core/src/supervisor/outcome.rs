use super::shutdown::TriggerSource;
use std::fmt;
use std::sync::OnceLock;
use tunnelward_common::SubsystemError;

/// Identity of a supervised subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsystemId {
    Metrics,
    DnsProxy,
    AutoUpdater,
    HelloWorld,
    SshServer,
    Bridge,
    Transport,
}

impl SubsystemId {
    pub fn as_str(self) -> &'static str {
        match self {
            SubsystemId::Metrics => "metrics",
            SubsystemId::DnsProxy => "dns-proxy",
            SubsystemId::AutoUpdater => "auto-updater",
            SubsystemId::HelloWorld => "hello-world",
            SubsystemId::SshServer => "ssh-server",
            SubsystemId::Bridge => "bridge",
            SubsystemId::Transport => "transport",
        }
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one launched subsystem. Exactly one per launch.
#[derive(Debug)]
pub struct SubsystemOutcome {
    pub id: SubsystemId,
    pub error: Option<SubsystemError>,
}

impl SubsystemOutcome {
    pub fn clean(id: SubsystemId) -> Self {
        Self { id, error: None }
    }

    pub fn failed(id: SubsystemId, error: SubsystemError) -> Self {
        Self {
            id,
            error: Some(error),
        }
    }
}

/// Whatever moved the supervisor out of `Running`.
#[derive(Debug)]
pub enum ShutdownCause {
    Trigger(TriggerSource),
    Outcome {
        id: SubsystemId,
        error: Option<SubsystemError>,
    },
}

impl ShutdownCause {
    /// The subsystem failure behind this cause, if any.
    pub fn error(&self) -> Option<(SubsystemId, &SubsystemError)> {
        match self {
            ShutdownCause::Outcome {
                id,
                error: Some(error),
            } => Some((*id, error)),
            _ => None,
        }
    }
}

impl From<SubsystemOutcome> for ShutdownCause {
    fn from(outcome: SubsystemOutcome) -> Self {
        ShutdownCause::Outcome {
            id: outcome.id,
            error: outcome.error,
        }
    }
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownCause::Trigger(source) => write!(f, "{source}"),
            ShutdownCause::Outcome {
                id,
                error: Some(error),
            } => write!(f, "{id} failed: {error}"),
            ShutdownCause::Outcome { id, error: None } => write!(f, "{id} exited"),
        }
    }
}

/// Set-once cell for the first shutdown cause. Later writes are dropped.
#[derive(Debug, Default)]
pub struct OutcomeLatch {
    cell: OnceLock<ShutdownCause>,
}

impl OutcomeLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this call latched the cause.
    pub fn latch(&self, cause: ShutdownCause) -> bool {
        self.cell.set(cause).is_ok()
    }

    pub fn get(&self) -> Option<&ShutdownCause> {
        self.cell.get()
    }

    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn into_inner(self) -> Option<ShutdownCause> {
        self.cell.into_inner()
    }
}
