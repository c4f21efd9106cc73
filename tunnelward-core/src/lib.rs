pub mod bridge;
pub mod control;
pub mod error;
pub mod supervisor;
pub mod transport;

// Re-export specific items for convenience
pub use bridge::{BridgePlan, BridgeServer, BridgeTarget, StreamHandler};
pub use control::{ControlLoop, ReconnectRequest};
pub use error::{ControlError, SupervisorError};
pub use supervisor::{
    ReadinessSignal, ShutdownReport, ShutdownTrigger, SubsystemContext, SubsystemId, Supervisor,
    SupervisorState, TriggerSource,
};
pub use transport::EdgeConnector;

/// Version reported to subsystems and release checks.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
