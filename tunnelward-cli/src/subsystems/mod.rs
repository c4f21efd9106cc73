//! Subsystems owned by the daemon binary.
//!
//! Each `run` function is a future handed to `Supervisor::launch`; it serves
//! until shutdown is forced and returns the subsystem's outcome.

pub mod dns_proxy;
pub mod hello;
pub mod metrics;
pub mod ssh;
pub mod updater;
