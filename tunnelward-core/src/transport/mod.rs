//! Edge transport: the connection pool the tunnel runs over.
//!
//! Only the interface the supervisor relies on lives here: the connector
//! fires the "connected" readiness signal, serves until shutdown, and
//! restarts a connection on operator request.

pub mod backoff;
pub mod edge;

pub use backoff::{Backoff, BackoffConfig, RetryBudget};
pub use edge::{origin_addr, EdgeConnector};
