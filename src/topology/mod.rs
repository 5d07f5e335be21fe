//! Replica set topology
//!
//! - [`Replica`]: one member as last observed, with probe-driven health
//! - [`TopologySnapshot`]: immutable, atomically published member list
//! - [`TopologyMonitor`]: periodic probing that produces new snapshots

mod endpoint;
mod monitor;
mod replica;
mod snapshot;

pub use endpoint::{Endpoint, DEFAULT_PORT};
pub use monitor::{MonitorOptions, TopologyMonitor};
pub use replica::{HealthStatus, HealthTransition, Replica, Role};
pub use snapshot::{SharedTopology, TopologySnapshot};
