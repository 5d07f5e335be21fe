//! Client options

use std::time::Duration;

use super::connection::PoolOptions;
use super::errors::{ClientError, ClientResult};
use crate::routing::ReadPolicy;
use crate::topology::{Endpoint, MonitorOptions};

/// Everything a [`Client`](super::Client) needs to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Members to start discovery from
    pub seeds: Vec<Endpoint>,
    /// Replica set name, informational
    pub replica_set: Option<String>,
    /// Bound on one read or write attempt
    pub socket_timeout: Duration,
    pub max_connection_idle_time: Duration,
    pub max_idle_per_endpoint: usize,
    /// Bound on one monitoring probe
    pub heartbeat_connect_timeout: Duration,
    pub heartbeat_frequency: Duration,
    /// Consecutive failed probes before a member is unreachable
    pub failure_threshold: u32,
    /// Candidates tried per read
    pub max_attempts: usize,
    /// Policy collections start with
    pub default_read_policy: ReadPolicy,
}

impl ClientOptions {
    /// Defaults for everything except the seed list.
    pub fn with_seeds(seeds: Vec<Endpoint>) -> Self {
        Self {
            seeds,
            replica_set: None,
            socket_timeout: Duration::from_secs(10),
            max_connection_idle_time: Duration::from_secs(60),
            max_idle_per_endpoint: 8,
            heartbeat_connect_timeout: Duration::from_secs(5),
            heartbeat_frequency: Duration::from_secs(10),
            failure_threshold: 3,
            max_attempts: 3,
            default_read_policy: ReadPolicy::Primary,
        }
    }

    /// Reject options the monitor or executor cannot run with.
    pub fn validate(&self) -> ClientResult<()> {
        if self.seeds.is_empty() {
            return Err(ClientError::ConnectionFailure {
                endpoint: String::new(),
                reason: "no seed endpoints configured".to_string(),
            });
        }
        for (option, value) in [
            ("socket_timeout", self.socket_timeout),
            ("heartbeat_connect_timeout", self.heartbeat_connect_timeout),
            ("heartbeat_frequency", self.heartbeat_frequency),
        ] {
            if value.is_zero() {
                return Err(ClientError::InvalidOptions {
                    option,
                    reason: "must be > 0".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_idle_time: self.max_connection_idle_time,
            max_idle_per_endpoint: self.max_idle_per_endpoint,
        }
    }

    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            heartbeat_frequency: self.heartbeat_frequency,
            probe_timeout: self.heartbeat_connect_timeout,
            failure_threshold: self.failure_threshold,
        }
    }
}
