//! Replica records and health transitions
//!
//! Health starts at `Unknown`. A successful probe makes a replica `Healthy`
//! and resets its failure counter. `failure_threshold` consecutive failed
//! probes make it `Unreachable`. Only `Healthy` replicas are eligible for
//! reads.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::endpoint::Endpoint;
use crate::transport::HelloReply;

/// Weight of the newest round-trip sample in the latency average
const LATENCY_ALPHA: f64 = 0.2;

/// Replica set role of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Accepts writes
    Primary,
    /// Replicates from the primary, serves reads
    Secondary,
    /// Not yet probed
    Unknown,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Primary => "primary",
            Role::Secondary => "secondary",
            Role::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Probe-derived health of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unreachable,
}

/// Health change caused by one probe outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    /// Status did not change
    Unchanged,
    /// Unknown -> Healthy
    Discovered,
    /// Unreachable -> Healthy
    Recovered,
    /// Healthy/Unknown -> Unreachable
    BecameUnreachable,
}

/// One member of the replica set as last observed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Replica {
    pub endpoint: Endpoint,
    pub region: Option<String>,
    pub role: Role,
    #[serde(rename = "latency_ms", serialize_with = "serialize_millis")]
    pub latency: Option<Duration>,
    pub health: HealthStatus,
    pub consecutive_failures: u32,
    #[serde(rename = "lag_ms", serialize_with = "serialize_millis")]
    pub lag: Option<Duration>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Replica {
    /// A member that has been reported but not yet probed.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            region: None,
            role: Role::Unknown,
            latency: None,
            health: HealthStatus::Unknown,
            consecutive_failures: 0,
            lag: None,
            last_seen: None,
        }
    }

    /// A member already known to be healthy.
    pub fn healthy(
        endpoint: Endpoint,
        role: Role,
        region: impl Into<String>,
        latency: Duration,
    ) -> Self {
        Self {
            region: Some(region.into()),
            role,
            latency: Some(latency),
            health: HealthStatus::Healthy,
            last_seen: Some(Utc::now()),
            ..Self::new(endpoint)
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health == HealthStatus::Healthy
    }

    pub fn is_primary(&self) -> bool {
        self.role == Role::Primary
    }

    pub fn is_secondary(&self) -> bool {
        self.role == Role::Secondary
    }

    /// Whether this member carries the given region tag.
    pub fn in_region(&self, region: &str) -> bool {
        self.region.as_deref() == Some(region)
    }

    /// Apply a successful probe.
    pub fn record_success(
        &mut self,
        reply: &HelloReply,
        round_trip: Duration,
        now: DateTime<Utc>,
    ) -> HealthTransition {
        self.role = reply.role;
        self.region = reply.region.clone();
        self.lag = reply.lag;
        self.latency = Some(match self.latency {
            Some(previous) => smooth(previous, round_trip),
            None => round_trip,
        });
        self.consecutive_failures = 0;
        self.last_seen = Some(now);

        let transition = match self.health {
            HealthStatus::Healthy => HealthTransition::Unchanged,
            HealthStatus::Unknown => HealthTransition::Discovered,
            HealthStatus::Unreachable => HealthTransition::Recovered,
        };
        self.health = HealthStatus::Healthy;
        transition
    }

    /// Apply a failed probe.
    ///
    /// Role, region and latency keep their last observed values so the
    /// member can be diagnosed while it is excluded from reads.
    pub fn record_failure(&mut self, failure_threshold: u32) -> HealthTransition {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.health != HealthStatus::Unreachable
            && self.consecutive_failures >= failure_threshold.max(1)
        {
            self.health = HealthStatus::Unreachable;
            return HealthTransition::BecameUnreachable;
        }
        HealthTransition::Unchanged
    }
}

fn smooth(previous: Duration, sample: Duration) -> Duration {
    let value = LATENCY_ALPHA * sample.as_secs_f64() + (1.0 - LATENCY_ALPHA) * previous.as_secs_f64();
    Duration::from_secs_f64(value)
}

fn serialize_millis<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => serializer.serialize_some(&(d.as_secs_f64() * 1000.0)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(role: Role, region: &str) -> HelloReply {
        HelloReply {
            role,
            region: Some(region.to_string()),
            lag: None,
            hosts: Vec::new(),
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("west-1", 27017)
    }

    #[test]
    fn test_new_replica_is_unknown() {
        let replica = Replica::new(endpoint());
        assert_eq!(replica.health, HealthStatus::Unknown);
        assert_eq!(replica.role, Role::Unknown);
        assert!(!replica.is_healthy());
    }

    #[test]
    fn test_first_success_discovers() {
        let mut replica = Replica::new(endpoint());
        let t = replica.record_success(&reply(Role::Secondary, "West US"), Duration::from_millis(40), Utc::now());

        assert_eq!(t, HealthTransition::Discovered);
        assert!(replica.is_healthy());
        assert!(replica.in_region("West US"));
        assert_eq!(replica.latency, Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_latency_is_smoothed() {
        let mut replica = Replica::new(endpoint());
        replica.record_success(&reply(Role::Secondary, "West US"), Duration::from_millis(100), Utc::now());
        replica.record_success(&reply(Role::Secondary, "West US"), Duration::from_millis(200), Utc::now());

        let ms = replica.latency.unwrap().as_secs_f64() * 1000.0;
        assert!((ms - 120.0).abs() < 0.01, "got {}", ms);
    }

    #[test]
    fn test_unreachable_after_threshold() {
        let mut replica = Replica::healthy(endpoint(), Role::Secondary, "West US", Duration::from_millis(5));

        assert_eq!(replica.record_failure(3), HealthTransition::Unchanged);
        assert_eq!(replica.record_failure(3), HealthTransition::Unchanged);
        assert!(replica.is_healthy());
        assert_eq!(replica.record_failure(3), HealthTransition::BecameUnreachable);
        assert_eq!(replica.health, HealthStatus::Unreachable);
        assert_eq!(replica.record_failure(3), HealthTransition::Unchanged);
        assert!(replica.in_region("West US"));
    }

    #[test]
    fn test_success_resets_failures_and_recovers() {
        let mut replica = Replica::healthy(endpoint(), Role::Secondary, "West US", Duration::from_millis(5));
        replica.record_failure(1);
        assert_eq!(replica.health, HealthStatus::Unreachable);

        let t = replica.record_success(&reply(Role::Secondary, "West US"), Duration::from_millis(5), Utc::now());
        assert_eq!(t, HealthTransition::Recovered);
        assert_eq!(replica.consecutive_failures, 0);
    }

    #[test]
    fn test_interrupted_failures_do_not_accumulate() {
        let mut replica = Replica::healthy(endpoint(), Role::Secondary, "West US", Duration::from_millis(5));
        replica.record_failure(3);
        replica.record_failure(3);
        replica.record_success(&reply(Role::Secondary, "West US"), Duration::from_millis(5), Utc::now());
        replica.record_failure(3);

        assert!(replica.is_healthy());
        assert_eq!(replica.consecutive_failures, 1);
    }

    #[test]
    fn test_serializes_millis() {
        let replica = Replica::healthy(endpoint(), Role::Primary, "East US", Duration::from_millis(12));
        let json = serde_json::to_value(&replica).unwrap();

        assert_eq!(json["endpoint"], "west-1:27017");
        assert_eq!(json["role"], "primary");
        assert_eq!(json["health"], "healthy");
        assert_eq!(json["latency_ms"], 12.0);
        assert!(json["lag_ms"].is_null());
    }
}
