//! Candidate resolution
//!
//! `resolve` is a pure function of a policy and a snapshot. Only healthy
//! members are ever returned. Candidates are ordered by smoothed latency,
//! ties broken by endpoint so the order is stable.

use std::cmp::Ordering;
use std::time::Duration;

use super::errors::{RoutingError, RoutingResult};
use super::policy::ReadPolicy;
use crate::topology::{Replica, TopologySnapshot};

/// Ordered candidates for a read under `policy`.
///
/// `SecondaryPreferred` and `Nearest` may return an empty list when nothing
/// is healthy; `Primary` and `TaggedRegion` fail instead.
pub fn resolve(policy: &ReadPolicy, snapshot: &TopologySnapshot) -> RoutingResult<Vec<Replica>> {
    match policy {
        ReadPolicy::Primary => healthy_primary(snapshot)
            .map(|primary| vec![primary.clone()])
            .ok_or_else(|| RoutingError::NoPrimaryAvailable {
                policy: policy.to_string(),
            }),

        ReadPolicy::SecondaryPreferred => {
            let secondaries = by_latency(snapshot.healthy().filter(|r| r.is_secondary()));
            if !secondaries.is_empty() {
                return Ok(secondaries);
            }
            Ok(healthy_primary(snapshot).into_iter().cloned().collect())
        }

        ReadPolicy::Nearest => Ok(by_latency(snapshot.healthy())),

        ReadPolicy::TaggedRegion(region) => {
            let tagged = by_latency(snapshot.healthy().filter(|r| r.in_region(region)));
            if tagged.is_empty() {
                return Err(RoutingError::NoMatchingRegion {
                    region: region.clone(),
                    known: snapshot.regions().join(", "),
                });
            }
            Ok(tagged)
        }
    }
}

fn healthy_primary(snapshot: &TopologySnapshot) -> Option<&Replica> {
    snapshot.healthy().find(|r| r.is_primary())
}

fn by_latency<'a>(replicas: impl Iterator<Item = &'a Replica>) -> Vec<Replica> {
    let mut out: Vec<Replica> = replicas.cloned().collect();
    out.sort_by(compare_latency);
    out
}

fn compare_latency(a: &Replica, b: &Replica) -> Ordering {
    // Unmeasured latency sorts last
    let key = |r: &Replica| r.latency.unwrap_or(Duration::MAX);
    key(a).cmp(&key(b)).then_with(|| a.endpoint.cmp(&b.endpoint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Endpoint, HealthStatus, Role};

    fn ep(host: &str) -> Endpoint {
        Endpoint::new(host, 27017)
    }

    fn replica(host: &str, role: Role, region: &str, latency_ms: u64) -> Replica {
        Replica::healthy(ep(host), role, region, Duration::from_millis(latency_ms))
    }

    fn unreachable(mut r: Replica) -> Replica {
        r.health = HealthStatus::Unreachable;
        r
    }

    fn endpoints(replicas: &[Replica]) -> Vec<String> {
        replicas.iter().map(|r| r.endpoint.host().to_string()).collect()
    }

    #[test]
    fn test_primary_resolves_single_primary() {
        let snapshot = TopologySnapshot::new(
            1,
            vec![
                replica("east-1", Role::Primary, "us-east", 5),
                replica("west-1", Role::Secondary, "us-west", 1),
            ],
        );

        let candidates = resolve(&ReadPolicy::Primary, &snapshot).unwrap();
        assert_eq!(endpoints(&candidates), vec!["east-1"]);
    }

    #[test]
    fn test_primary_unreachable_fails() {
        let snapshot = TopologySnapshot::new(
            1,
            vec![
                unreachable(replica("east-1", Role::Primary, "us-east", 5)),
                replica("west-1", Role::Secondary, "us-west", 1),
            ],
        );

        let err = resolve(&ReadPolicy::Primary, &snapshot).unwrap_err();
        assert!(matches!(err, RoutingError::NoPrimaryAvailable { .. }));
    }

    #[test]
    fn test_secondary_preferred_orders_by_latency() {
        let snapshot = TopologySnapshot::new(
            1,
            vec![
                replica("east-1", Role::Primary, "us-east", 1),
                replica("west-1", Role::Secondary, "us-west", 80),
                replica("north-1", Role::Secondary, "eu-north", 30),
            ],
        );

        let candidates = resolve(&ReadPolicy::SecondaryPreferred, &snapshot).unwrap();
        assert_eq!(endpoints(&candidates), vec!["north-1", "west-1"]);
    }

    #[test]
    fn test_secondary_preferred_falls_back_to_primary() {
        let snapshot = TopologySnapshot::new(
            1,
            vec![
                replica("east-1", Role::Primary, "us-east", 1),
                unreachable(replica("west-1", Role::Secondary, "us-west", 80)),
            ],
        );

        let candidates = resolve(&ReadPolicy::SecondaryPreferred, &snapshot).unwrap();
        assert_eq!(endpoints(&candidates), vec!["east-1"]);
    }

    #[test]
    fn test_secondary_preferred_empty_when_nothing_healthy() {
        let snapshot = TopologySnapshot::new(
            1,
            vec![unreachable(replica("east-1", Role::Primary, "us-east", 1))],
        );

        assert!(resolve(&ReadPolicy::SecondaryPreferred, &snapshot).unwrap().is_empty());
    }

    #[test]
    fn test_nearest_ignores_role() {
        let snapshot = TopologySnapshot::new(
            1,
            vec![
                replica("east-1", Role::Primary, "us-east", 20),
                replica("west-1", Role::Secondary, "us-west", 10),
                unreachable(replica("west-2", Role::Secondary, "us-west", 1)),
            ],
        );

        let candidates = resolve(&ReadPolicy::Nearest, &snapshot).unwrap();
        assert_eq!(endpoints(&candidates), vec!["west-1", "east-1"]);
    }

    #[test]
    fn test_latency_ties_break_by_endpoint() {
        let snapshot = TopologySnapshot::new(
            1,
            vec![
                replica("west-2", Role::Secondary, "us-west", 10),
                replica("west-1", Role::Secondary, "us-west", 10),
            ],
        );

        let candidates = resolve(&ReadPolicy::Nearest, &snapshot).unwrap();
        assert_eq!(endpoints(&candidates), vec!["west-1", "west-2"]);
    }

    #[test]
    fn test_tagged_region_scenario() {
        let snapshot = TopologySnapshot::new(
            1,
            vec![
                replica("ep1", Role::Primary, "us-east", 5),
                replica("ep2", Role::Secondary, "us-west", 50),
            ],
        );

        let candidates = resolve(&ReadPolicy::tagged_region("us-west"), &snapshot).unwrap();
        assert_eq!(endpoints(&candidates), vec!["ep2"]);
    }

    #[test]
    fn test_tagged_region_includes_primary_in_region() {
        let snapshot = TopologySnapshot::new(
            1,
            vec![
                replica("east-1", Role::Primary, "us-east", 5),
                replica("east-2", Role::Secondary, "us-east", 3),
                replica("west-1", Role::Secondary, "us-west", 1),
            ],
        );

        let candidates = resolve(&ReadPolicy::tagged_region("us-east"), &snapshot).unwrap();
        assert_eq!(endpoints(&candidates), vec!["east-2", "east-1"]);
    }

    #[test]
    fn test_tagged_region_missing_fails() {
        let snapshot = TopologySnapshot::new(1, vec![replica("ep1", Role::Primary, "us-east", 5)]);

        let err = resolve(&ReadPolicy::tagged_region("ap-south"), &snapshot).unwrap_err();
        match err {
            RoutingError::NoMatchingRegion { region, known } => {
                assert_eq!(region, "ap-south");
                assert_eq!(known, "us-east");
            }
            other => panic!("expected NoMatchingRegion, got {:?}", other),
        }
    }

    #[test]
    fn test_tagged_region_only_unreachable_fails() {
        let snapshot = TopologySnapshot::new(
            1,
            vec![
                replica("ep1", Role::Primary, "us-east", 5),
                unreachable(replica("ep2", Role::Secondary, "us-west", 5)),
            ],
        );

        assert!(resolve(&ReadPolicy::tagged_region("us-west"), &snapshot).is_err());
    }

    #[test]
    fn test_unknown_members_never_resolve() {
        let snapshot = TopologySnapshot::from_seeds(&[ep("east-1"), ep("west-1")]);

        assert!(resolve(&ReadPolicy::Nearest, &snapshot).unwrap().is_empty());
        assert!(resolve(&ReadPolicy::Primary, &snapshot).is_err());
    }
}
