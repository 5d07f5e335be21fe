//! Topology Monitor Tests
//!
//! Discovery, health tracking and membership changes against an in-process
//! cluster:
//! - members reported by a seed are discovered and probed
//! - consecutive failures mark a member unreachable, one success recovers it
//! - members the cluster stops reporting are removed
//! - readers always see a complete snapshot

use std::sync::Arc;
use std::time::Duration;

use georead::client::{ConnectionManager, PoolOptions};
use georead::observability::MetricsRegistry;
use georead::routing::{resolve, ReadPolicy};
use georead::topology::{
    Endpoint, HealthStatus, MonitorOptions, Replica, Role, SharedTopology, TopologyMonitor,
    TopologySnapshot,
};
use georead::transport::memory::{MemberSpec, SimulatedCluster};
use tokio::sync::broadcast;

fn ep(host: &str) -> Endpoint {
    Endpoint::new(host, 27017)
}

fn cluster() -> SimulatedCluster {
    SimulatedCluster::with_members(
        Duration::ZERO,
        vec![
            MemberSpec::new(ep("east-1"), "East US", Role::Primary, Duration::from_millis(2)),
            MemberSpec::new(ep("west-1"), "West US", Role::Secondary, Duration::from_millis(20)),
            MemberSpec::new(ep("eu-1"), "North Europe", Role::Secondary, Duration::from_millis(45)),
        ],
    )
}

struct Harness {
    topology: Arc<SharedTopology>,
    monitor: Arc<TopologyMonitor>,
    metrics: Arc<MetricsRegistry>,
}

fn harness(cluster: &SimulatedCluster, seeds: &[Endpoint], options: MonitorOptions) -> Harness {
    let metrics = Arc::new(MetricsRegistry::new());
    let topology = Arc::new(SharedTopology::new(TopologySnapshot::from_seeds(seeds)));
    let connections = Arc::new(ConnectionManager::new(
        Arc::new(cluster.clone()),
        PoolOptions::default(),
        Arc::clone(&metrics),
    ));
    let monitor = Arc::new(TopologyMonitor::new(
        Arc::clone(&topology),
        connections,
        Arc::clone(&metrics),
        options,
    ));
    Harness {
        topology,
        monitor,
        metrics,
    }
}

fn options() -> MonitorOptions {
    MonitorOptions {
        heartbeat_frequency: Duration::from_millis(500),
        probe_timeout: Duration::from_millis(200),
        failure_threshold: 3,
    }
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_seed_discovers_whole_replica_set() {
    let cluster = cluster();
    let h = harness(&cluster, &[ep("east-1")], options());

    let first = h.monitor.refresh_once().await;
    assert_eq!(first.generation(), 1);
    assert_eq!(first.len(), 3);
    assert_eq!(first.get(&ep("west-1")).unwrap().health, HealthStatus::Unknown);

    let second = h.monitor.refresh_once().await;
    assert_eq!(second.generation(), 2);
    assert_eq!(second.healthy().count(), 3);
    assert_eq!(second.primary().unwrap().endpoint, ep("east-1"));
    assert_eq!(
        second.get(&ep("eu-1")).unwrap().region.as_deref(),
        Some("North Europe")
    );
    assert_eq!(second.regions(), vec!["East US", "North Europe", "West US"]);
}

#[tokio::test(start_paused = true)]
async fn test_latency_observed_from_probes() {
    let cluster = cluster();
    let seeds = cluster.endpoints();
    let h = harness(&cluster, &seeds, options());

    let snapshot = h.monitor.refresh_once().await;
    let east = snapshot.get(&ep("east-1")).unwrap().latency.unwrap();
    let eu = snapshot.get(&ep("eu-1")).unwrap().latency.unwrap();
    assert!(east < eu);

    let nearest = resolve(&ReadPolicy::Nearest, &snapshot).unwrap();
    assert_eq!(nearest[0].endpoint, ep("east-1"));
}

#[tokio::test(start_paused = true)]
async fn test_new_member_added_when_reported() {
    let cluster = cluster();
    let seeds = cluster.endpoints();
    let h = harness(&cluster, &seeds, options());
    h.monitor.refresh_once().await;

    cluster.add_member(MemberSpec::new(
        ep("west-2"),
        "West US",
        Role::Secondary,
        Duration::from_millis(18),
    ));

    let snapshot = h.monitor.refresh_once().await;
    assert_eq!(snapshot.len(), 4);
    assert_eq!(snapshot.get(&ep("west-2")).unwrap().health, HealthStatus::Unknown);

    let snapshot = h.monitor.refresh_once().await;
    assert!(snapshot.get(&ep("west-2")).unwrap().is_healthy());
}

#[tokio::test(start_paused = true)]
async fn test_removed_member_dropped() {
    let cluster = cluster();
    let seeds = cluster.endpoints();
    let h = harness(&cluster, &seeds, options());
    h.monitor.refresh_once().await;

    assert!(cluster.remove_member(&ep("eu-1")));

    let snapshot = h.monitor.refresh_once().await;
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.get(&ep("eu-1")).is_none());
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_failure_threshold_marks_unreachable() {
    let cluster = cluster();
    let seeds = cluster.endpoints();
    let h = harness(&cluster, &seeds, options());
    h.monitor.refresh_once().await;

    cluster.set_available(&ep("west-1"), false);

    for failures in 1..=2 {
        let snapshot = h.monitor.refresh_once().await;
        let west = snapshot.get(&ep("west-1")).unwrap();
        assert_eq!(west.consecutive_failures, failures);
        assert_eq!(west.health, HealthStatus::Healthy);
    }

    let snapshot = h.monitor.refresh_once().await;
    let west = snapshot.get(&ep("west-1")).unwrap();
    assert_eq!(west.health, HealthStatus::Unreachable);
    // Last observed facts are kept for diagnosis
    assert_eq!(west.region.as_deref(), Some("West US"));
    assert_eq!(west.role, Role::Secondary);

    let candidates = resolve(&ReadPolicy::SecondaryPreferred, &snapshot).unwrap();
    assert!(candidates.iter().all(|r| r.endpoint != ep("west-1")));
    assert_eq!(candidates[0].endpoint, ep("eu-1"));
}

#[tokio::test(start_paused = true)]
async fn test_single_success_recovers() {
    let cluster = cluster();
    let seeds = cluster.endpoints();
    let h = harness(&cluster, &seeds, options());
    h.monitor.refresh_once().await;

    cluster.set_available(&ep("west-1"), false);
    for _ in 0..3 {
        h.monitor.refresh_once().await;
    }
    assert!(!h.topology.load().get(&ep("west-1")).unwrap().is_healthy());

    cluster.set_available(&ep("west-1"), true);
    let snapshot = h.monitor.refresh_once().await;
    let west = snapshot.get(&ep("west-1")).unwrap();
    assert!(west.is_healthy());
    assert_eq!(west.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_outage_never_empties_topology() {
    let cluster = cluster();
    let seeds = cluster.endpoints();
    let h = harness(&cluster, &seeds, options());
    h.monitor.refresh_once().await;

    for endpoint in cluster.endpoints() {
        cluster.set_available(&endpoint, false);
    }
    for _ in 0..4 {
        h.monitor.refresh_once().await;
    }

    let snapshot = h.topology.load();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.healthy().count(), 0);
    assert!(resolve(&ReadPolicy::Primary, &snapshot).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_slow_probe_times_out() {
    let cluster = SimulatedCluster::with_members(
        Duration::ZERO,
        vec![
            MemberSpec::new(ep("east-1"), "East US", Role::Primary, Duration::from_millis(2)),
            MemberSpec::new(ep("far-1"), "Far Away", Role::Secondary, Duration::from_secs(5)),
        ],
    );
    let seeds = cluster.endpoints();
    let h = harness(
        &cluster,
        &seeds,
        MonitorOptions {
            failure_threshold: 1,
            ..options()
        },
    );

    let snapshot = h.monitor.refresh_once().await;
    assert!(snapshot.get(&ep("east-1")).unwrap().is_healthy());
    assert_eq!(
        snapshot.get(&ep("far-1")).unwrap().health,
        HealthStatus::Unreachable
    );
    assert_eq!(h.metrics.snapshot().probes_failed, 1);
}

// =============================================================================
// Background Task and Publication
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_background_task_refreshes_until_shutdown() {
    let cluster = cluster();
    let seeds = cluster.endpoints();
    let h = harness(&cluster, &seeds, options());

    let (tx, rx) = broadcast::channel(1);
    let handle = Arc::clone(&h.monitor).spawn(rx);

    tokio::time::sleep(Duration::from_millis(1_600)).await;
    let generation = h.topology.load().generation();
    assert!(generation >= 3, "generation {}", generation);

    tx.send(()).unwrap();
    handle.await.unwrap();

    let stopped_at = h.topology.load().generation();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.topology.load().generation(), stopped_at);
}

#[tokio::test(start_paused = true)]
async fn test_zero_heartbeat_does_not_kill_task() {
    let cluster = cluster();
    let seeds = cluster.endpoints();
    let h = harness(
        &cluster,
        &seeds,
        MonitorOptions {
            heartbeat_frequency: Duration::ZERO,
            ..options()
        },
    );

    let (tx, rx) = broadcast::channel(1);
    let handle = Arc::clone(&h.monitor).spawn(rx);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.topology.load().generation() >= 1);

    tx.send(()).unwrap();
    assert!(handle.await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_see_whole_snapshots() {
    let topology = Arc::new(SharedTopology::new(TopologySnapshot::new(0, Vec::new())));

    let writer = {
        let topology = Arc::clone(&topology);
        tokio::spawn(async move {
            for generation in 1..=200u64 {
                let size = (generation % 5) as usize + 1;
                let replicas = (0..size)
                    .map(|i| {
                        Replica::healthy(
                            Endpoint::new(format!("member-{}", i), 27017),
                            Role::Secondary,
                            format!("gen-{}", generation),
                            Duration::from_millis(i as u64),
                        )
                    })
                    .collect();
                topology.publish(TopologySnapshot::new(generation, replicas));
                tokio::task::yield_now().await;
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let topology = Arc::clone(&topology);
            tokio::spawn(async move {
                let mut last = 0;
                for _ in 0..500 {
                    let snapshot = topology.load();
                    let generation = snapshot.generation();
                    assert!(generation >= last);
                    last = generation;

                    if generation > 0 {
                        // Every member of one snapshot was written by the same publish
                        let tag = format!("gen-{}", generation);
                        assert_eq!(snapshot.len(), (generation % 5) as usize + 1);
                        assert!(snapshot.replicas().iter().all(|r| r.in_region(&tag)));
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}
