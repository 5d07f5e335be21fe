//! Topology monitor
//!
//! Each cycle probes every known member concurrently, folds the outcomes
//! into a fresh snapshot and publishes it in one swap.
//!
//! Membership follows what the cluster reports:
//! - an endpoint listed by any successful reply and not yet known is added
//!   as `Unknown`, to be probed next cycle
//! - a known endpoint that no successful reply lists is removed, but only if
//!   at least one probe succeeded, so an outage never empties the topology
//!
//! A failed probe never removes a member by itself. It only counts towards
//! the failure threshold.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};

use super::endpoint::Endpoint;
use super::replica::{HealthTransition, Replica};
use super::snapshot::{SharedTopology, TopologySnapshot};
use crate::client::ConnectionManager;
use crate::observability::{log_event, log_event_with_fields, Event, MetricsRegistry};
use crate::transport::{HelloReply, TransportError};

/// Floor applied to the heartbeat period of a spawned monitor
const MIN_HEARTBEAT: Duration = Duration::from_millis(1);

/// Monitor timing and thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Time between refresh cycles
    pub heartbeat_frequency: Duration,
    /// Bound on one probe, connect included
    pub probe_timeout: Duration,
    /// Consecutive failed probes before a member is unreachable
    pub failure_threshold: u32,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            heartbeat_frequency: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            failure_threshold: 3,
        }
    }
}

/// Keeps the shared snapshot current
pub struct TopologyMonitor {
    topology: Arc<SharedTopology>,
    connections: Arc<ConnectionManager>,
    metrics: Arc<MetricsRegistry>,
    options: MonitorOptions,
    // Serializes refreshes so two cycles never publish from the same base
    refresh_lock: Mutex<()>,
}

impl TopologyMonitor {
    pub fn new(
        topology: Arc<SharedTopology>,
        connections: Arc<ConnectionManager>,
        metrics: Arc<MetricsRegistry>,
        options: MonitorOptions,
    ) -> Self {
        Self {
            topology,
            connections,
            metrics,
            options,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn options(&self) -> MonitorOptions {
        self.options
    }

    /// Run one probe cycle and publish the result.
    pub async fn refresh_once(&self) -> Arc<TopologySnapshot> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.topology.load();
        let probes = current.replicas().iter().map(|r| self.probe(&r.endpoint));
        let outcomes = join_all(probes).await;

        let mut replicas = Vec::with_capacity(current.len());
        let mut reported: BTreeSet<Endpoint> = BTreeSet::new();
        let mut any_success = false;
        let now = Utc::now();

        for (previous, outcome) in current.replicas().iter().zip(outcomes) {
            let mut replica = previous.clone();
            let transition = match outcome {
                Ok((reply, round_trip)) => {
                    any_success = true;
                    reported.extend(reply.hosts.iter().cloned());
                    replica.record_success(&reply, round_trip, now)
                }
                Err(e) => {
                    self.metrics.increment_probes_failed();
                    log_event_with_fields(
                        Event::ProbeFailed,
                        &[
                            ("endpoint", &replica.endpoint.to_string()),
                            ("error", &e.to_string()),
                            ("consecutive_failures", &(replica.consecutive_failures + 1).to_string()),
                        ],
                    );
                    replica.record_failure(self.options.failure_threshold)
                }
            };
            log_transition(&replica, transition);
            replicas.push(replica);
        }

        if any_success {
            replicas.retain(|r| {
                let keep = reported.contains(&r.endpoint);
                if !keep {
                    log_event_with_fields(Event::ReplicaRemoved, &[("endpoint", &r.endpoint.to_string())]);
                    self.connections.disconnect(&r.endpoint);
                }
                keep
            });

            for endpoint in reported {
                if current.get(&endpoint).is_none() {
                    log_event_with_fields(Event::ReplicaAdded, &[("endpoint", &endpoint.to_string())]);
                    replicas.push(Replica::new(endpoint));
                }
            }
        }

        let snapshot = TopologySnapshot::new(current.generation() + 1, replicas);
        let healthy = snapshot.healthy().count();
        let total = snapshot.len();
        let generation = snapshot.generation();
        self.topology.publish(snapshot);
        self.metrics.increment_topology_refreshes();

        log_event_with_fields(
            Event::TopologyRefreshed,
            &[
                ("generation", &generation.to_string()),
                ("healthy", &healthy.to_string()),
                ("members", &total.to_string()),
            ],
        );

        self.topology.load()
    }

    async fn probe(&self, endpoint: &Endpoint) -> Result<(HelloReply, Duration), String> {
        self.metrics.increment_probes_sent();
        let started = Instant::now();

        let round_trip = async {
            let mut conn = self.connections.checkout(endpoint).await.map_err(|e| e.to_string())?;
            let reply = conn.connection().hello().await.map_err(|e| e.to_string())?;
            self.connections.checkin(conn);
            Ok::<_, String>(reply)
        };

        match timeout(self.options.probe_timeout, round_trip).await {
            Ok(Ok(reply)) => Ok((reply, started.elapsed())),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Timeout(self.options.probe_timeout).to_string()),
        }
    }

    /// Start the periodic refresh task.
    ///
    /// The first cycle runs one heartbeat after the call; callers perform
    /// their initial discovery with [`refresh_once`](Self::refresh_once).
    /// The task exits when `shutdown` fires or its sender is dropped.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            log_event_with_fields(
                Event::MonitorStart,
                &[(
                    "heartbeat_ms",
                    &self.options.heartbeat_frequency.as_millis().to_string(),
                )],
            );

            // interval panics on a zero period
            let mut ticker = interval(self.options.heartbeat_frequency.max(MIN_HEARTBEAT));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately once
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.refresh_once().await;
                    }
                    _ = shutdown.recv() => {
                        break;
                    }
                }
            }

            log_event(Event::MonitorStop);
        })
    }
}

fn log_transition(replica: &Replica, transition: HealthTransition) {
    let endpoint = replica.endpoint.to_string();
    let region = replica.region.as_deref().unwrap_or("");
    match transition {
        HealthTransition::Unchanged => {}
        HealthTransition::Discovered => log_event_with_fields(
            Event::ReplicaDiscovered,
            &[("endpoint", &endpoint), ("region", region), ("role", &replica.role.to_string())],
        ),
        HealthTransition::Recovered => log_event_with_fields(
            Event::ReplicaRecovered,
            &[("endpoint", &endpoint), ("region", region)],
        ),
        HealthTransition::BecameUnreachable => log_event_with_fields(
            Event::ReplicaUnreachable,
            &[
                ("endpoint", &endpoint),
                ("region", region),
                ("consecutive_failures", &replica.consecutive_failures.to_string()),
            ],
        ),
    }
}
