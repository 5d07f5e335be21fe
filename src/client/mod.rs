//! Region-aware client
//!
//! A [`Client`] is an explicit context object: it owns the connection pools,
//! the shared topology snapshot and the monitor task, and has an explicit
//! lifecycle ([`Client::open`] / [`Client::close`]). Handles obtained from it
//! ([`Database`], [`Collection`]) are cheap clones that share that state.
//!
//! # Usage
//!
//! ```ignore
//! let client = Client::open(options, Arc::new(cluster)).await?;
//! let coll = client
//!     .database("georead")
//!     .collection("samples")
//!     .with_read_policy(ReadPolicy::tagged_region("West US"));
//! let outcome = coll.find(&Query::all()).await?;
//! client.close().await;
//! ```

mod connection;
mod errors;
mod executor;
mod options;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub use connection::{ConnectionManager, PoolOptions, PoolState, PooledConnection};
pub use errors::{ClientError, ClientResult};
pub use executor::{QueryExecutor, ReadOutcome};
pub use options::ClientOptions;

use crate::observability::{
    log_event, log_event_at, log_event_with_fields, Event, MetricsRegistry, MetricsSnapshot, Severity,
};
use crate::routing::ReadPolicy;
use crate::topology::{HealthStatus, SharedTopology, TopologyMonitor, TopologySnapshot};
use crate::transport::{Connector, Document, Namespace, Query};

struct ClientInner {
    options: ClientOptions,
    topology: Arc<SharedTopology>,
    connections: Arc<ConnectionManager>,
    executor: QueryExecutor,
    monitor: Arc<TopologyMonitor>,
    metrics: Arc<MetricsRegistry>,
    shutdown_tx: broadcast::Sender<()>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Handle to an open replica set client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Open a client: discover the topology from the seeds, then start
    /// monitoring it.
    ///
    /// Fails with `InvalidOptions` for zero timeouts or heartbeat frequency,
    /// and with `ConnectionFailure` if no member answers the initial probe.
    pub async fn open(options: ClientOptions, connector: Arc<dyn Connector>) -> ClientResult<Client> {
        options.validate()?;

        let metrics = Arc::new(MetricsRegistry::new());
        let topology = Arc::new(SharedTopology::new(TopologySnapshot::from_seeds(&options.seeds)));
        let connections = Arc::new(ConnectionManager::new(
            connector,
            options.pool_options(),
            Arc::clone(&metrics),
        ));
        let monitor = Arc::new(TopologyMonitor::new(
            Arc::clone(&topology),
            Arc::clone(&connections),
            Arc::clone(&metrics),
            options.monitor_options(),
        ));
        let executor = QueryExecutor::new(
            Arc::clone(&topology),
            Arc::clone(&connections),
            Arc::clone(&metrics),
            options.max_attempts,
            options.socket_timeout,
        );

        // Seeds only name some members; a second cycle probes the ones the
        // first cycle discovered.
        let mut snapshot = monitor.refresh_once().await;
        if snapshot.replicas().iter().any(|r| r.health == HealthStatus::Unknown) {
            snapshot = monitor.refresh_once().await;
        }
        if snapshot.healthy().next().is_none() {
            connections.close();
            let seeds: Vec<String> = options.seeds.iter().map(|s| s.to_string()).collect();
            return Err(ClientError::ConnectionFailure {
                endpoint: seeds.join(","),
                reason: "no seed answered the initial probe".to_string(),
            });
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = Arc::clone(&monitor).spawn(shutdown_rx);

        log_event_with_fields(
            Event::ClientOpen,
            &[
                ("replica_set", options.replica_set.as_deref().unwrap_or("")),
                ("members", &snapshot.len().to_string()),
                ("healthy", &snapshot.healthy().count().to_string()),
                ("regions", &snapshot.regions().join(",")),
            ],
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                options,
                topology,
                connections,
                executor,
                monitor,
                metrics,
                shutdown_tx,
                monitor_handle: Mutex::new(Some(handle)),
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn database(&self, name: impl Into<String>) -> Database {
        Database {
            client: self.clone(),
            name: name.into(),
        }
    }

    /// The snapshot currently published.
    pub fn topology(&self) -> Arc<TopologySnapshot> {
        self.inner.topology.load()
    }

    /// Probe now instead of waiting for the next heartbeat.
    pub async fn refresh_topology(&self) -> ClientResult<Arc<TopologySnapshot>> {
        self.ensure_open()?;
        Ok(self.inner.monitor.refresh_once().await)
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.inner.connections
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop the monitor and drop every pooled connection. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.inner.shutdown_tx.send(());
        let handle = self.inner.monitor_handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log_event_with_fields(Event::MonitorFailed, &[("error", &e.to_string())]);
            }
        }
        self.inner.connections.close();

        log_event(Event::ClientClose);
    }

    fn ensure_open(&self) -> ClientResult<()> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        Ok(())
    }
}

/// Handle to one database
#[derive(Clone)]
pub struct Database {
    client: Client,
    name: String,
}

impl Database {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to a collection, reading with the client's default policy.
    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection {
            policy: self.client.inner.options.default_read_policy.clone(),
            namespace: Namespace::new(self.name.clone(), name),
            client: self.client.clone(),
        }
    }
}

/// Handle to one collection, bound to a read policy
#[derive(Clone)]
pub struct Collection {
    client: Client,
    namespace: Namespace,
    policy: ReadPolicy,
}

impl Collection {
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn read_policy(&self) -> &ReadPolicy {
        &self.policy
    }

    /// Same collection, reads routed by `policy`.
    pub fn with_read_policy(&self, policy: ReadPolicy) -> Collection {
        Collection {
            client: self.client.clone(),
            namespace: self.namespace.clone(),
            policy,
        }
    }

    /// Write a document to the primary, returning its `_id`.
    ///
    /// A UUID `_id` is assigned when the document has none.
    pub async fn insert_one(&self, mut document: Document) -> ClientResult<Value> {
        self.client.ensure_open()?;

        let id = document
            .entry("_id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()))
            .clone();

        let endpoint = self.client.inner.executor.insert(&self.namespace, document).await?;
        log_event_at(
            Severity::Trace,
            Event::WriteCommit,
            &[
                ("namespace", &self.namespace.to_string()),
                ("endpoint", &endpoint.to_string()),
                ("_id", &id.to_string()),
            ],
        );
        Ok(id)
    }

    /// Read matching documents from a member chosen by the bound policy.
    pub async fn find(&self, query: &Query) -> ClientResult<ReadOutcome> {
        self.client.ensure_open()?;
        self.client
            .inner
            .executor
            .execute(&self.policy, &self.namespace, query)
            .await
    }

    /// Number of matching documents on the member chosen by the bound policy.
    pub async fn count(&self, query: &Query) -> ClientResult<usize> {
        self.find(query).await.map(|outcome| outcome.documents.len())
    }
}
