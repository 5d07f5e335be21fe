//! Connection pools
//!
//! One pool per endpoint. A connection is checked out for exactly one
//! operation and checked back in only if that operation succeeded; a failed
//! connection is dropped. Idle connections older than the idle limit are
//! evicted on the next checkout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use super::errors::{ClientError, ClientResult};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::topology::Endpoint;
use crate::transport::{Connection, Connector};

/// Pool limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Idle connections unused for longer than this are closed
    pub max_idle_time: Duration,
    /// Idle connections kept per endpoint
    pub max_idle_per_endpoint: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_idle_time: Duration::from_secs(60),
            max_idle_per_endpoint: 8,
        }
    }
}

/// A connection on loan from the pool
pub struct PooledConnection {
    id: Uuid,
    endpoint: Endpoint,
    last_used: Instant,
    inner: Box<dyn Connection>,
}

impl PooledConnection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn connection(&mut self) -> &mut dyn Connection {
        self.inner.as_mut()
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Default)]
struct EndpointPool {
    idle: Vec<PooledConnection>,
    opened: u64,
}

/// Diagnostic view of one endpoint's pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub idle: usize,
    pub opened: u64,
}

/// Owns every pooled connection of a client
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    options: PoolOptions,
    pools: Mutex<HashMap<Endpoint, EndpointPool>>,
    closed: AtomicBool,
    metrics: Arc<MetricsRegistry>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, options: PoolOptions, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            connector,
            options,
            pools: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            metrics,
        }
    }

    /// Borrow a connection to `endpoint`, opening one if no idle connection
    /// is fresh enough.
    pub async fn checkout(&self, endpoint: &Endpoint) -> ClientResult<PooledConnection> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        if let Some(conn) = self.take_idle(endpoint) {
            return Ok(conn);
        }

        let inner = self
            .connector
            .connect(endpoint)
            .await
            .map_err(|e| ClientError::from_transport(endpoint, e))?;

        let id = Uuid::new_v4();
        if let Ok(mut pools) = self.pools.lock() {
            pools.entry(endpoint.clone()).or_default().opened += 1;
        }
        self.metrics.increment_connections_opened();
        log_event_with_fields(
            Event::ConnectionOpened,
            &[("endpoint", &endpoint.to_string()), ("connection_id", &id.to_string())],
        );

        Ok(PooledConnection {
            id,
            endpoint: endpoint.clone(),
            last_used: Instant::now(),
            inner,
        })
    }

    /// Return a connection after a successful operation.
    pub fn checkin(&self, mut conn: PooledConnection) {
        if self.is_closed() {
            return;
        }
        conn.last_used = Instant::now();
        if let Ok(mut pools) = self.pools.lock() {
            let pool = pools.entry(conn.endpoint.clone()).or_default();
            if pool.idle.len() < self.options.max_idle_per_endpoint {
                pool.idle.push(conn);
            }
        }
    }

    /// Close every idle connection to `endpoint`. Returns how many were closed.
    pub fn disconnect(&self, endpoint: &Endpoint) -> usize {
        self.pools
            .lock()
            .ok()
            .and_then(|mut pools| pools.remove(endpoint))
            .map_or(0, |pool| pool.idle.len())
    }

    /// Close all pools and refuse further checkouts.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut pools) = self.pools.lock() {
            pools.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pool_state(&self, endpoint: &Endpoint) -> Option<PoolState> {
        let pools = self.pools.lock().ok()?;
        pools.get(endpoint).map(|pool| PoolState {
            idle: pool.idle.len(),
            opened: pool.opened,
        })
    }

    fn take_idle(&self, endpoint: &Endpoint) -> Option<PooledConnection> {
        let mut pools = self.pools.lock().ok()?;
        let pool = pools.get_mut(endpoint)?;

        // Most recently used last, so pop until a fresh one turns up
        while let Some(conn) = pool.idle.pop() {
            if conn.last_used.elapsed() <= self.options.max_idle_time {
                return Some(conn);
            }
            log_event_with_fields(
                Event::ConnectionEvicted,
                &[("endpoint", &endpoint.to_string()), ("connection_id", &conn.id.to_string())],
            );
        }
        None
    }
}
