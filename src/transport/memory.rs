//! In-process multi-region replica set
//!
//! Every member has its own document store. Writes are accepted only by the
//! primary and reach each secondary after the configured replication delay,
//! so a read routed to a secondary right after a write can miss it, as it
//! would against a geo-replicated cluster.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use super::{Connection, Connector, Document, HelloReply, Namespace, Query, TransportError, TransportResult};
use crate::topology::{Endpoint, Role};

/// Static description of one simulated member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSpec {
    pub endpoint: Endpoint,
    pub region: String,
    pub role: Role,
    /// One-way delay added to every operation
    pub latency: Duration,
}

impl MemberSpec {
    pub fn new(endpoint: Endpoint, region: impl Into<String>, role: Role, latency: Duration) -> Self {
        Self {
            endpoint,
            region: region.into(),
            role,
            latency,
        }
    }
}

#[derive(Debug)]
struct SimMember {
    spec: MemberSpec,
    // Current one-way delay in nanoseconds, starts at `spec.latency`
    latency_nanos: AtomicU64,
    available: AtomicBool,
    rejection: Mutex<Option<String>>,
    store: Mutex<HashMap<Namespace, Vec<Document>>>,
}

impl SimMember {
    fn new(spec: MemberSpec) -> Self {
        Self {
            latency_nanos: AtomicU64::new(spec.latency.as_nanos() as u64),
            spec,
            available: AtomicBool::new(true),
            rejection: Mutex::new(None),
            store: Mutex::new(HashMap::new()),
        }
    }

    fn apply(&self, namespace: &Namespace, document: Document) {
        if let Ok(mut store) = self.store.lock() {
            store.entry(namespace.clone()).or_default().push(document);
        }
    }

    fn latency(&self) -> Duration {
        Duration::from_nanos(self.latency_nanos.load(Ordering::SeqCst))
    }

    fn rejection(&self) -> Option<String> {
        self.rejection.lock().ok().and_then(|r| r.clone())
    }
}

#[derive(Debug)]
struct ClusterState {
    members: RwLock<BTreeMap<Endpoint, Arc<SimMember>>>,
    replication_delay: Duration,
    jitter: Duration,
}

impl ClusterState {
    fn member(&self, endpoint: &Endpoint) -> TransportResult<Arc<SimMember>> {
        let member = self
            .members
            .read()
            .ok()
            .and_then(|m| m.get(endpoint).cloned())
            .ok_or_else(|| TransportError::Network(format!("connection refused by {}", endpoint)))?;

        if !member.available.load(Ordering::SeqCst) {
            return Err(TransportError::Network(format!("{} is unreachable", endpoint)));
        }
        Ok(member)
    }

    fn delay(&self, member: &SimMember) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return member.latency();
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        member.latency() + Duration::from_millis(extra)
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.members
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn secondaries(&self) -> Vec<Arc<SimMember>> {
        self.members
            .read()
            .map(|m| {
                m.values()
                    .filter(|member| member.spec.role == Role::Secondary)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Simulated replica set implementing [`Connector`]
#[derive(Debug, Clone)]
pub struct SimulatedCluster {
    state: Arc<ClusterState>,
}

impl SimulatedCluster {
    pub fn new(replication_delay: Duration) -> Self {
        Self {
            state: Arc::new(ClusterState {
                members: RwLock::new(BTreeMap::new()),
                replication_delay,
                jitter: Duration::ZERO,
            }),
        }
    }

    /// Build a cluster from member specs.
    pub fn with_members(replication_delay: Duration, members: Vec<MemberSpec>) -> Self {
        let cluster = Self::new(replication_delay);
        for spec in members {
            cluster.add_member(spec);
        }
        cluster
    }

    /// Add up to `jitter` of random delay to every operation.
    ///
    /// Must be called before the cluster is shared.
    pub fn with_jitter(self, jitter: Duration) -> Self {
        let state = ClusterState {
            members: RwLock::new(self.state.members.read().map(|m| m.clone()).unwrap_or_default()),
            replication_delay: self.state.replication_delay,
            jitter,
        };
        Self {
            state: Arc::new(state),
        }
    }

    pub fn add_member(&self, spec: MemberSpec) {
        if let Ok(mut members) = self.state.members.write() {
            members.insert(spec.endpoint.clone(), Arc::new(SimMember::new(spec)));
        }
    }

    /// Remove a member from the replica set configuration.
    pub fn remove_member(&self, endpoint: &Endpoint) -> bool {
        self.state
            .members
            .write()
            .map(|mut m| m.remove(endpoint).is_some())
            .unwrap_or(false)
    }

    /// Take a member down or bring it back. Returns false for unknown members.
    pub fn set_available(&self, endpoint: &Endpoint, available: bool) -> bool {
        match self.state.members.read().ok().and_then(|m| m.get(endpoint).cloned()) {
            Some(member) => {
                member.available.store(available, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Change a member's one-way delay. Returns false for unknown members.
    pub fn set_latency(&self, endpoint: &Endpoint, latency: Duration) -> bool {
        match self.state.members.read().ok().and_then(|m| m.get(endpoint).cloned()) {
            Some(member) => {
                member.latency_nanos.store(latency.as_nanos() as u64, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Make a member refuse reads with the given reason, or clear it.
    pub fn set_rejection(&self, endpoint: &Endpoint, reason: Option<String>) -> bool {
        match self.state.members.read().ok().and_then(|m| m.get(endpoint).cloned()) {
            Some(member) => {
                if let Ok(mut rejection) = member.rejection.lock() {
                    *rejection = reason;
                }
                true
            }
            None => false,
        }
    }

    /// Documents currently stored on one member.
    pub fn document_count(&self, endpoint: &Endpoint, namespace: &Namespace) -> usize {
        self.state
            .members
            .read()
            .ok()
            .and_then(|m| m.get(endpoint).cloned())
            .and_then(|member| member.store.lock().ok().map(|s| s.get(namespace).map_or(0, Vec::len)))
            .unwrap_or(0)
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.state.endpoints()
    }
}

#[async_trait]
impl Connector for SimulatedCluster {
    async fn connect(&self, endpoint: &Endpoint) -> TransportResult<Box<dyn Connection>> {
        let member = self.state.member(endpoint)?;
        tokio::time::sleep(self.state.delay(&member)).await;
        Ok(Box::new(SimConnection {
            endpoint: endpoint.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimConnection {
    endpoint: Endpoint,
    state: Arc<ClusterState>,
}

#[async_trait]
impl Connection for SimConnection {
    async fn hello(&mut self) -> TransportResult<HelloReply> {
        let member = self.state.member(&self.endpoint)?;
        tokio::time::sleep(self.state.delay(&member)).await;

        let lag = match member.spec.role {
            Role::Secondary => Some(self.state.replication_delay),
            _ => None,
        };
        Ok(HelloReply {
            role: member.spec.role,
            region: Some(member.spec.region.clone()),
            lag,
            hosts: self.state.endpoints(),
        })
    }

    async fn find(&mut self, namespace: &Namespace, query: &Query) -> TransportResult<Vec<Document>> {
        let member = self.state.member(&self.endpoint)?;
        if let Some(reason) = member.rejection() {
            return Err(TransportError::Rejected(reason));
        }
        tokio::time::sleep(self.state.delay(&member)).await;

        let store = member
            .store
            .lock()
            .map_err(|_| TransportError::Network(format!("{} store unavailable", self.endpoint)))?;
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(store
            .get(namespace)
            .map(|docs| docs.iter().filter(|d| query.matches(d)).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&mut self, namespace: &Namespace, document: Document) -> TransportResult<()> {
        let member = self.state.member(&self.endpoint)?;
        if member.spec.role != Role::Primary {
            return Err(TransportError::Rejected(format!("{} is not primary", self.endpoint)));
        }
        tokio::time::sleep(self.state.delay(&member)).await;

        member.apply(namespace, document.clone());

        let delay = self.state.replication_delay;
        for secondary in self.state.secondaries() {
            if delay.is_zero() {
                secondary.apply(namespace, document.clone());
                continue;
            }
            let namespace = namespace.clone();
            let document = document.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                secondary.apply(&namespace, document);
            });
        }
        Ok(())
    }
}
