//! Immutable topology snapshots and their publication point
//!
//! A refresh builds a complete new [`TopologySnapshot`] and swaps it in as a
//! whole. Readers hold an `Arc` to whichever snapshot was current when they
//! loaded it, so they see either the old list or the new one, never a mix.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::endpoint::Endpoint;
use super::replica::Replica;

/// Point-in-time view of the replica set
#[derive(Debug, Clone, Serialize)]
pub struct TopologySnapshot {
    generation: u64,
    refreshed_at: DateTime<Utc>,
    replicas: Vec<Replica>,
}

impl TopologySnapshot {
    /// Build a snapshot. Replicas are ordered by endpoint.
    pub fn new(generation: u64, mut replicas: Vec<Replica>) -> Self {
        replicas.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        Self {
            generation,
            refreshed_at: Utc::now(),
            replicas,
        }
    }

    /// Generation-zero snapshot of seed endpoints, none of them probed yet.
    pub fn from_seeds(seeds: &[Endpoint]) -> Self {
        let mut replicas: Vec<Replica> = seeds.iter().cloned().map(Replica::new).collect();
        replicas.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        replicas.dedup_by(|a, b| a.endpoint == b.endpoint);
        Self::new(0, replicas)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    pub fn replicas(&self) -> &[Replica] {
        &self.replicas
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn get(&self, endpoint: &Endpoint) -> Option<&Replica> {
        self.replicas.iter().find(|r| &r.endpoint == endpoint)
    }

    /// The member currently reporting itself primary, healthy or not.
    pub fn primary(&self) -> Option<&Replica> {
        self.replicas.iter().find(|r| r.is_primary())
    }

    pub fn healthy(&self) -> impl Iterator<Item = &Replica> {
        self.replicas.iter().filter(|r| r.is_healthy())
    }

    /// Distinct region tags, sorted.
    pub fn regions(&self) -> Vec<&str> {
        let mut regions: Vec<&str> = self
            .replicas
            .iter()
            .filter_map(|r| r.region.as_deref())
            .collect();
        regions.sort_unstable();
        regions.dedup();
        regions
    }
}

/// Publication point for the current snapshot
#[derive(Debug)]
pub struct SharedTopology {
    current: RwLock<Arc<TopologySnapshot>>,
}

impl SharedTopology {
    pub fn new(initial: TopologySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// The current snapshot.
    ///
    /// The lock is held only long enough to clone the `Arc`.
    pub fn load(&self) -> Arc<TopologySnapshot> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the current snapshot, returning the one it replaced.
    pub fn publish(&self, snapshot: TopologySnapshot) -> Arc<TopologySnapshot> {
        let next = Arc::new(snapshot);
        let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, next)
    }
}
