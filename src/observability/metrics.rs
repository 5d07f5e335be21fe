//! Metrics registry for the read router
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters shared by the client, monitor and executor
///
/// All counters use Relaxed ordering; exact cross-counter consistency is not
/// required.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    reads_executed: AtomicU64,
    reads_failed: AtomicU64,
    read_retries: AtomicU64,
    probes_sent: AtomicU64,
    probes_failed: AtomicU64,
    topology_refreshes: AtomicU64,
    connections_opened: AtomicU64,
    documents_inserted: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_reads_executed(&self) {
        self.reads_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reads_failed(&self) {
        self.reads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_read_retries(&self) {
        self.read_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_probes_sent(&self) {
        self.probes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_probes_failed(&self) {
        self.probes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_topology_refreshes(&self) {
        self.topology_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_connections_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_documents_inserted(&self) {
        self.documents_inserted.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reads_executed: self.reads_executed.load(Ordering::Relaxed),
            reads_failed: self.reads_failed.load(Ordering::Relaxed),
            read_retries: self.read_retries.load(Ordering::Relaxed),
            probes_sent: self.probes_sent.load(Ordering::Relaxed),
            probes_failed: self.probes_failed.load(Ordering::Relaxed),
            topology_refreshes: self.topology_refreshes.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            documents_inserted: self.documents_inserted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`MetricsRegistry`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub reads_executed: u64,
    pub reads_failed: u64,
    pub read_retries: u64,
    pub probes_sent: u64,
    pub probes_failed: u64,
    pub topology_refreshes: u64,
    pub connections_opened: u64,
    pub documents_inserted: u64,
}
