//! Transport seam between the router and replica set members
//!
//! The router never speaks a wire protocol itself. It opens connections
//! through a [`Connector`] and issues three operations on them: a monitoring
//! `hello`, a `find` and an `insert`. [`memory::SimulatedCluster`] is the
//! in-process implementation used by the sample program and the tests.

pub mod memory;
mod message;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::topology::Endpoint;

pub use message::{Document, HelloReply, Namespace, Query};

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures reported by a connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Member could not be reached or the connection broke
    #[error("network error: {0}")]
    Network(String),

    /// Operation did not complete in time
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Member answered and refused the operation
    #[error("rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Whether retrying against another member may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// Opens connections to members
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Endpoint) -> TransportResult<Box<dyn Connection>>;
}

/// One open connection to one member
#[async_trait]
pub trait Connection: Send {
    /// Monitoring round-trip.
    async fn hello(&mut self) -> TransportResult<HelloReply>;

    async fn find(&mut self, namespace: &Namespace, query: &Query) -> TransportResult<Vec<Document>>;

    async fn insert(&mut self, namespace: &Namespace, document: Document) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Network("reset".into()).is_transient());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!TransportError::Rejected("bad".into()).is_transient());
    }

    #[test]
    fn test_timeout_display() {
        let err = TransportError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "timed out after 1500ms");
    }
}
