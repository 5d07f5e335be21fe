//! Client errors

use thiserror::Error;

use crate::routing::RoutingError;
use crate::topology::Endpoint;
use crate::transport::TransportError;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced to callers of the client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// A member could not be reached, or did not answer in time
    #[error("connection to {endpoint} failed: {reason}")]
    ConnectionFailure { endpoint: String, reason: String },

    /// The policy cannot be satisfied by the current topology
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Every attempted candidate failed transiently
    #[error("all candidates failed for read policy '{policy}' after {attempts} attempt(s): {last_error}")]
    AllCandidatesFailed {
        policy: String,
        attempts: usize,
        last_error: String,
    },

    /// The query cannot be evaluated
    #[error("malformed query: {reason}")]
    MalformedQuery { reason: String },

    /// A member answered and refused the operation
    #[error("{endpoint} rejected the operation: {reason}")]
    Rejected { endpoint: String, reason: String },

    /// The client has been closed
    #[error("client is closed")]
    Closed,

    /// Options the client cannot run with
    #[error("invalid client option '{option}': {reason}")]
    InvalidOptions { option: &'static str, reason: String },
}

impl ClientError {
    pub fn connection_failure(endpoint: &Endpoint, reason: impl Into<String>) -> Self {
        Self::ConnectionFailure {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }

    /// Attribute a transport failure to the member it came from.
    pub fn from_transport(endpoint: &Endpoint, error: TransportError) -> Self {
        match error {
            TransportError::Network(_) | TransportError::Timeout(_) => {
                Self::connection_failure(endpoint, error.to_string())
            }
            TransportError::Rejected(reason) => Self::Rejected {
                endpoint: endpoint.to_string(),
                reason,
            },
        }
    }

    /// Whether the next candidate should be tried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transport_mapping() {
        let ep = Endpoint::new("west-1", 27017);

        let err = ClientError::from_transport(&ep, TransportError::Timeout(Duration::from_secs(10)));
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "connection to west-1:27017 failed: timed out after 10000ms");

        let err = ClientError::from_transport(&ep, TransportError::Rejected("unauthorized".into()));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_routing_errors_are_not_transient() {
        let err: ClientError = RoutingError::NoMatchingRegion {
            region: "West US".into(),
            known: "East US".into(),
        }
        .into();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("West US"));
    }

    #[test]
    fn test_all_candidates_failed_names_policy() {
        let err = ClientError::AllCandidatesFailed {
            policy: "region:West US".into(),
            attempts: 2,
            last_error: "timed out".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("region:West US"));
        assert!(msg.contains("2 attempt(s)"));
    }
}
