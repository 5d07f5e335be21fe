//! Routing errors

use thiserror::Error;

/// Result type for candidate resolution
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Reasons a policy cannot be satisfied by the current snapshot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// No healthy primary is known
    #[error("no primary available for read policy '{policy}'")]
    NoPrimaryAvailable { policy: String },

    /// No healthy member carries the requested region tag
    #[error("no healthy replica tagged region '{region}' (known regions: {known})")]
    NoMatchingRegion { region: String, known: String },
}
