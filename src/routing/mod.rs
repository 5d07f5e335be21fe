//! Read-preference routing
//!
//! Maps a [`ReadPolicy`] and a topology snapshot to the ordered list of
//! members a read should be attempted against.

mod errors;
mod policy;
mod resolver;

pub use errors::{RoutingError, RoutingResult};
pub use policy::ReadPolicy;
pub use resolver::resolve;
