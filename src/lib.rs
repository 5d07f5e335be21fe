//! georead - region-aware reads against a replicated document database
//!
//! A client that discovers a replica set spread across regions, keeps a
//! continuously refreshed view of each member's role, region, health and
//! latency, and routes every read to a member chosen by a read policy.
//!
//! Layers, bottom-up:
//! - `transport`: the connection seam and an in-process simulated cluster
//! - `topology`: endpoints, replica state, snapshots and the monitor task
//! - `routing`: read policies and candidate resolution
//! - `client`: connection pools, query execution and the client handle
//! - `config`: file and connection string configuration
//! - `cli`: the sample program

pub mod cli;
pub mod client;
pub mod config;
pub mod observability;
pub mod routing;
pub mod topology;
pub mod transport;
