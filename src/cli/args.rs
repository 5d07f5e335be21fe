//! CLI argument definitions using clap
//!
//! Commands:
//! - georead run --config <path> [--policy <policy>] [--all-policies]
//! - georead check-config --config <path>
//! - georead topology --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// georead - region-aware reads against a replicated document database
#[derive(Parser, Debug)]
#[command(name = "georead")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Insert a batch of documents, wait for replication, read from the target region
    Run {
        /// Path to configuration file
        #[arg(long, default_value = "./georead.json")]
        config: PathBuf,

        /// Read policy for the final read instead of the configured region
        /// (primary, secondaryPreferred, nearest, region:<name>)
        #[arg(long)]
        policy: Option<String>,

        /// Also read with primary, secondaryPreferred and nearest
        #[arg(long)]
        all_policies: bool,
    },

    /// Validate the configuration and print it with secrets masked
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./georead.json")]
        config: PathBuf,
    },

    /// Discover the replica set and print the topology snapshot
    Topology {
        /// Path to configuration file
        #[arg(long, default_value = "./georead.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
