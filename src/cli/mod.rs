//! CLI module for georead
//!
//! Provides command-line interface for:
//! - run: the insert / wait / regional read sample
//! - check-config: validate and print configuration
//! - topology: print the discovered replica set

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{check_config, run, run_command, run_sample, topology, ReadReport, SampleReport};
pub use errors::{CliError, CliErrorCode, CliResult};
