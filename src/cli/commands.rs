//! CLI command implementations
//!
//! `run` is the sample program: open a client, write a batch of documents to
//! the primary, give replication time to reach the other regions, then read
//! back through a region-pinned read policy.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use crate::client::{Client, Collection};
use crate::config::AppConfig;
use crate::observability::{log_event_with_fields, Event, Logger, MetricsSnapshot};
use crate::routing::ReadPolicy;
use crate::transport::memory::SimulatedCluster;
use crate::transport::{Document, Query};

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Documents between progress lines while inserting
const PROGRESS_EVERY: u64 = 1_000;

/// Run the CLI: parse args and dispatch
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Run {
            config,
            policy,
            all_policies,
        } => run_sample(&config, policy.as_deref(), all_policies),
        Command::CheckConfig { config } => check_config(&config),
        Command::Topology { config } => topology(&config),
    }
}

/// One read as reported on stdout
#[derive(Debug, Clone, Serialize)]
pub struct ReadReport {
    pub policy: String,
    pub documents: usize,
    pub served_by: String,
    pub region: Option<String>,
    pub attempts: usize,
}

/// Final line of a sample run
#[derive(Debug, Clone, Serialize)]
pub struct SampleReport {
    pub inserted: u64,
    pub reads: Vec<ReadReport>,
    pub metrics: MetricsSnapshot,
}

/// Insert, wait, read from the target region.
pub fn run_sample(config_path: &Path, policy: Option<&str>, all_policies: bool) -> CliResult<()> {
    let config = load_config(config_path)?;
    let target = match policy {
        Some(p) => p
            .parse::<ReadPolicy>()
            .map_err(|e| CliError::config_error(format!("--policy: {}", e)))?,
        None => config.target_policy(),
    };
    let cluster = simulated_cluster(&config)?;

    let report = block_on(async {
        let client = Client::open(config.client_options()?, Arc::new(cluster)).await?;
        let result = sample(&client, &config, target, all_policies).await;
        client.close().await;
        result
    })?;

    write_json(&serde_json::to_value(&report)?)
}

async fn sample(
    client: &Client,
    config: &AppConfig,
    target: ReadPolicy,
    all_policies: bool,
) -> CliResult<SampleReport> {
    log_event_with_fields(
        Event::SampleStart,
        &[
            ("documents", &config.sample.document_count.to_string()),
            ("target", &target.to_string()),
        ],
    );

    let collection = client
        .database(&config.database_name)
        .collection(&config.collection_name);

    for i in 0..config.sample.document_count {
        let mut document = Document::new();
        document.insert("x".to_string(), Value::from(i));
        collection.insert_one(document).await?;
        if (i + 1) % PROGRESS_EVERY == 0 {
            log_event_with_fields(Event::InsertProgress, &[("inserted", &(i + 1).to_string())]);
        }
    }

    // A freshly created collection reaches the read regions asynchronously
    log_event_with_fields(
        Event::ReplicationWait,
        &[("wait_ms", &config.sample.replication_wait_ms.to_string())],
    );
    tokio::time::sleep(Duration::from_millis(config.sample.replication_wait_ms)).await;

    let mut policies = Vec::new();
    if all_policies {
        policies.extend([ReadPolicy::Primary, ReadPolicy::SecondaryPreferred, ReadPolicy::Nearest]);
    }
    policies.push(target);

    let mut reads = Vec::with_capacity(policies.len());
    for policy in policies {
        reads.push(read_with(&collection, policy).await?);
    }

    let report = SampleReport {
        inserted: config.sample.document_count,
        reads,
        metrics: client.metrics(),
    };
    log_event_with_fields(Event::SampleComplete, &[("reads", &report.reads.len().to_string())]);
    Ok(report)
}

async fn read_with(collection: &Collection, policy: ReadPolicy) -> CliResult<ReadReport> {
    let outcome = collection
        .with_read_policy(policy.clone())
        .find(&Query::all())
        .await?;

    Ok(ReadReport {
        policy: policy.to_string(),
        documents: outcome.documents.len(),
        served_by: outcome.served_by.to_string(),
        region: outcome.region,
        attempts: outcome.attempts,
    })
}

/// Validate configuration and print it with secrets masked.
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let options = config.client_options()?;

    write_json(&json!({
        "config": config.redacted(),
        "effective": {
            "seeds": options.seeds.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            "replica_set": options.replica_set,
            "socket_timeout_ms": options.socket_timeout.as_millis() as u64,
            "max_connection_idle_time_ms": options.max_connection_idle_time.as_millis() as u64,
            "heartbeat_connect_timeout_ms": options.heartbeat_connect_timeout.as_millis() as u64,
            "heartbeat_frequency_ms": options.heartbeat_frequency.as_millis() as u64,
            "failure_threshold": options.failure_threshold,
            "max_attempts": options.max_attempts,
            "default_read_policy": options.default_read_policy.to_string(),
            "target_policy": config.target_policy().to_string(),
        }
    }))
}

/// Discover the replica set and print the snapshot.
pub fn topology(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let cluster = simulated_cluster(&config)?;

    let snapshot = block_on(async {
        let client = Client::open(config.client_options()?, Arc::new(cluster)).await?;
        let snapshot = client.topology();
        client.close().await;
        Ok::<_, CliError>(snapshot)
    })?;

    write_json(&serde_json::to_value(snapshot.as_ref())?)
}

fn load_config(path: &Path) -> CliResult<AppConfig> {
    let config = AppConfig::load(path)?;
    Logger::set_min_severity(config.log_severity()?);
    Ok(config)
}

fn simulated_cluster(config: &AppConfig) -> CliResult<SimulatedCluster> {
    config.simulated_cluster().ok_or_else(|| {
        CliError::config_error(
            "no 'simulation' block: describe the replica set members to run against",
        )
    })
}

fn block_on<F, T>(future: F) -> CliResult<T>
where
    F: std::future::Future<Output = CliResult<T>>,
{
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::runtime_error(format!("Failed to create tokio runtime: {}", e)))?;
    rt.block_on(future)
}

fn write_json(value: &serde_json::Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
