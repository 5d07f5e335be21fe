//! Typed configuration
//!
//! Loaded once from a JSON file and validated before anything connects.
//! Required fields have no defaults: an absent or empty value is a startup
//! error naming the field. Tuning fields default to the values below and
//! can be overridden by options in the connection string.

mod connection_string;
mod errors;

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use connection_string::ConnectionString;
pub use errors::{ConfigError, ConfigResult};

use crate::client::ClientOptions;
use crate::observability::{log_event_with_fields, Event, Severity};
use crate::routing::ReadPolicy;
use crate::topology::{Endpoint, Role};
use crate::transport::memory::{MemberSpec, SimulatedCluster};

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Replica set connection string (required)
    #[serde(default)]
    pub connection_string: String,

    /// Region tag the sample reads from (required)
    #[serde(default)]
    pub read_target_region: String,

    /// Database written and read by the sample (required)
    #[serde(default)]
    pub database_name: String,

    /// Collection written and read by the sample (required)
    #[serde(default)]
    pub collection_name: String,

    /// Minimum log severity (default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub client: ClientSection,

    #[serde(default)]
    pub sample: SampleSection,

    /// In-process cluster the sample runs against
    #[serde(default)]
    pub simulation: Option<SimulationSection>,
}

/// Client tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub socket_timeout_ms: u64,
    pub max_connection_idle_time_ms: u64,
    pub max_idle_connections_per_endpoint: usize,
    pub heartbeat_connect_timeout_ms: u64,
    pub heartbeat_frequency_ms: u64,
    pub failure_threshold: u32,
    pub max_attempts: usize,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            socket_timeout_ms: 10_000,
            max_connection_idle_time_ms: 60_000,
            max_idle_connections_per_endpoint: 8,
            heartbeat_connect_timeout_ms: 5_000,
            heartbeat_frequency_ms: 10_000,
            failure_threshold: 3,
            max_attempts: 3,
        }
    }
}

/// Sample program settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleSection {
    /// Documents inserted before reading
    pub document_count: u64,
    /// Pause between the last insert and the regional read
    pub replication_wait_ms: u64,
}

impl Default for SampleSection {
    fn default() -> Self {
        Self {
            document_count: 1_000,
            replication_wait_ms: 5_000,
        }
    }
}

/// Simulated cluster description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationSection {
    #[serde(default)]
    pub replication_delay_ms: u64,
    #[serde(default)]
    pub latency_jitter_ms: u64,
    pub members: Vec<SimulatedMember>,
}

/// One simulated member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedMember {
    pub endpoint: Endpoint,
    pub region: String,
    pub role: Role,
    #[serde(default)]
    pub latency_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config = Self::from_json(&content)?;
        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("path", &path.display().to_string()),
                ("database", &config.database_name),
                ("collection", &config.collection_name),
                ("read_target_region", &config.read_target_region),
            ],
        );
        Ok(config)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: AppConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields in order, then everything else.
    pub fn validate(&self) -> ConfigResult<()> {
        let required = [
            (&self.connection_string, "connection_string", "connection string"),
            (&self.read_target_region, "read_target_region", "target read region for tags"),
            (&self.database_name, "database_name", "database name"),
            (&self.collection_name, "collection_name", "collection name"),
        ];
        for (value, field, description) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::missing(field, description));
            }
        }

        self.connection()?;
        self.log_severity()?;

        let c = &self.client;
        for (field, value) in [
            ("client.socket_timeout_ms", c.socket_timeout_ms),
            ("client.max_connection_idle_time_ms", c.max_connection_idle_time_ms),
            ("client.heartbeat_connect_timeout_ms", c.heartbeat_connect_timeout_ms),
            ("client.heartbeat_frequency_ms", c.heartbeat_frequency_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be > 0"));
            }
        }
        if c.failure_threshold == 0 {
            return Err(ConfigError::invalid("client.failure_threshold", "must be > 0"));
        }
        if c.max_attempts == 0 {
            return Err(ConfigError::invalid("client.max_attempts", "must be > 0"));
        }

        if let Some(sim) = &self.simulation {
            sim.validate()?;
        }
        self.client_options()?;
        Ok(())
    }

    pub fn connection(&self) -> ConfigResult<ConnectionString> {
        ConnectionString::parse(&self.connection_string)
    }

    pub fn log_severity(&self) -> ConfigResult<Severity> {
        self.log_level
            .parse::<Severity>()
            .map_err(|reason| ConfigError::invalid("log_level", reason))
    }

    /// Policy the sample's regional read uses.
    pub fn target_policy(&self) -> ReadPolicy {
        ReadPolicy::tagged_region(self.read_target_region.trim())
    }

    /// Client options: file values, overridden by connection string options.
    pub fn client_options(&self) -> ConfigResult<ClientOptions> {
        let cs = self.connection()?;
        let c = &self.client;

        let mut options = ClientOptions::with_seeds(cs.hosts.clone());
        options.replica_set = cs.replica_set.clone();
        options.socket_timeout = cs
            .socket_timeout
            .unwrap_or(Duration::from_millis(c.socket_timeout_ms));
        options.max_connection_idle_time = cs
            .max_idle_time
            .unwrap_or(Duration::from_millis(c.max_connection_idle_time_ms));
        options.max_idle_per_endpoint = c.max_idle_connections_per_endpoint;
        options.heartbeat_connect_timeout = cs
            .connect_timeout
            .unwrap_or(Duration::from_millis(c.heartbeat_connect_timeout_ms));
        options.heartbeat_frequency = cs
            .heartbeat_frequency
            .unwrap_or(Duration::from_millis(c.heartbeat_frequency_ms));
        options.failure_threshold = c.failure_threshold;
        options.max_attempts = c.max_attempts;
        if let Some(policy) = cs.read_policy {
            options.default_read_policy = policy;
        }

        // Same bounds as the file values, whichever source won
        for (name, value) in [
            ("socketTimeoutMS", options.socket_timeout),
            ("maxIdleTimeMS", options.max_connection_idle_time),
            ("connectTimeoutMS", options.heartbeat_connect_timeout),
            ("heartbeatFrequencyMS", options.heartbeat_frequency),
        ] {
            if value.is_zero() {
                return Err(ConfigError::invalid(
                    "connection_string",
                    format!("{} must be > 0", name),
                ));
            }
        }
        Ok(options)
    }

    /// Build the simulated cluster, if one is configured.
    pub fn simulated_cluster(&self) -> Option<SimulatedCluster> {
        let sim = self.simulation.as_ref()?;
        let members = sim
            .members
            .iter()
            .map(|m| {
                MemberSpec::new(
                    m.endpoint.clone(),
                    m.region.clone(),
                    m.role,
                    Duration::from_millis(m.latency_ms),
                )
            })
            .collect();
        Some(
            SimulatedCluster::with_members(Duration::from_millis(sim.replication_delay_ms), members)
                .with_jitter(Duration::from_millis(sim.latency_jitter_ms)),
        )
    }

    /// Copy safe to print: the connection string password is masked.
    pub fn redacted(&self) -> AppConfig {
        let mut copy = self.clone();
        if let Ok(cs) = self.connection() {
            copy.connection_string = cs.to_string();
        }
        copy
    }
}

impl SimulationSection {
    fn validate(&self) -> ConfigResult<()> {
        if self.members.is_empty() {
            return Err(ConfigError::invalid("simulation.members", "at least one member is required"));
        }

        let primaries = self.members.iter().filter(|m| m.role == Role::Primary).count();
        if primaries != 1 {
            return Err(ConfigError::invalid(
                "simulation.members",
                format!("exactly one primary is required, found {}", primaries),
            ));
        }
        if let Some(m) = self.members.iter().find(|m| m.role == Role::Unknown) {
            return Err(ConfigError::invalid(
                "simulation.members",
                format!("{} must be primary or secondary", m.endpoint),
            ));
        }
        if let Some(m) = self.members.iter().find(|m| m.region.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "simulation.members",
                format!("{} has no region", m.endpoint),
            ));
        }
        Ok(())
    }
}
