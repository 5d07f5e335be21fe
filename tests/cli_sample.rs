//! CLI Sample Tests
//!
//! Runs the commands end to end from a configuration file on disk.

use std::io::Write;

use georead::cli::{check_config, run_sample, topology, CliErrorCode};
use tempfile::NamedTempFile;

const CONFIG: &str = r#"{
    "connection_string": "mongodb://east-1:27017/?replicaSet=globaldb&heartbeatFrequencyMS=60000",
    "read_target_region": "West US",
    "database_name": "georead",
    "collection_name": "samples",
    "log_level": "error",
    "sample": { "document_count": 20, "replication_wait_ms": 100 },
    "simulation": {
        "replication_delay_ms": 20,
        "members": [
            { "endpoint": "east-1:27017", "region": "East US", "role": "primary", "latency_ms": 1 },
            { "endpoint": "west-1:27017", "region": "West US", "role": "secondary", "latency_ms": 3 },
            { "endpoint": "eu-1:27017", "region": "North Europe", "role": "secondary", "latency_ms": 5 }
        ]
    }
}"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_sample_runs_against_simulation() {
    let file = write_config(CONFIG);
    run_sample(file.path(), None, true).unwrap();
}

#[test]
fn test_sample_with_policy_override() {
    let file = write_config(CONFIG);
    run_sample(file.path(), Some("nearest"), false).unwrap();

    let err = run_sample(file.path(), Some("fastest"), false).unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::ConfigError);
}

#[test]
fn test_sample_fails_for_unknown_region() {
    let content = CONFIG.replace("\"read_target_region\": \"West US\"", "\"read_target_region\": \"Mars\"");
    let file = write_config(&content);

    let err = run_sample(file.path(), None, false).unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::ClientError);
    assert!(err.message().contains("Mars"));
}

#[test]
fn test_check_config_and_topology() {
    let file = write_config(CONFIG);
    check_config(file.path()).unwrap();
    topology(file.path()).unwrap();
}

#[test]
fn test_missing_simulation_is_config_error() {
    let mut json: serde_json::Value = serde_json::from_str(CONFIG).unwrap();
    json.as_object_mut().unwrap().remove("simulation");
    let file = write_config(&json.to_string());

    let err = run_sample(file.path(), None, false).unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::ConfigError);
}

#[test]
fn test_missing_required_field_names_it() {
    let mut json: serde_json::Value = serde_json::from_str(CONFIG).unwrap();
    json.as_object_mut().unwrap().remove("database_name");
    let file = write_config(&json.to_string());

    let err = check_config(file.path()).unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::ConfigError);
    assert!(err.message().contains("database_name"));
}
