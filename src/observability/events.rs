//! Observable events
//!
//! Every log line the router emits names one of these events.

use std::fmt;

/// Observable events in georead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Client opened, initial discovery done
    ClientOpen,
    /// Client closed, monitor stopped
    ClientClose,
    /// Unrecognised connection string option
    UnknownUriOption,

    // Topology
    /// Monitor task started
    MonitorStart,
    /// Monitor task stopped
    MonitorStop,
    /// Monitor task ended abnormally
    MonitorFailed,
    /// New snapshot published
    TopologyRefreshed,
    /// Replica added to the topology
    ReplicaAdded,
    /// First successful probe of a replica
    ReplicaDiscovered,
    /// Replica no longer reported by the cluster
    ReplicaRemoved,
    /// Probe of one replica failed
    ProbeFailed,
    /// Replica crossed the failure threshold
    ReplicaUnreachable,
    /// Replica answered again after being unreachable
    ReplicaRecovered,

    // Connections
    /// New connection opened
    ConnectionOpened,
    /// Idle connection evicted
    ConnectionEvicted,

    // Reads and writes
    /// Read attempt failed transiently, moving to the next candidate
    ReadRetry,
    /// Read served
    ReadComplete,
    /// Read failed
    ReadFailed,
    /// Document written to the primary
    WriteCommit,

    // Sample program
    /// Sample run begins
    SampleStart,
    /// Batch of sample documents written
    InsertProgress,
    /// Waiting for replication to catch up
    ReplicationWait,
    /// Sample run complete
    SampleComplete,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ClientOpen => "CLIENT_OPEN",
            Event::ClientClose => "CLIENT_CLOSE",
            Event::UnknownUriOption => "UNKNOWN_URI_OPTION",

            Event::MonitorStart => "MONITOR_START",
            Event::MonitorStop => "MONITOR_STOP",
            Event::MonitorFailed => "MONITOR_FAILED",
            Event::TopologyRefreshed => "TOPOLOGY_REFRESHED",
            Event::ReplicaAdded => "REPLICA_ADDED",
            Event::ReplicaDiscovered => "REPLICA_DISCOVERED",
            Event::ReplicaRemoved => "REPLICA_REMOVED",
            Event::ProbeFailed => "PROBE_FAILED",
            Event::ReplicaUnreachable => "REPLICA_UNREACHABLE",
            Event::ReplicaRecovered => "REPLICA_RECOVERED",

            Event::ConnectionOpened => "CONNECTION_OPENED",
            Event::ConnectionEvicted => "CONNECTION_EVICTED",

            Event::ReadRetry => "READ_RETRY",
            Event::ReadComplete => "READ_COMPLETE",
            Event::ReadFailed => "READ_FAILED",
            Event::WriteCommit => "WRITE_COMMIT",

            Event::SampleStart => "SAMPLE_START",
            Event::InsertProgress => "INSERT_PROGRESS",
            Event::ReplicationWait => "REPLICATION_WAIT",
            Event::SampleComplete => "SAMPLE_COMPLETE",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_follow_variants() {
        assert_eq!(Event::SampleStart.as_str(), "SAMPLE_START");
        assert_eq!(Event::InsertProgress.as_str(), "INSERT_PROGRESS");
        assert_eq!(Event::MonitorFailed.as_str(), "MONITOR_FAILED");
        assert_eq!(Event::ReplicaUnreachable.to_string(), "REPLICA_UNREACHABLE");
    }
}
