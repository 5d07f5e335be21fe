//! Observability for georead
//!
//! - Structured logging (JSON lines)
//! - Atomic counters
//! - Typed lifecycle events
//!
//! # Usage
//!
//! ```ignore
//! use georead::observability::{log_event_with_fields, Event, MetricsRegistry};
//!
//! log_event_with_fields(Event::ReadComplete, &[("endpoint", "west-1:27017")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_reads_executed();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Severity an event is logged at unless the caller chooses otherwise
fn default_severity(event: Event) -> Severity {
    match event {
        Event::ProbeFailed | Event::ConnectionOpened | Event::ConnectionEvicted => {
            Severity::Trace
        }
        Event::UnknownUriOption
        | Event::ReplicaUnreachable
        | Event::ReplicaRemoved
        | Event::ReadRetry => Severity::Warn,
        Event::ReadFailed | Event::MonitorFailed => Severity::Error,
        _ => Severity::Info,
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    Logger::log(default_severity(event), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(default_severity(event), event.as_str(), fields);
}

/// Log an event at an explicit severity
pub fn log_event_at(severity: Severity, event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity, event.as_str(), fields);
}
