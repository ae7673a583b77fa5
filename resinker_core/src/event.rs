//! Emitted-record and run-result types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::time::Duration;

use crate::spec::OutputFormat;

/// A single emitted record.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event type name from the spec
    pub event_type: String,

    /// Synthetic timestamp at emission
    pub timestamp: DateTime<Utc>,

    /// Payload conforming to the event's schema
    pub payload: Value,
}

impl Event {
    /// Builds the wire representation: `event_type`, `timestamp` (ISO 8601),
    /// `payload`, in that key order.
    pub fn to_json(&self) -> Value {
        let mut record = serde_json::Map::new();
        record.insert("event_type".to_string(), Value::String(self.event_type.clone()));
        record.insert(
            "timestamp".to_string(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        record.insert("payload".to_string(), self.payload.clone());
        Value::Object(record)
    }

    /// Renders the record in the given sink format. Pretty output uses
    /// two-space indentation and declared key order.
    pub fn render(&self, format: OutputFormat) -> String {
        let json = self.to_json();
        match format {
            // to_string on a Value we built ourselves cannot fail
            OutputFormat::Json => serde_json::to_string(&json).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(&json).unwrap_or_default(),
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The duration budget elapsed
    DurationReached,
    /// The total-events budget was reached
    TotalEventsReached,
    /// No feasible event for longer than the starvation bound
    Starved,
    /// A termination signal was received
    Interrupted,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::DurationReached => "duration_reached",
            TerminationReason::TotalEventsReached => "total_events_reached",
            TerminationReason::Starved => "starved",
            TerminationReason::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Records delivered to sinks
    pub events_emitted: u64,

    /// Wall-clock time the run took
    pub duration_observed: Duration,

    pub termination_reason: TerminationReason,
}

/// Severity of a run diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// A diagnostic collected during a run.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            message: message.into(),
        }
    }
}
