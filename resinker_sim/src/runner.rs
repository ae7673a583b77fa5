//! Run controller.
//!
//! Wires a validated spec, a realistic-value provider, and the configured
//! sinks into an engine, then drives the scheduler loop until a budget
//! trips, the run starves, or a termination signal arrives. Shutdown is
//! orderly: the current commit finishes, sink queues drain, and every sink
//! flushes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use resinker_core::spec::SpecDocument;
use resinker_core::{Diagnostic, RealisticProvider, RunReport, TerminationReason};
use resinker_outputs::{build_sinks, SinkSet};

use crate::engine::{EngineOptions, SimEngine, TickOutcome};
use crate::error::EngineError;

/// Result of a run: the report plus collected diagnostics.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs a simulation to completion.
///
/// `shutdown` is the cooperative termination flag: setting it makes the
/// loop finish the in-flight commit, flush sinks, and report
/// `interrupted`.
pub async fn run_simulation(
    spec: SpecDocument,
    provider: Box<dyn RealisticProvider>,
    options: EngineOptions,
    shutdown: Arc<AtomicBool>,
) -> Result<RunOutcome, EngineError> {
    let sinks = build_sinks(&spec.outputs)?;
    info!(sinks = sinks.len(), "starting simulation");
    let sink_set = SinkSet::start(sinks);

    let mut engine = SimEngine::new(spec, provider, options)?;
    engine.initialize()?;

    let started = Instant::now();
    let mut failure: Option<EngineError> = None;
    let reason = loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("termination signal received, stopping");
            break TerminationReason::Interrupted;
        }
        match engine.tick() {
            Ok(TickOutcome::Emitted(event)) => {
                sink_set.dispatch(&event).await;
                if engine.events_emitted() % 100 == 0 {
                    info!(
                        events = engine.events_emitted(),
                        sim_time = %engine.clock().now(),
                        "progress"
                    );
                }
            }
            Ok(TickOutcome::Idle) => {
                // Let sink workers and the signal task run on
                // single-threaded executors.
                tokio::task::yield_now().await;
            }
            Ok(TickOutcome::Finished(finished)) => break finished,
            Err(e) => {
                failure = Some(e);
                break TerminationReason::Interrupted;
            }
        }
    };

    sink_set.shutdown().await;
    if let Some(e) = failure {
        return Err(e);
    }

    let report = RunReport {
        events_emitted: engine.events_emitted(),
        duration_observed: started.elapsed(),
        termination_reason: reason,
    };
    info!(
        events = report.events_emitted,
        elapsed = ?report.duration_observed,
        reason = %report.termination_reason,
        "simulation complete"
    );
    Ok(RunOutcome {
        report,
        diagnostics: engine.take_diagnostics(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use resinker_core::CommerceProvider;
    use serde_json::Value;

    fn spec(yaml: &str) -> SpecDocument {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_run_writes_events_through_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.ndjson");
        let yaml = format!(
            r#"
simulation_settings:
  total_events: 4
  random_seed: 1
  time_progression: {{ start_time: "2024-01-01T00:00:00Z", time_multiplier: 1.0 }}
schemas:
  Ping:
    type: object
    properties:
      ping_id: {{ type: string, generator: uuid_v4 }}
      at: {{ type: string, generator: current_timestamp }}
entities: {{}}
event_types:
  Ping:
    payload_schema: Ping
    frequency_weight: 1
outputs:
  - type: file
    file_path: {}
    format: json
"#,
            path.display()
        );

        let outcome = run_simulation(
            spec(&yaml),
            Box::new(CommerceProvider::new()),
            EngineOptions::default(),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();

        assert_eq!(outcome.report.events_emitted, 4);
        assert_eq!(
            outcome.report.termination_reason,
            TerminationReason::TotalEventsReached
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        for line in lines {
            let record: Value = serde_json::from_str(line).unwrap();
            assert_eq!(record["event_type"], "Ping");
            assert!(record["payload"]["ping_id"].is_string());
        }
    }

    #[tokio::test]
    async fn test_shutdown_flag_interrupts_run() {
        let yaml = r#"
simulation_settings:
  random_seed: 1
  time_progression: { start_time: "2024-01-01T00:00:00Z", time_multiplier: 1.0 }
schemas:
  Ping:
    type: object
    properties:
      ping_id: { type: string, generator: uuid_v4 }
entities: {}
event_types:
  Ping:
    payload_schema: Ping
    frequency_weight: 1
"#;
        // No budget at all: only the shutdown flag can end this run.
        let shutdown = Arc::new(AtomicBool::new(true));
        let outcome = run_simulation(
            spec(yaml),
            Box::new(CommerceProvider::new()),
            EngineOptions::default(),
            shutdown,
        )
        .await
        .unwrap();

        assert_eq!(
            outcome.report.termination_reason,
            TerminationReason::Interrupted
        );
        assert_eq!(outcome.report.events_emitted, 0);
    }
}
