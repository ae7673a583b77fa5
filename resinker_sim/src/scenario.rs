//! In-flight scenario runs.
//!
//! A scenario run is a small state machine over step indices plus optional
//! loop counters, owned by the scheduler and destroyed on completion. The
//! binding context captured at initiation is threaded unchanged across
//! steps; entities a step produces or resolves join it as they appear.

use chrono::{DateTime, Utc};
use rand::Rng;

use resinker_core::spec::{DelayRange, ScenarioDef, ScenarioStep};

use crate::clock::SimClock;
use crate::prng::PrngStreams;
use crate::resolver::{CapturedBindings, CapturedRef};

#[derive(Debug)]
pub struct ScenarioRun {
    pub scenario_name: String,
    pub step_index: usize,

    /// Alias → instance references threaded across steps
    pub bindings: CapturedBindings,

    /// Earliest synthetic time the current step is due; `None` means now
    pub pending_wakeup: Option<DateTime<Utc>>,

    /// Remaining iterations of the current step's loop, once sampled
    loop_remaining: Option<u32>,
}

impl ScenarioRun {
    pub fn new(scenario_name: impl Into<String>, bindings: CapturedBindings) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            step_index: 0,
            bindings,
            pending_wakeup: None,
            loop_remaining: None,
        }
    }

    /// Applies the first step's delay, if it declares one.
    pub fn schedule_first_step(
        &mut self,
        definition: &ScenarioDef,
        streams: &mut PrngStreams,
        clock: &SimClock,
    ) {
        if let Some(step) = definition.steps.first() {
            if let Some(delay) = &step.delay_after_previous_step {
                self.pending_wakeup = Some(wakeup_after(clock, *delay, streams));
            }
        }
    }

    pub fn current_step<'a>(&self, definition: &'a ScenarioDef) -> Option<&'a ScenarioStep> {
        definition.steps.get(self.step_index)
    }

    pub fn is_complete(&self, definition: &ScenarioDef) -> bool {
        self.step_index >= definition.steps.len()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.pending_wakeup {
            None => true,
            Some(wakeup) => wakeup <= now,
        }
    }

    /// Records an entity produced by a step, addressable by its kind name
    /// in later steps. An existing alias is never overwritten.
    pub fn record_produced(&mut self, kind: &str, key: &str) {
        self.bindings
            .entry(kind.to_string())
            .or_insert_with(|| CapturedRef {
                kind: kind.to_string(),
                key: key.to_string(),
            });
    }

    /// Records the instance a step resolved for a consumption alias, so
    /// later steps reuse the same instance.
    pub fn record_resolved(&mut self, alias: &str, kind: &str, key: &str) {
        self.bindings
            .entry(alias.to_string())
            .or_insert_with(|| CapturedRef {
                kind: kind.to_string(),
                key: key.to_string(),
            });
    }

    /// Advances past the just-committed step: loops stay on the step until
    /// their sampled count is exhausted, then the index moves on and the
    /// next step's delay is sampled.
    pub fn advance(
        &mut self,
        definition: &ScenarioDef,
        streams: &mut PrngStreams,
        clock: &SimClock,
    ) {
        let Some(step) = definition.steps.get(self.step_index) else {
            return;
        };

        if let Some(repeat) = &step.repeat {
            let total = self.loop_remaining.unwrap_or_else(|| {
                if repeat.min_count >= repeat.max_count {
                    repeat.min_count
                } else {
                    streams.schedule.gen_range(repeat.min_count..=repeat.max_count)
                }
            });
            if total > 1 {
                self.loop_remaining = Some(total - 1);
                self.pending_wakeup = repeat
                    .delay_between_loops
                    .map(|delay| clock.now() + chrono::Duration::milliseconds((delay * 1000.0) as i64));
                return;
            }
            self.loop_remaining = None;
        }

        self.step_index += 1;
        self.pending_wakeup = definition
            .steps
            .get(self.step_index)
            .and_then(|next| next.delay_after_previous_step.as_ref())
            .map(|delay| wakeup_after(clock, *delay, streams));
    }
}

fn wakeup_after(clock: &SimClock, delay: DelayRange, streams: &mut PrngStreams) -> DateTime<Utc> {
    // Inclusive on both ends, like array item counts.
    let seconds = if delay.max_seconds <= delay.min_seconds {
        delay.min_seconds
    } else {
        streams.schedule.gen_range(delay.min_seconds..=delay.max_seconds)
    };
    clock.now() + chrono::Duration::milliseconds((seconds * 1000.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use resinker_core::spec::TimeProgression;

    fn clock() -> SimClock {
        SimClock::from_settings(&TimeProgression {
            start_time: "2024-01-01T00:00:00Z".to_string(),
            time_multiplier: 1.0,
        })
        .unwrap()
    }

    fn definition(yaml: &str) -> ScenarioDef {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_steps_advance_in_order() {
        let def = definition(
            r#"
steps:
  - { event_type: A }
  - { event_type: B }
"#,
        );
        let mut streams = PrngStreams::new(1);
        let clock = clock();
        let mut run = ScenarioRun::new("journey", CapturedBindings::new());

        assert_eq!(run.current_step(&def).unwrap().event_type, "A");
        run.advance(&def, &mut streams, &clock);
        assert_eq!(run.current_step(&def).unwrap().event_type, "B");
        run.advance(&def, &mut streams, &clock);
        assert!(run.is_complete(&def));
    }

    #[test]
    fn test_fixed_loop_repeats_step() {
        let def = definition(
            r#"
steps:
  - event_type: A
    loop: { min_count: 3, max_count: 3 }
  - { event_type: B }
"#,
        );
        let mut streams = PrngStreams::new(1);
        let clock = clock();
        let mut run = ScenarioRun::new("journey", CapturedBindings::new());

        run.advance(&def, &mut streams, &clock);
        assert_eq!(run.current_step(&def).unwrap().event_type, "A");
        run.advance(&def, &mut streams, &clock);
        assert_eq!(run.current_step(&def).unwrap().event_type, "A");
        run.advance(&def, &mut streams, &clock);
        assert_eq!(run.current_step(&def).unwrap().event_type, "B");
    }

    #[test]
    fn test_sampled_loop_count_stays_in_range() {
        let def = definition(
            r#"
steps:
  - event_type: A
    loop: { min_count: 2, max_count: 4 }
"#,
        );
        for seed in 0..20 {
            let mut streams = PrngStreams::new(seed);
            let clock = clock();
            let mut run = ScenarioRun::new("journey", CapturedBindings::new());
            let mut executions = 0;
            while !run.is_complete(&def) {
                executions += 1;
                run.advance(&def, &mut streams, &clock);
                assert!(executions <= 4);
            }
            assert!((2..=4).contains(&executions), "{executions} executions");
        }
    }

    #[test]
    fn test_delay_defers_due_time() {
        let def = definition(
            r#"
steps:
  - { event_type: A }
  - event_type: B
    delay_after_previous_step: { min_seconds: 5, max_seconds: 30 }
"#,
        );
        let mut streams = PrngStreams::new(1);
        let mut clock = clock();
        let mut run = ScenarioRun::new("journey", CapturedBindings::new());

        assert!(run.is_due(clock.now()));
        run.advance(&def, &mut streams, &clock);
        assert!(!run.is_due(clock.now()));

        clock.advance(30.0);
        assert!(run.is_due(clock.now()));
    }

    #[test]
    fn test_record_produced_keeps_first_binding() {
        let mut run = ScenarioRun::new("journey", CapturedBindings::new());
        run.record_produced("User", "u1");
        run.record_produced("User", "u2");
        assert_eq!(run.bindings["User"].key, "u1");
    }
}
