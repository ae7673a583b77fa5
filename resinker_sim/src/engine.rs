//! The simulation engine.
//!
//! One tick: check budgets, maybe initiate a scenario, build the feasible
//! candidate pool (due scenario steps plus stand-alone event types), pick
//! by weight, generate a payload, commit mutations, advance scenario and
//! clock state. The loop is single threaded, which gives a total order on
//! entity-state transitions: every emitted event saw the state left behind
//! by the previous one.

use std::time::Instant;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde_json::Value;
use tracing::{debug, info, warn};

use resinker_core::spec::{ScenarioDef, SpecDocument};
use resinker_core::{Diagnostic, Event, RealisticProvider, TerminationReason};

use crate::clock::SimClock;
use crate::error::EngineError;
use crate::generate::{render_payload, RenderContext};
use crate::mutation::{apply_commit, build_instance};
use crate::prng::PrngStreams;
use crate::resolver::{build_binding, is_feasible, CapturedBindings, CapturedRef};
use crate::scenario::ScenarioRun;
use crate::store::EntityStore;

/// Engine tuning knobs with reference defaults.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Synthetic seconds between stand-alone events
    pub inter_event_delta: f64,

    /// Consecutive empty-pool ticks before the run is declared starved
    pub starvation_bound: u32,

    /// Weight of the per-tick "initiate nothing" slot; defaults to the sum
    /// of all scenario initiation weights
    pub scenario_idle_weight: Option<f64>,

    /// Upper bound on concurrently active scenario runs
    pub max_active_scenarios: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            inter_event_delta: 1.0,
            starvation_bound: 300,
            scenario_idle_weight: None,
            max_active_scenarios: 8,
        }
    }
}

/// What a single tick produced.
#[derive(Debug)]
pub enum TickOutcome {
    /// An event was generated, committed, and should be dispatched
    Emitted(Event),
    /// Nothing was feasible this tick; the clock advanced
    Idle,
    /// The run is over
    Finished(TerminationReason),
}

enum Candidate {
    Step { run_index: usize, event_type: String },
    Standalone { event_type: String },
}

/// The simulation engine. Owns the entity store, the clock, the PRNG
/// streams, and all in-flight scenario runs.
pub struct SimEngine {
    spec: SpecDocument,
    options: EngineOptions,
    clock: SimClock,
    streams: PrngStreams,
    store: EntityStore,
    provider: Box<dyn RealisticProvider>,
    scenario_runs: Vec<ScenarioRun>,
    emitted_count: u64,
    starvation_ticks: u32,
    duration_budget: Option<f64>,
    started_wall: Instant,
    diagnostics: Vec<Diagnostic>,
}

impl SimEngine {
    pub fn new(
        spec: SpecDocument,
        provider: Box<dyn RealisticProvider>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let seed = spec
            .simulation_settings
            .random_seed
            .unwrap_or_else(rand::random);
        let duration_budget = spec.simulation_settings.duration_seconds()?;
        let clock = SimClock::from_settings(&spec.simulation_settings.time_progression)?;
        info!(seed, "engine initialized");

        Ok(Self {
            spec,
            options,
            clock,
            streams: PrngStreams::new(seed),
            store: EntityStore::new(),
            provider,
            scenario_runs: Vec::new(),
            emitted_count: 0,
            starvation_ticks: 0,
            duration_budget,
            started_wall: Instant::now(),
            diagnostics: Vec::new(),
        })
    }

    /// Creates the initial entity population declared by
    /// `initial_entity_counts`.
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        let counts: Vec<(String, usize)> = self
            .spec
            .simulation_settings
            .initial_entity_counts
            .iter()
            .map(|(kind, count)| (kind.clone(), *count))
            .collect();

        for (kind, count) in counts {
            info!(kind = %kind, count, "creating initial entities");
            let entity = self
                .spec
                .entities
                .get(&kind)
                .ok_or_else(|| EngineError::UnknownEntityKind(kind.clone()))?
                .clone();
            let schema = self
                .spec
                .schema(&entity.schema_ref)
                .ok_or_else(|| {
                    crate::error::GeneratorError::UnresolvedRef(entity.schema_ref.clone())
                })?
                .clone();

            for _ in 0..count {
                let binding = crate::resolver::Binding::default();
                let ctx = RenderContext {
                    schemas: &self.spec.schemas,
                    clock: &self.clock,
                    store: &self.store,
                    binding: &binding,
                    provider: self.provider.as_ref(),
                };
                let payload = render_payload(&schema, &ctx, &mut self.streams)?;
                let payload_map = match payload {
                    Value::Object(map) => map,
                    _ => return Err(EngineError::NonObjectPayload(kind.clone())),
                };
                let instance =
                    build_instance(&kind, &entity, &payload_map, &self.clock, &mut self.streams);
                self.store.insert(instance)?;
            }
        }
        Ok(())
    }

    /// Runs one scheduler tick.
    pub fn tick(&mut self) -> Result<TickOutcome, EngineError> {
        if let Some(reason) = self.check_budgets() {
            return Ok(TickOutcome::Finished(reason));
        }

        let scenarios = &self.spec.scenarios;
        self.scenario_runs.retain(|run| {
            scenarios
                .get(&run.scenario_name)
                .is_some_and(|def| !run.is_complete(def))
        });

        self.maybe_initiate_scenario();

        let candidates = self.candidate_pool();
        if candidates.is_empty() {
            self.starvation_ticks += 1;
            if self.starvation_ticks >= self.options.starvation_bound {
                warn!(
                    ticks = self.starvation_ticks,
                    "no feasible event for too long, terminating as starved"
                );
                self.diagnostics.push(Diagnostic::warning(format!(
                    "run starved after {} consecutive infeasible ticks",
                    self.starvation_ticks
                )));
                return Ok(TickOutcome::Finished(TerminationReason::Starved));
            }
            self.clock.advance(self.options.inter_event_delta);
            return Ok(TickOutcome::Idle);
        }

        let picked = self.pick_weighted(&candidates);
        match self.generate_and_commit(&candidates[picked].0) {
            Some(event) => {
                self.starvation_ticks = 0;
                self.emitted_count += 1;
                self.clock.advance(self.options.inter_event_delta);
                Ok(TickOutcome::Emitted(event))
            }
            None => {
                // A generator fault or failed commit discards the event;
                // count the tick toward starvation so a persistently
                // faulting spec cannot spin forever.
                self.starvation_ticks += 1;
                self.clock.advance(self.options.inter_event_delta);
                Ok(TickOutcome::Idle)
            }
        }
    }

    pub fn events_emitted(&self) -> u64 {
        self.emitted_count
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn check_budgets(&self) -> Option<TerminationReason> {
        if let Some(total) = self.spec.simulation_settings.total_events {
            if self.emitted_count >= total {
                info!(total, "total-events budget reached");
                return Some(TerminationReason::TotalEventsReached);
            }
        }
        if let Some(duration) = self.duration_budget {
            if self.started_wall.elapsed().as_secs_f64() >= duration {
                info!(duration, "duration budget reached");
                return Some(TerminationReason::DurationReached);
            }
        }
        None
    }

    /// With probability proportional to scenario initiation weights
    /// (against a "do nothing" slot), starts one scenario whose entity
    /// requirements are currently satisfiable.
    fn maybe_initiate_scenario(&mut self) {
        if self.spec.scenarios.is_empty()
            || self.scenario_runs.len() >= self.options.max_active_scenarios
        {
            return;
        }

        let weights: Vec<f64> = self
            .spec
            .scenarios
            .values()
            .map(|scenario| scenario.initiation_weight.max(0.0))
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return;
        }
        let idle = self.options.scenario_idle_weight.unwrap_or(total);

        let mut slots = weights;
        slots.push(idle);
        let Ok(distribution) = WeightedIndex::new(&slots) else {
            return;
        };
        let picked = distribution.sample(&mut self.streams.scenario_init);
        if picked >= self.spec.scenarios.len() {
            return;
        }

        let (name, definition) = match self.spec.scenarios.get_index(picked) {
            Some((name, definition)) => (name.clone(), definition.clone()),
            None => return,
        };
        if let Some(bindings) = self.resolve_scenario_requirements(&definition) {
            debug!(scenario = %name, "initiating scenario run");
            let mut run = ScenarioRun::new(name, bindings);
            run.schedule_first_step(&definition, &mut self.streams, &self.clock);
            self.scenario_runs.push(run);
        }
    }

    fn resolve_scenario_requirements(
        &mut self,
        definition: &ScenarioDef,
    ) -> Option<CapturedBindings> {
        let mut bindings = CapturedBindings::new();
        for requirement in &definition.requires_initial_entities {
            let candidates = self
                .store
                .select(&requirement.name, &requirement.selection_filter);
            if candidates.is_empty() {
                return None;
            }
            let (key, _) = candidates[self.streams.selection.gen_range(0..candidates.len())];
            bindings.insert(
                requirement.alias.clone(),
                CapturedRef {
                    kind: requirement.name.clone(),
                    key: key.to_string(),
                },
            );
        }
        Some(bindings)
    }

    /// Union of due scenario steps and stand-alone event types, filtered
    /// for feasibility, with weights.
    fn candidate_pool(&self) -> Vec<(Candidate, f64)> {
        let mut pool = Vec::new();
        let now = self.clock.now();

        for (run_index, run) in self.scenario_runs.iter().enumerate() {
            let Some(definition) = self.spec.scenarios.get(&run.scenario_name) else {
                continue;
            };
            if !run.is_due(now) {
                continue;
            }
            let Some(step) = run.current_step(definition) else {
                continue;
            };
            let Some(event) = self.spec.event_types.get(&step.event_type) else {
                continue;
            };
            if !is_feasible(event, &self.store, Some(&run.bindings)) {
                continue;
            }
            // Zero-weight event types still progress inside scenarios.
            let weight = event.frequency_weight.max(1.0);
            pool.push((
                Candidate::Step {
                    run_index,
                    event_type: step.event_type.clone(),
                },
                weight,
            ));
        }

        for (name, event) in &self.spec.event_types {
            if event.frequency_weight <= 0.0 {
                continue;
            }
            if !is_feasible(event, &self.store, None) {
                continue;
            }
            pool.push((
                Candidate::Standalone {
                    event_type: name.clone(),
                },
                event.frequency_weight,
            ));
        }

        pool
    }

    fn pick_weighted(&mut self, candidates: &[(Candidate, f64)]) -> usize {
        let weights: Vec<f64> = candidates.iter().map(|(_, weight)| *weight).collect();
        match WeightedIndex::new(&weights) {
            Ok(distribution) => distribution.sample(&mut self.streams.schedule),
            // All-equal degenerate weights cannot happen here (the pool
            // only holds positive weights), but ties break to spec order.
            Err(_) => 0,
        }
    }

    /// Generates the picked candidate's payload and commits its mutations.
    /// Returns `None` when the event had to be discarded (generator fault
    /// or failed commit), leaving entity state untouched.
    fn generate_and_commit(&mut self, candidate: &Candidate) -> Option<Event> {
        let (event_type, run_index) = match candidate {
            Candidate::Step {
                run_index,
                event_type,
            } => (event_type.clone(), Some(*run_index)),
            Candidate::Standalone { event_type } => (event_type.clone(), None),
        };

        let Some(event_def) = self.spec.event_types.get(&event_type).cloned() else {
            return None;
        };
        let captured = run_index.map(|index| self.scenario_runs[index].bindings.clone());

        let Some(binding) =
            build_binding(&event_def, &self.store, &mut self.streams, captured.as_ref())
        else {
            return None;
        };

        let Some(schema) = self.spec.schema(&event_def.payload_schema).cloned() else {
            return None;
        };
        let ctx = RenderContext {
            schemas: &self.spec.schemas,
            clock: &self.clock,
            store: &self.store,
            binding: &binding,
            provider: self.provider.as_ref(),
        };
        let mut payload = match render_payload(&schema, &ctx, &mut self.streams) {
            Ok(payload) => payload,
            Err(fault) => {
                warn!(event_type = %event_type, error = %fault, "generator fault, discarding event");
                self.diagnostics.push(Diagnostic::error(format!(
                    "generator fault in {event_type}: {fault}"
                )));
                return None;
            }
        };

        // Scenario payload overrides win over generated fields.
        if let Some(index) = run_index {
            let run = &self.scenario_runs[index];
            if let Some(step) = self
                .spec
                .scenarios
                .get(&run.scenario_name)
                .and_then(|def| run.current_step(def))
            {
                if let Value::Object(map) = &mut payload {
                    for (field, value) in &step.payload_overrides {
                        map.insert(field.clone(), value.clone());
                    }
                }
            }
        }

        let outcome = match apply_commit(
            &event_type,
            &event_def,
            &payload,
            &binding,
            &self.spec.entities,
            &mut self.store,
            &mut self.streams,
            &self.clock,
        ) {
            Ok(outcome) => outcome,
            Err(failure) => {
                warn!(event_type = %event_type, error = %failure, "commit failed, discarding event");
                self.diagnostics.push(Diagnostic::error(format!(
                    "commit failed for {event_type}: {failure}"
                )));
                return None;
            }
        };

        if let Some(index) = run_index {
            let definition = self
                .spec
                .scenarios
                .get(&self.scenario_runs[index].scenario_name)
                .cloned();
            let run = &mut self.scenario_runs[index];
            for entry in binding.entries() {
                run.record_resolved(&entry.alias, &entry.kind, &entry.selected);
            }
            for (kind, key) in &outcome.produced {
                run.record_produced(kind, key);
            }
            if let Some(definition) = definition {
                run.advance(&definition, &mut self.streams, &self.clock);
            }
        }

        Some(Event {
            event_type,
            timestamp: self.clock.now(),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resinker_core::{validate_spec, CommerceProvider};
    use serde_json::json;

    fn engine(yaml: &str, options: EngineOptions) -> SimEngine {
        let spec: SpecDocument = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(validate_spec(&spec), vec![], "fixture spec must validate");
        let mut engine =
            SimEngine::new(spec, Box::new(CommerceProvider::new()), options).unwrap();
        engine.initialize().unwrap();
        engine
    }

    fn run_to_completion(engine: &mut SimEngine) -> (Vec<Event>, TerminationReason) {
        let mut events = Vec::new();
        loop {
            match engine.tick().unwrap() {
                TickOutcome::Emitted(event) => events.push(event),
                TickOutcome::Idle => {}
                TickOutcome::Finished(reason) => return (events, reason),
            }
        }
    }

    const ONBOARDING_SPEC: &str = r#"
simulation_settings:
  total_events: 2
  random_seed: 42
  time_progression: { start_time: "2024-01-01T00:00:00Z", time_multiplier: 1.0 }
schemas:
  UserPayload:
    type: object
    properties:
      user_id: { type: string, generator: uuid_v4 }
      email: { type: string, generator: faker.person.email }
  LoginPayload:
    type: object
    properties:
      user_id: { type: string, from_entity: User, field: user_id }
entities:
  User:
    schema: UserPayload
    primary_key: user_id
    state_attributes:
      is_logged_in: { type: boolean, default: false }
event_types:
  UserRegistered:
    payload_schema: UserPayload
    produces_entity: User
    frequency_weight: 10
    max_active_instances_of_state:
      { entity: User, attribute: is_logged_in, value: false, max_count: 1 }
  UserLoggedIn:
    payload_schema: LoginPayload
    frequency_weight: 30
    consumes_entities:
      - name: User
        alias: user
        selection_filter:
          - { field: state.is_logged_in, operator: equals, value: false }
    updates_entity_state:
      - entity_alias: user
        set_attributes: { is_logged_in: true }
"#;

    #[test]
    fn test_onboarding_sequence_and_state() {
        let mut engine = engine(ONBOARDING_SPEC, EngineOptions::default());
        let (events, reason) = run_to_completion(&mut engine);

        assert_eq!(reason, TerminationReason::TotalEventsReached);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "UserRegistered");
        assert_eq!(events[1].event_type, "UserLoggedIn");

        // The login references the user the registration created.
        let registered_id = &events[0].payload["user_id"];
        assert_eq!(&events[1].payload["user_id"], registered_id);

        // After the commit the user is logged in.
        let key = registered_id.as_str().unwrap();
        let user = engine.store().get("User", key).unwrap();
        assert_eq!(user.state["is_logged_in"], json!(true));
    }

    #[test]
    fn test_determinism_across_runs() {
        let render = |engine: &mut SimEngine| -> Vec<String> {
            let (events, _) = run_to_completion(engine);
            events
                .iter()
                .map(|e| e.render(resinker_core::spec::OutputFormat::Json))
                .collect()
        };

        let mut first = engine(ONBOARDING_SPEC, EngineOptions::default());
        let mut second = engine(ONBOARDING_SPEC, EngineOptions::default());
        assert_eq!(render(&mut first), render(&mut second));
    }

    #[test]
    fn test_filter_denial_starves_run() {
        let spec = r#"
simulation_settings:
  total_events: 5
  random_seed: 42
  time_progression: { start_time: "2024-01-01T00:00:00Z", time_multiplier: 1.0 }
schemas:
  LoginPayload:
    type: object
    properties:
      user_id: { type: string, from_entity: User, field: user_id }
  UserPayload:
    type: object
    properties:
      user_id: { type: string, generator: uuid_v4 }
entities:
  User:
    schema: UserPayload
    primary_key: user_id
    state_attributes:
      is_logged_in: { type: boolean, default: false }
event_types:
  UserLoggedIn:
    payload_schema: LoginPayload
    frequency_weight: 30
    consumes_entities:
      - name: User
        alias: user
        selection_filter:
          - { field: state.is_logged_in, operator: equals, value: false }
"#;
        let mut engine = engine(
            spec,
            EngineOptions {
                starvation_bound: 25,
                ..EngineOptions::default()
            },
        );
        let (events, reason) = run_to_completion(&mut engine);
        assert!(events.is_empty());
        assert_eq!(reason, TerminationReason::Starved);
        assert!(!engine.take_diagnostics().is_empty());
    }

    const SCENARIO_SPEC: &str = r#"
simulation_settings:
  total_events: 3
  random_seed: 7
  initial_entity_counts: { Product: 1 }
  time_progression: { start_time: "2024-01-01T00:00:00Z", time_multiplier: 1.0 }
schemas:
  ProductPayload:
    type: object
    properties:
      product_id: { type: string, generator: uuid_v4 }
      price: { type: number, generator: static, params: { value: 12.5 } }
  UserPayload:
    type: object
    properties:
      user_id: { type: string, generator: uuid_v4 }
  LoginPayload:
    type: object
    properties:
      user_id: { type: string, from_entity: User, field: user_id }
  PurchasePayload:
    type: object
    properties:
      user_id: { type: string, from_entity: User, field: user_id }
      items:
        type: array
        min_items: 1
        max_items: 1
        items:
          type: object
          properties:
            product_id: { type: string, from_entity: Product, field: product_id }
            quantity: { type: integer, generator: static, params: { value: 2 } }
            unit_price: { type: number, from_entity: Product, field: price }
      total_amount:
        type: number
        generator: derived
        params:
          expression: "sum(item['quantity'] * item['unit_price'] for item in items)"
          precision: 2
entities:
  User:
    schema: UserPayload
    primary_key: user_id
    state_attributes:
      is_logged_in: { type: boolean, default: false }
      total_purchase_value: { type: number, default: 0 }
  Product:
    schema: ProductPayload
    primary_key: product_id
event_types:
  UserRegistered:
    payload_schema: UserPayload
    produces_entity: User
    frequency_weight: 0
  UserLoggedIn:
    payload_schema: LoginPayload
    frequency_weight: 0
    consumes_entities:
      - name: User
        alias: user
        selection_filter:
          - { field: state.is_logged_in, operator: equals, value: false }
    updates_entity_state:
      - entity_alias: user
        set_attributes: { is_logged_in: true }
  UserPurchasedProducts:
    payload_schema: PurchasePayload
    frequency_weight: 0
    consumes_entities:
      - name: User
        alias: user
        selection_filter:
          - { field: state.is_logged_in, operator: equals, value: true }
      - name: Product
        alias: product
    updates_entity_state:
      - entity_alias: user
        increment_attributes:
          total_purchase_value: { from_payload_field: total_amount }
scenarios:
  NewUserOnboardingAndFirstPurchase:
    description: "Register, log in, make a first purchase"
    initiation_weight: 5
    steps:
      - { event_type: UserRegistered }
      - { event_type: UserLoggedIn }
      - { event_type: UserPurchasedProducts }
"#;

    fn single_scenario_options() -> EngineOptions {
        // One active run keeps the emitted sequence exactly the scenario's
        // step order.
        EngineOptions {
            max_active_scenarios: 1,
            ..EngineOptions::default()
        }
    }

    #[test]
    fn test_scenario_threads_binding_across_steps() {
        let mut engine = engine(SCENARIO_SPEC, single_scenario_options());
        let (events, reason) = run_to_completion(&mut engine);

        assert_eq!(reason, TerminationReason::TotalEventsReached);
        let names: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            names,
            vec!["UserRegistered", "UserLoggedIn", "UserPurchasedProducts"]
        );

        // The same user flows through all three steps.
        let user_id = events[0].payload["user_id"].as_str().unwrap().to_string();
        assert_eq!(events[1].payload["user_id"].as_str().unwrap(), user_id);
        assert_eq!(events[2].payload["user_id"].as_str().unwrap(), user_id);

        // quantity 2 × price 12.5 on a single line item
        assert_eq!(events[2].payload["total_amount"], json!(25.0));
        let user = engine.store().get("User", &user_id).unwrap();
        assert_eq!(user.state["total_purchase_value"], json!(25.0));
    }

    #[test]
    fn test_scenario_payload_overrides_win() {
        let spec = SCENARIO_SPEC.replace(
            "- { event_type: UserRegistered }",
            r#"- event_type: UserRegistered
        payload_overrides: { referral_code: "WELCOME" }"#,
        );
        let mut engine = engine(&spec, single_scenario_options());
        let (events, _) = run_to_completion(&mut engine);
        assert_eq!(events[0].payload["referral_code"], json!("WELCOME"));
    }

    #[test]
    fn test_max_active_cap_is_never_exceeded() {
        let spec = r#"
simulation_settings:
  total_events: 50
  random_seed: 11
  initial_entity_counts: { User: 10 }
  time_progression: { start_time: "2024-01-01T00:00:00Z", time_multiplier: 1.0 }
schemas:
  UserPayload:
    type: object
    properties:
      user_id: { type: string, generator: uuid_v4 }
  LoginPayload:
    type: object
    properties:
      user_id: { type: string, from_entity: User, field: user_id }
entities:
  User:
    schema: UserPayload
    primary_key: user_id
    state_attributes:
      is_logged_in: { type: boolean, default: false }
event_types:
  UserLoggedIn:
    payload_schema: LoginPayload
    frequency_weight: 1
    consumes_entities:
      - name: User
        alias: user
        selection_filter:
          - { field: state.is_logged_in, operator: equals, value: false }
    updates_entity_state:
      - entity_alias: user
        set_attributes: { is_logged_in: true }
    max_active_instances_of_state:
      { entity: User, attribute: is_logged_in, value: true, max_count: 3 }
"#;
        let mut engine = engine(
            spec,
            EngineOptions {
                starvation_bound: 20,
                ..EngineOptions::default()
            },
        );
        let mut emitted = 0;
        loop {
            match engine.tick().unwrap() {
                TickOutcome::Emitted(_) => {
                    emitted += 1;
                    let logged_in =
                        engine
                            .store()
                            .count_where("User", "is_logged_in", &json!(true));
                    assert!(logged_in <= 3);
                }
                TickOutcome::Idle => {}
                TickOutcome::Finished(reason) => {
                    assert_eq!(reason, TerminationReason::Starved);
                    break;
                }
            }
        }
        assert_eq!(emitted, 3);
        assert_eq!(engine.store().count_where("User", "is_logged_in", &json!(true)), 3);
    }

    #[test]
    fn test_clock_advances_between_events() {
        let mut engine = engine(ONBOARDING_SPEC, EngineOptions::default());
        let start = engine.clock().now();
        let (events, _) = run_to_completion(&mut engine);
        assert_eq!(events.len(), 2);
        assert!(events[1].timestamp > events[0].timestamp);
        assert!(events[0].timestamp >= start);
    }
}
