//! Transactional mutation application.
//!
//! All mutations for one event commit are planned against the current
//! store state first; only when every stage validates are they applied.
//! A failing stage therefore discards the whole commit and the event is
//! neither emitted nor counted, so emitted events always reflect the
//! post-state the next tick observes.

use indexmap::IndexMap;
use rand::Rng;
use serde_json::Value;

use resinker_core::spec::{AttributeSource, EntityDef, EventTypeDef, IncrementSource};

use crate::clock::SimClock;
use crate::error::EngineError;
use crate::prng::PrngStreams;
use crate::resolver::Binding;
use crate::store::{lookup_path, EntityInstance, EntityStore};

type JsonMap = serde_json::Map<String, Value>;

/// What a successful commit changed, for scenario binding capture.
#[derive(Debug, Default)]
pub struct CommitOutcome {
    /// `(kind, store key)` of entities created or updated by `produces_*`
    pub produced: Vec<(String, String)>,
}

enum Production {
    Create(EntityInstance),
    Update { kind: String, key: String },
}

struct StagedUpdate {
    kind: String,
    key: String,
    sets: Vec<(String, Value)>,
    increments: Vec<(String, f64)>,
}

/// Builds a new instance from an event payload: primary key from the
/// payload (a generated UUID when the field is absent), state attributes
/// from their defaults or `from_field` sources.
pub fn build_instance(
    kind: &str,
    entity: &EntityDef,
    payload: &JsonMap,
    clock: &SimClock,
    streams: &mut PrngStreams,
) -> EntityInstance {
    let primary_key_value = match lookup_path(payload, &entity.primary_key) {
        Some(value) => value.clone(),
        None => {
            let mut bytes = [0u8; 16];
            streams.generator.fill(&mut bytes);
            Value::String(uuid::Builder::from_random_bytes(bytes).into_uuid().to_string())
        }
    };

    let mut state = JsonMap::new();
    for (name, attribute) in &entity.state_attributes {
        let value = attribute
            .from_field
            .as_deref()
            .and_then(|field| lookup_path(payload, field).cloned())
            .or_else(|| attribute.default.clone())
            .unwrap_or(Value::Null);
        state.insert(name.clone(), value);
    }

    let now = clock.now();
    EntityInstance {
        kind: kind.to_string(),
        primary_key_value,
        payload: payload.clone(),
        state,
        created_at: now,
        last_updated_at: now,
    }
}

/// Applies every mutation declared by an event type for one generated
/// payload. Returns what was produced, or an error with the store
/// untouched.
pub fn apply_commit(
    event_name: &str,
    event: &EventTypeDef,
    payload: &Value,
    binding: &Binding,
    entities: &IndexMap<String, EntityDef>,
    store: &mut EntityStore,
    streams: &mut PrngStreams,
    clock: &SimClock,
) -> Result<CommitOutcome, EngineError> {
    let needs_payload_object = event.produces_entity.is_some()
        || event.produces_or_updates_entity.is_some()
        || !event.updates_entity_state.is_empty();
    let empty = JsonMap::new();
    let payload_map = match payload.as_object() {
        Some(map) => map,
        None if needs_payload_object => {
            return Err(EngineError::NonObjectPayload(event_name.to_string()))
        }
        None => &empty,
    };

    // Plan phase: everything fallible happens against the pre-commit store.
    let production = plan_production(event, payload_map, entities, store, streams, clock)?;
    let staged = plan_state_updates(event, payload_map, binding, store, &production)?;

    // Commit phase: apply in declared order.
    let mut outcome = CommitOutcome::default();
    let now = clock.now();
    match production {
        None => {}
        Some(Production::Create(instance)) => {
            let kind = instance.kind.clone();
            let key = store.insert(instance)?;
            outcome.produced.push((kind, key));
        }
        Some(Production::Update { kind, key }) => {
            store.update(&kind, &key, now, |instance| {
                for (field, value) in payload_map {
                    instance.payload.insert(field.clone(), value.clone());
                }
            })?;
            outcome.produced.push((kind, key));
        }
    }

    for update in staged {
        store.update(&update.kind, &update.key, now, |instance| {
            for (attribute, value) in update.sets {
                instance.state.insert(attribute, value);
            }
            for (attribute, delta) in update.increments {
                let current = instance
                    .state
                    .get(&attribute)
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                instance.state.insert(attribute, Value::from(current + delta));
            }
        })?;
    }

    Ok(outcome)
}

fn plan_production(
    event: &EventTypeDef,
    payload: &JsonMap,
    entities: &IndexMap<String, EntityDef>,
    store: &EntityStore,
    streams: &mut PrngStreams,
    clock: &SimClock,
) -> Result<Option<Production>, EngineError> {
    if let Some(kind) = &event.produces_entity {
        let instance = plan_create(kind, entities, payload, store, clock, streams)?;
        return Ok(Some(Production::Create(instance)));
    }

    let Some(kind) = &event.produces_or_updates_entity else {
        return Ok(None);
    };

    // With zero instances the draw is skipped and a create is forced.
    let existing = store.count(kind);
    let probability = event
        .update_existing_probability
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    if existing > 0 && streams.selection.gen_bool(probability) {
        let keys = store.keys(kind);
        let key = keys[streams.selection.gen_range(0..keys.len())].clone();
        return Ok(Some(Production::Update {
            kind: kind.clone(),
            key,
        }));
    }

    let instance = plan_create(kind, entities, payload, store, clock, streams)?;
    Ok(Some(Production::Create(instance)))
}

fn plan_create(
    kind: &str,
    entities: &IndexMap<String, EntityDef>,
    payload: &JsonMap,
    store: &EntityStore,
    clock: &SimClock,
    streams: &mut PrngStreams,
) -> Result<EntityInstance, EngineError> {
    let entity = entities
        .get(kind)
        .ok_or_else(|| EngineError::UnknownEntityKind(kind.to_string()))?;
    let instance = build_instance(kind, entity, payload, clock, streams);
    let key = instance.key();
    if store.get(kind, &key).is_some() {
        return Err(EngineError::DuplicatePrimaryKey {
            kind: kind.to_string(),
            key,
        });
    }
    Ok(instance)
}

fn plan_state_updates(
    event: &EventTypeDef,
    payload: &JsonMap,
    binding: &Binding,
    store: &EntityStore,
    production: &Option<Production>,
) -> Result<Vec<StagedUpdate>, EngineError> {
    let mut staged = Vec::new();
    for update in &event.updates_entity_state {
        let (kind, key, pending) = resolve_target(&update.entity_alias, binding, production)?;

        let mut sets = Vec::new();
        for (attribute, source) in &update.set_attributes {
            let value = match source {
                AttributeSource::Literal(value) => value.clone(),
                AttributeSource::FromPayload { from_payload_field } => lookup_path(payload, from_payload_field)
                    .cloned()
                    .ok_or_else(|| EngineError::MissingPayloadField(from_payload_field.clone()))?,
            };
            sets.push((attribute.clone(), value));
        }

        let mut increments = Vec::new();
        for (attribute, source) in &update.increment_attributes {
            let delta = match source {
                IncrementSource::Literal(delta) => *delta,
                IncrementSource::FromPayload {
                    from_payload_field,
                    negate,
                } => {
                    let value = lookup_path(payload, from_payload_field).ok_or_else(|| {
                        EngineError::MissingPayloadField(from_payload_field.clone())
                    })?;
                    let magnitude = value
                        .as_f64()
                        .ok_or_else(|| EngineError::NonNumericIncrement(attribute.clone()))?;
                    if *negate {
                        -magnitude
                    } else {
                        magnitude
                    }
                }
            };

            // Current value must be numeric (or unset, which counts as 0).
            let current = if pending {
                match production {
                    Some(Production::Create(instance)) => instance.state.get(attribute).cloned(),
                    _ => None,
                }
            } else {
                store
                    .get(&kind, &key)
                    .ok_or_else(|| EngineError::EntityNotFound {
                        kind: kind.clone(),
                        key: key.clone(),
                    })?
                    .state
                    .get(attribute)
                    .cloned()
            };
            match current {
                None | Some(Value::Null) => {}
                Some(value) if value.as_f64().is_some() => {}
                Some(_) => return Err(EngineError::NonNumericIncrement(attribute.clone())),
            }

            increments.push((attribute.clone(), delta));
        }

        staged.push(StagedUpdate {
            kind,
            key,
            sets,
            increments,
        });
    }
    Ok(staged)
}

/// Resolves a state-update target: a consumed-entity alias first, then the
/// entity produced by this same commit, addressed by its kind name.
fn resolve_target(
    alias: &str,
    binding: &Binding,
    production: &Option<Production>,
) -> Result<(String, String, bool), EngineError> {
    if let Some(entry) = binding.get(alias) {
        return Ok((entry.kind.clone(), entry.selected.clone(), false));
    }
    match production {
        Some(Production::Create(instance)) if instance.kind == alias => {
            Ok((instance.kind.clone(), instance.key(), true))
        }
        Some(Production::Update { kind, key }) if kind == alias => {
            Ok((kind.clone(), key.clone(), false))
        }
        _ => Err(EngineError::Generator(
            crate::error::GeneratorError::MissingBinding(alias.to_string()),
        )),
    }
}
