//! Pre-run specification validation.
//!
//! The engine assumes a well-formed spec; this pass produces every typed
//! error it can find so the CLI can report them all at once before a run
//! starts.

use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

use crate::expression::Expression;
use crate::spec::{
    schema_name, EntityDef, FilterClause, SchemaNode, SchemaType, SpecDocument,
};

/// A single validation failure, with enough context to locate it.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{context}: schema {name:?} is not defined")]
    UnknownSchema { context: String, name: String },

    #[error("{context}: entity kind {name:?} is not defined")]
    UnknownEntity { context: String, name: String },

    #[error("scenario {scenario:?} step {step}: event type {name:?} is not defined")]
    UnknownEventType {
        scenario: String,
        step: usize,
        name: String,
    },

    #[error("{context}: unknown generator {name:?}")]
    UnknownGenerator { context: String, name: String },

    #[error("{context}: filter references undefined state attribute {attribute:?} on {entity:?}")]
    UnknownStateAttribute {
        context: String,
        entity: String,
        attribute: String,
    },

    #[error("schema {0:?} participates in a $ref cycle")]
    CircularReference(String),

    #[error("{context}: {detail}")]
    InvalidNode { context: String, detail: String },

    #[error("event type {0:?} declares both produces_entity and produces_or_updates_entity")]
    ConflictingProduction(String),

    #[error("{context}: probability {value} is outside [0, 1]")]
    ProbabilityOutOfRange { context: String, value: f64 },

    #[error("{context}: weight {value} is negative or not finite")]
    InvalidWeight { context: String, value: f64 },

    #[error("{context}: derived expression rejected: {detail}")]
    InvalidExpression { context: String, detail: String },
}

const KNOWN_GENERATORS: &[&str] = &[
    "uuid_v4",
    "random_int",
    "random_float",
    "random_alphanumeric",
    "choice",
    "conditional_choice",
    "current_timestamp",
    "static",
    "static_hashed",
    "derived",
];

/// Whether a generator name belongs to the closed set (or the `faker.`
/// namespace, which is resolved by the provider at run time).
pub fn is_known_generator(name: &str) -> bool {
    KNOWN_GENERATORS.contains(&name) || name.starts_with("faker.")
}

/// Validates the whole document, returning every error found.
pub fn validate_spec(spec: &SpecDocument) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    check_schema_cycles(spec, &mut errors);
    for (name, node) in &spec.schemas {
        check_node(spec, node, &format!("schema {name:?}"), &mut errors);
    }
    check_entities(spec, &mut errors);
    check_event_types(spec, &mut errors);
    check_scenarios(spec, &mut errors);
    check_settings(spec, &mut errors);

    errors
}

fn check_settings(spec: &SpecDocument, errors: &mut Vec<ValidationError>) {
    for kind in spec.simulation_settings.initial_entity_counts.keys() {
        if !spec.entities.contains_key(kind) {
            errors.push(ValidationError::UnknownEntity {
                context: "initial_entity_counts".to_string(),
                name: kind.clone(),
            });
        }
    }
    let multiplier = spec.simulation_settings.time_progression.time_multiplier;
    if !multiplier.is_finite() || multiplier < 0.0 {
        errors.push(ValidationError::InvalidWeight {
            context: "time_progression.time_multiplier".to_string(),
            value: multiplier,
        });
    }
    let start_time = &spec.simulation_settings.time_progression.start_time;
    if !start_time.eq_ignore_ascii_case("now")
        && chrono::DateTime::parse_from_rfc3339(start_time).is_err()
    {
        errors.push(ValidationError::InvalidNode {
            context: "time_progression.start_time".to_string(),
            detail: format!("{start_time:?} is neither \"now\" nor RFC 3339"),
        });
    }
    if let Some(duration) = &spec.simulation_settings.duration {
        if humantime::parse_duration(duration).is_err() {
            errors.push(ValidationError::InvalidNode {
                context: "simulation_settings.duration".to_string(),
                detail: format!("{duration:?} is not a valid duration"),
            });
        }
    }
}

fn check_entities(spec: &SpecDocument, errors: &mut Vec<ValidationError>) {
    for (kind, entity) in &spec.entities {
        if spec.schema(&entity.schema_ref).is_none() {
            errors.push(ValidationError::UnknownSchema {
                context: format!("entity {kind:?}"),
                name: entity.schema_ref.clone(),
            });
        }
    }
}

fn check_event_types(spec: &SpecDocument, errors: &mut Vec<ValidationError>) {
    for (name, event) in &spec.event_types {
        let context = format!("event type {name:?}");

        if spec.schema(&event.payload_schema).is_none() {
            errors.push(ValidationError::UnknownSchema {
                context: context.clone(),
                name: event.payload_schema.clone(),
            });
        }
        if event.produces_entity.is_some() && event.produces_or_updates_entity.is_some() {
            errors.push(ValidationError::ConflictingProduction(name.clone()));
        }
        for produced in event
            .produces_entity
            .iter()
            .chain(event.produces_or_updates_entity.iter())
        {
            if !spec.entities.contains_key(produced) {
                errors.push(ValidationError::UnknownEntity {
                    context: context.clone(),
                    name: produced.clone(),
                });
            }
        }
        if let Some(probability) = event.update_existing_probability {
            check_probability(probability, &context, errors);
        }
        if !event.frequency_weight.is_finite() || event.frequency_weight < 0.0 {
            errors.push(ValidationError::InvalidWeight {
                context: context.clone(),
                value: event.frequency_weight,
            });
        }

        let mut aliases: HashSet<&str> = HashSet::new();
        for consumption in &event.consumes_entities {
            aliases.insert(consumption.alias.as_str());
            match spec.entities.get(&consumption.name) {
                None => errors.push(ValidationError::UnknownEntity {
                    context: context.clone(),
                    name: consumption.name.clone(),
                }),
                Some(entity) => check_filters(
                    &consumption.selection_filter,
                    entity,
                    &consumption.name,
                    &context,
                    errors,
                ),
            }
            if consumption.min_required == 0 {
                errors.push(ValidationError::InvalidNode {
                    context: context.clone(),
                    detail: format!("consumption {:?} has min_required 0", consumption.alias),
                });
            }
        }

        // Produced kinds are addressable by kind name in state updates.
        for produced in event
            .produces_entity
            .iter()
            .chain(event.produces_or_updates_entity.iter())
        {
            aliases.insert(produced.as_str());
        }
        for update in &event.updates_entity_state {
            if !aliases.contains(update.entity_alias.as_str()) {
                errors.push(ValidationError::InvalidNode {
                    context: context.clone(),
                    detail: format!(
                        "updates_entity_state references unbound alias {:?}",
                        update.entity_alias
                    ),
                });
            }
        }

        if let Some(cap) = &event.max_active_instances_of_state {
            match spec.entities.get(&cap.entity) {
                None => errors.push(ValidationError::UnknownEntity {
                    context: context.clone(),
                    name: cap.entity.clone(),
                }),
                Some(entity) => {
                    if !entity.state_attributes.contains_key(&cap.attribute) {
                        errors.push(ValidationError::UnknownStateAttribute {
                            context: context.clone(),
                            entity: cap.entity.clone(),
                            attribute: cap.attribute.clone(),
                        });
                    }
                }
            }
        }
    }
}

fn check_scenarios(spec: &SpecDocument, errors: &mut Vec<ValidationError>) {
    for (name, scenario) in &spec.scenarios {
        let context = format!("scenario {name:?}");
        if !scenario.initiation_weight.is_finite() || scenario.initiation_weight < 0.0 {
            errors.push(ValidationError::InvalidWeight {
                context: context.clone(),
                value: scenario.initiation_weight,
            });
        }
        for requirement in &scenario.requires_initial_entities {
            match spec.entities.get(&requirement.name) {
                None => errors.push(ValidationError::UnknownEntity {
                    context: context.clone(),
                    name: requirement.name.clone(),
                }),
                Some(entity) => check_filters(
                    &requirement.selection_filter,
                    entity,
                    &requirement.name,
                    &context,
                    errors,
                ),
            }
        }
        for (index, step) in scenario.steps.iter().enumerate() {
            if !spec.event_types.contains_key(&step.event_type) {
                errors.push(ValidationError::UnknownEventType {
                    scenario: name.clone(),
                    step: index,
                    name: step.event_type.clone(),
                });
            }
            if let Some(delay) = &step.delay_after_previous_step {
                if delay.min_seconds > delay.max_seconds || delay.min_seconds < 0.0 {
                    errors.push(ValidationError::InvalidNode {
                        context: format!("{context} step {index}"),
                        detail: format!(
                            "delay range [{}, {}] is invalid",
                            delay.min_seconds, delay.max_seconds
                        ),
                    });
                }
            }
            if let Some(repeat) = &step.repeat {
                if repeat.min_count > repeat.max_count || repeat.min_count == 0 {
                    errors.push(ValidationError::InvalidNode {
                        context: format!("{context} step {index}"),
                        detail: format!(
                            "loop range [{}, {}] is invalid",
                            repeat.min_count, repeat.max_count
                        ),
                    });
                }
            }
        }
    }
}

fn check_filters(
    filters: &[FilterClause],
    entity: &EntityDef,
    entity_name: &str,
    context: &str,
    errors: &mut Vec<ValidationError>,
) {
    for clause in filters {
        if let Some(attribute) = clause.field.strip_prefix("state.") {
            if !entity.state_attributes.contains_key(attribute) {
                errors.push(ValidationError::UnknownStateAttribute {
                    context: context.to_string(),
                    entity: entity_name.to_string(),
                    attribute: attribute.to_string(),
                });
            }
        }
    }
}

fn check_schema_cycles(spec: &SpecDocument, errors: &mut Vec<ValidationError>) {
    let mut resolved: HashSet<String> = HashSet::new();
    for name in spec.schemas.keys() {
        let mut visiting = Vec::new();
        visit_refs(spec, name, &mut visiting, &mut resolved, errors);
    }
}

fn visit_refs(
    spec: &SpecDocument,
    name: &str,
    visiting: &mut Vec<String>,
    resolved: &mut HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    if resolved.contains(name) {
        return;
    }
    if visiting.iter().any(|n| n == name) {
        errors.push(ValidationError::CircularReference(name.to_string()));
        return;
    }
    visiting.push(name.to_string());
    if let Some(node) = spec.schemas.get(name) {
        for reference in node_references(node) {
            visit_refs(spec, schema_name(&reference), visiting, resolved, errors);
        }
    }
    visiting.pop();
    resolved.insert(name.to_string());
}

fn node_references(node: &SchemaNode) -> Vec<String> {
    let mut references = Vec::new();
    if let Some(reference) = &node.reference {
        references.push(reference.clone());
    }
    if let Some(properties) = &node.properties {
        for child in properties.values() {
            references.extend(node_references(child));
        }
    }
    if let Some(items) = &node.items {
        references.extend(node_references(items));
    }
    references
}

fn check_node(
    spec: &SpecDocument,
    node: &SchemaNode,
    context: &str,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(reference) = &node.reference {
        if spec.schema(reference).is_none() {
            errors.push(ValidationError::UnknownSchema {
                context: context.to_string(),
                name: reference.clone(),
            });
        }
    }

    if let Some(probability) = node.nullable_probability {
        check_probability(probability, context, errors);
    }

    if let Some(from_entity) = &node.from_entity {
        if !spec.entities.contains_key(from_entity) {
            errors.push(ValidationError::UnknownEntity {
                context: context.to_string(),
                name: from_entity.clone(),
            });
        }
        if node.field.is_none() {
            errors.push(ValidationError::InvalidNode {
                context: context.to_string(),
                detail: "from_entity requires field".to_string(),
            });
        }
    }

    if let Some(generator) = &node.generator {
        if !is_known_generator(generator) {
            errors.push(ValidationError::UnknownGenerator {
                context: context.to_string(),
                name: generator.clone(),
            });
        }
        check_generator_params(node, generator, context, errors);
    }

    match node.node_type {
        Some(SchemaType::Object) => match &node.properties {
            None => errors.push(ValidationError::InvalidNode {
                context: context.to_string(),
                detail: "object node without properties".to_string(),
            }),
            Some(properties) => {
                for (field, child) in properties {
                    check_node(spec, child, &format!("{context}.{field}"), errors);
                }
            }
        },
        Some(SchemaType::Array) => match &node.items {
            None => errors.push(ValidationError::InvalidNode {
                context: context.to_string(),
                detail: "array node without items".to_string(),
            }),
            Some(items) => {
                if let (Some(min), Some(max)) = (node.min_items, node.max_items) {
                    if min > max {
                        errors.push(ValidationError::InvalidNode {
                            context: context.to_string(),
                            detail: format!("min_items {min} exceeds max_items {max}"),
                        });
                    }
                }
                check_node(spec, items, &format!("{context}[]"), errors);
            }
        },
        Some(_) => {}
        None => {
            // A node must be discriminated by something.
            if node.reference.is_none()
                && node.from_entity.is_none()
                && node.generator.is_none()
            {
                errors.push(ValidationError::InvalidNode {
                    context: context.to_string(),
                    detail: "node has no type, generator, $ref, or from_entity".to_string(),
                });
            }
        }
    }
}

fn check_generator_params(
    node: &SchemaNode,
    generator: &str,
    context: &str,
    errors: &mut Vec<ValidationError>,
) {
    match generator {
        "choice" => {
            let choices = node.params.get("choices").and_then(Value::as_array);
            match choices {
                None => errors.push(ValidationError::InvalidNode {
                    context: context.to_string(),
                    detail: "choice generator requires choices".to_string(),
                }),
                Some(choices) if choices.is_empty() => {
                    errors.push(ValidationError::InvalidNode {
                        context: context.to_string(),
                        detail: "choice generator has no choices".to_string(),
                    })
                }
                Some(choices) => {
                    if let Some(weights) = node.params.get("weights").and_then(Value::as_array) {
                        if weights.len() != choices.len() {
                            errors.push(ValidationError::InvalidNode {
                                context: context.to_string(),
                                detail: format!(
                                    "{} weights for {} choices",
                                    weights.len(),
                                    choices.len()
                                ),
                            });
                        }
                        let total: f64 =
                            weights.iter().filter_map(Value::as_f64).sum();
                        if total <= 0.0 {
                            errors.push(ValidationError::InvalidNode {
                                context: context.to_string(),
                                detail: "choice weights must sum to a positive value".to_string(),
                            });
                        }
                    }
                }
            }
        }
        "derived" => {
            match node.params.get("expression").and_then(Value::as_str) {
                None => errors.push(ValidationError::InvalidNode {
                    context: context.to_string(),
                    detail: "derived generator requires expression".to_string(),
                }),
                Some(expression) => {
                    if let Err(e) = Expression::parse(expression) {
                        errors.push(ValidationError::InvalidExpression {
                            context: context.to_string(),
                            detail: e.to_string(),
                        });
                    }
                }
            }
        }
        "static" => {
            if !node.params.contains_key("value") {
                errors.push(ValidationError::InvalidNode {
                    context: context.to_string(),
                    detail: "static generator requires value".to_string(),
                });
            }
        }
        "conditional_choice" => {
            if node.params.get("condition_field").and_then(Value::as_str).is_none() {
                errors.push(ValidationError::InvalidNode {
                    context: context.to_string(),
                    detail: "conditional_choice requires condition_field".to_string(),
                });
            }
            match node.params.get("cases").and_then(Value::as_array) {
                Some(cases) if !cases.is_empty() => {}
                _ => errors.push(ValidationError::InvalidNode {
                    context: context.to_string(),
                    detail: "conditional_choice requires cases".to_string(),
                }),
            }
        }
        _ => {}
    }
}

fn check_probability(value: f64, context: &str, errors: &mut Vec<ValidationError>) {
    if !(0.0..=1.0).contains(&value) || !value.is_finite() {
        errors.push(ValidationError::ProbabilityOutOfRange {
            context: context.to_string(),
            value,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> SpecDocument {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_valid_spec_has_no_errors() {
        let spec = parse(
            r##"
schemas:
  User:
    type: object
    properties:
      user_id: { type: string, generator: uuid_v4 }
      email: { type: string, generator: faker.person.email }
entities:
  User:
    schema: "#/schemas/User"
    primary_key: user_id
    state_attributes:
      is_logged_in: { type: boolean, default: false }
event_types:
  UserRegistered:
    payload_schema: "#/schemas/User"
    produces_entity: User
  UserLoggedIn:
    payload_schema: "#/schemas/User"
    consumes_entities:
      - name: User
        alias: user
        selection_filter:
          - { field: state.is_logged_in, operator: equals, value: false }
    updates_entity_state:
      - entity_alias: user
        set_attributes:
          is_logged_in: true
"##,
        );
        assert_eq!(validate_spec(&spec), vec![]);
    }

    #[test]
    fn test_missing_schema_reference() {
        let spec = parse(
            r##"
event_types:
  Ghost:
    payload_schema: "#/schemas/Nope"
"##,
        );
        let errors = validate_spec(&spec);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownSchema { .. })));
    }

    #[test]
    fn test_unknown_generator_name() {
        let spec = parse(
            r#"
schemas:
  Thing:
    type: object
    properties:
      x: { type: string, generator: random_hex }
"#,
        );
        let errors = validate_spec(&spec);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownGenerator { .. })));
    }

    #[test]
    fn test_filter_on_undefined_state_attribute() {
        let spec = parse(
            r##"
schemas:
  User:
    type: object
    properties:
      user_id: { type: string, generator: uuid_v4 }
entities:
  User:
    schema: "#/schemas/User"
    primary_key: user_id
event_types:
  Login:
    payload_schema: "#/schemas/User"
    consumes_entities:
      - name: User
        alias: user
        selection_filter:
          - { field: state.is_vip, operator: equals, value: true }
"##,
        );
        let errors = validate_spec(&spec);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownStateAttribute { .. })));
    }

    #[test]
    fn test_circular_ref_detected() {
        let spec = parse(
            r##"
schemas:
  A:
    $ref: "#/schemas/B"
  B:
    $ref: "#/schemas/A"
"##,
        );
        let errors = validate_spec(&spec);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::CircularReference(_))));
    }

    #[test]
    fn test_conflicting_production() {
        let spec = parse(
            r##"
schemas:
  User:
    type: object
    properties:
      user_id: { type: string, generator: uuid_v4 }
entities:
  User:
    schema: "#/schemas/User"
    primary_key: user_id
event_types:
  Odd:
    payload_schema: "#/schemas/User"
    produces_entity: User
    produces_or_updates_entity: User
"##,
        );
        let errors = validate_spec(&spec);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::ConflictingProduction(_))));
    }

    #[test]
    fn test_scenario_step_with_unknown_event() {
        let spec = parse(
            r#"
scenarios:
  Journey:
    steps:
      - event_type: DoesNotExist
"#,
        );
        let errors = validate_spec(&spec);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownEventType { .. })));
    }

    #[test]
    fn test_bad_choice_weights() {
        let spec = parse(
            r#"
schemas:
  Thing:
    type: object
    properties:
      color:
        type: string
        generator: choice
        params:
          choices: [red, blue]
          weights: [1.0]
"#,
        );
        let errors = validate_spec(&spec);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidNode { .. })));
    }

    #[test]
    fn test_rejected_derived_expression() {
        let spec = parse(
            r#"
schemas:
  Purchase:
    type: object
    properties:
      total:
        type: number
        generator: derived
        params:
          expression: "eval('1+1')()"
"#,
        );
        let errors = validate_spec(&spec);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidExpression { .. })));
    }

    #[test]
    fn test_bad_start_time_and_duration() {
        let spec = parse(
            r#"
simulation_settings:
  duration: "three days"
  time_progression: { start_time: "yesterday-ish", time_multiplier: 1.0 }
"#,
        );
        let errors = validate_spec(&spec);
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ValidationError::InvalidNode { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_probability_range() {
        let spec = parse(
            r#"
schemas:
  Thing:
    type: string
    generator: uuid_v4
    nullable_probability: 1.5
"#,
        );
        let errors = validate_spec(&spec);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::ProbabilityOutOfRange { .. })));
    }
}
