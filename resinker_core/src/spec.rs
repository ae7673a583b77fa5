//! Specification document model.
//!
//! A merged spec document declares the data shapes (schemas), the stateful
//! entities events mutate, the event types themselves, multi-step scenarios,
//! global simulation settings, and output sinks. All maps are order
//! preserving: the engine's determinism contract requires iterating them in
//! declared order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::SpecError;

fn default_version() -> String {
    "1.0".to_string()
}

fn default_weight() -> f64 {
    1.0
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_start_time() -> String {
    "now".to_string()
}

fn default_min_required() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Root of a merged, import-resolved specification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecDocument {
    /// Spec format version
    #[serde(default = "default_version")]
    pub version: String,

    /// Import paths, already resolved by the loader; retained for `info`
    #[serde(default)]
    pub imports: Vec<String>,

    /// Global run settings
    #[serde(default)]
    pub simulation_settings: SimulationSettings,

    /// Named schema nodes, referenced by `$ref` and `payload_schema`
    #[serde(default)]
    pub schemas: IndexMap<String, SchemaNode>,

    /// Stateful entity kinds
    #[serde(default)]
    pub entities: IndexMap<String, EntityDef>,

    /// Event type registry
    #[serde(default)]
    pub event_types: IndexMap<String, EventTypeDef>,

    /// Multi-step user journeys
    #[serde(default)]
    pub scenarios: IndexMap<String, ScenarioDef>,

    /// Sink configurations, in dispatch order
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

impl SpecDocument {
    /// Resolves a schema reference of the form `#/schemas/Name` or a bare
    /// schema name.
    pub fn schema(&self, reference: &str) -> Option<&SchemaNode> {
        self.schemas.get(schema_name(reference))
    }
}

/// Strips the `#/schemas/` prefix from a schema reference, if present.
pub fn schema_name(reference: &str) -> &str {
    reference.strip_prefix("#/schemas/").unwrap_or(reference)
}

/// Global simulation settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulationSettings {
    /// Run duration budget as a humantime string (e.g. "30m", "1h"),
    /// measured against the wall clock
    #[serde(default)]
    pub duration: Option<String>,

    /// Total emitted-event budget
    #[serde(default)]
    pub total_events: Option<u64>,

    /// Entities created before the first tick
    #[serde(default)]
    pub initial_entity_counts: IndexMap<String, usize>,

    /// Synthetic clock configuration
    #[serde(default)]
    pub time_progression: TimeProgression,

    /// Root PRNG seed; drawn from entropy when absent
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl SimulationSettings {
    /// Parses the duration budget into seconds, if one is set.
    pub fn duration_seconds(&self) -> Result<Option<f64>, SpecError> {
        match &self.duration {
            None => Ok(None),
            Some(raw) => {
                let parsed: Duration = humantime::parse_duration(raw)
                    .map_err(|e| SpecError::InvalidDuration(raw.clone(), e.to_string()))?;
                Ok(Some(parsed.as_secs_f64()))
            }
        }
    }
}

/// Synthetic clock settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeProgression {
    /// `"now"` (resolved once at run start) or an RFC 3339 timestamp
    #[serde(default = "default_start_time")]
    pub start_time: String,

    /// Scales synthetic-time deltas; never throttles generation
    #[serde(default = "default_multiplier")]
    pub time_multiplier: f64,
}

impl Default for TimeProgression {
    fn default() -> Self {
        Self {
            start_time: default_start_time(),
            time_multiplier: default_multiplier(),
        }
    }
}

/// Primitive schema node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

/// A single schema node.
///
/// Nodes are heterogeneous and discriminated by `type` plus the presence of
/// `generator` / `properties` / `items` / `$ref`; the validator rejects
/// unknown combinations before the engine ever sees them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaNode {
    /// Node type; objects and arrays are structural, the rest primitive
    #[serde(rename = "type", default)]
    pub node_type: Option<SchemaType>,

    /// Generator name from the closed set, or `faker.<provider>.<method>`
    #[serde(default)]
    pub generator: Option<String>,

    /// Generator parameters, interpreted per generator
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,

    /// Output format hint (e.g. `iso8601`, `unix`, `unix_ms`)
    #[serde(default)]
    pub format: Option<String>,

    /// Probability in [0, 1] of emitting null instead of a value
    #[serde(default)]
    pub nullable_probability: Option<f64>,

    /// Object fields, emitted in declared order
    #[serde(default)]
    pub properties: Option<IndexMap<String, SchemaNode>>,

    /// Array item schema
    #[serde(default)]
    pub items: Option<Box<SchemaNode>>,

    /// Inclusive array length bounds
    #[serde(default)]
    pub min_items: Option<usize>,
    #[serde(default)]
    pub max_items: Option<usize>,

    /// Reference to another named schema
    #[serde(rename = "$ref", default)]
    pub reference: Option<String>,

    /// Entity kind this field is copied from, resolved against the binding
    #[serde(default)]
    pub from_entity: Option<String>,

    /// Field path within the source entity (`state.` prefix reads state)
    #[serde(default)]
    pub field: Option<String>,

    /// Human-readable description; not used by the engine
    #[serde(default)]
    pub description: Option<String>,
}

impl SchemaNode {
    /// Returns the referenced schema node with locally declared members
    /// layered on top (the referencing node wins).
    pub fn merged_into(&self, referenced: &SchemaNode) -> SchemaNode {
        let mut merged = referenced.clone();
        if self.node_type.is_some() {
            merged.node_type = self.node_type;
        }
        if self.generator.is_some() {
            merged.generator = self.generator.clone();
        }
        if !self.params.is_empty() {
            merged.params = self.params.clone();
        }
        if self.format.is_some() {
            merged.format = self.format.clone();
        }
        if self.nullable_probability.is_some() {
            merged.nullable_probability = self.nullable_probability;
        }
        if self.from_entity.is_some() {
            merged.from_entity = self.from_entity.clone();
        }
        if self.field.is_some() {
            merged.field = self.field.clone();
        }
        merged.reference = None;
        merged
    }
}

/// Definition of a stateful entity kind.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityDef {
    /// Schema describing the entity payload
    #[serde(rename = "schema")]
    pub schema_ref: String,

    /// Field path within the payload holding the unique key
    pub primary_key: String,

    /// Engine-managed state attributes, outside the payload schema
    #[serde(default)]
    pub state_attributes: IndexMap<String, StateAttributeDef>,
}

/// Declaration of a single entity state attribute.
#[derive(Debug, Clone, Deserialize)]
pub struct StateAttributeDef {
    /// Declared attribute type; informational
    #[serde(rename = "type", default)]
    pub attr_type: Option<String>,

    /// Initial value when the entity is created
    #[serde(default)]
    pub default: Option<Value>,

    /// Whether null is a legal value
    #[serde(default)]
    pub nullable: bool,

    /// Initialize from this payload field instead of `default`
    #[serde(default)]
    pub from_field: Option<String>,
}

/// Comparison operator for selection filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    In,
    NotIn,
}

/// One conjunct of a selection filter.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterClause {
    /// `payload.<path>`, a bare payload path, or `state.<name>`
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

/// Entity consumption declared by an event type.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityConsumption {
    /// Entity kind to consume
    pub name: String,

    /// Alias under which the chosen instance is bound
    pub alias: String,

    /// Conjunction of clauses candidates must satisfy
    #[serde(default)]
    pub selection_filter: Vec<FilterClause>,

    /// Minimum matching candidates for the event to be feasible
    #[serde(default = "default_min_required")]
    pub min_required: usize,
}

/// Source of a state-attribute assignment.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AttributeSource {
    /// Copy a field from the emitted payload
    FromPayload { from_payload_field: String },
    /// Assign a literal value
    Literal(Value),
}

/// Source of a numeric state-attribute increment.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IncrementSource {
    /// Add a payload field's numeric value, optionally negated
    FromPayload {
        from_payload_field: String,
        #[serde(default)]
        negate: bool,
    },
    /// Add a literal delta
    Literal(f64),
}

/// A state mutation applied when an event commits.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityStateUpdate {
    /// Alias of the bound entity to mutate
    pub entity_alias: String,

    /// Attributes assigned outright
    #[serde(default)]
    pub set_attributes: IndexMap<String, AttributeSource>,

    /// Attributes incremented by a numeric delta
    #[serde(default)]
    pub increment_attributes: IndexMap<String, IncrementSource>,
}

/// Cap on how many instances may hold a given state value at once.
#[derive(Debug, Clone, Deserialize)]
pub struct MaxActiveCap {
    pub entity: String,
    pub attribute: String,
    pub value: Value,
    pub max_count: usize,
}

/// Definition of an event type.
#[derive(Debug, Clone, Deserialize)]
pub struct EventTypeDef {
    /// Schema the payload conforms to
    pub payload_schema: String,

    /// Entity kind created from the payload on commit
    #[serde(default)]
    pub produces_entity: Option<String>,

    /// Entity kind created or updated, governed by
    /// `update_existing_probability`; mutually exclusive with
    /// `produces_entity`
    #[serde(default)]
    pub produces_or_updates_entity: Option<String>,

    /// Probability in [0, 1] of updating an existing instance
    #[serde(default)]
    pub update_existing_probability: Option<f64>,

    /// Entities this event consumes, in declared order
    #[serde(default)]
    pub consumes_entities: Vec<EntityConsumption>,

    /// State mutations applied on commit, in declared order
    #[serde(default)]
    pub updates_entity_state: Vec<EntityStateUpdate>,

    /// Stand-alone scheduling weight; 0 removes the event from the
    /// stand-alone pool
    #[serde(default = "default_weight")]
    pub frequency_weight: f64,

    /// Feasibility cap keyed on a produced-entity state value
    #[serde(default)]
    pub max_active_instances_of_state: Option<MaxActiveCap>,
}

/// Inclusive delay range in seconds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DelayRange {
    pub min_seconds: f64,
    pub max_seconds: f64,
}

/// Loop declaration on a scenario step.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LoopSpec {
    pub min_count: u32,
    pub max_count: u32,

    /// Delay in seconds between loop iterations
    #[serde(default)]
    pub delay_between_loops: Option<f64>,
}

/// One step of a scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioStep {
    /// Event type emitted by this step
    pub event_type: String,

    /// Field values forced onto the generated payload (overrides win)
    #[serde(default)]
    pub payload_overrides: IndexMap<String, Value>,

    /// Sampled delay before this step becomes due
    #[serde(default)]
    pub delay_after_previous_step: Option<DelayRange>,

    /// Repeat this step a sampled number of times
    #[serde(rename = "loop", default)]
    pub repeat: Option<LoopSpec>,
}

/// Entity requirement captured when a scenario is initiated.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioRequirement {
    pub name: String,
    pub alias: String,
    #[serde(default)]
    pub selection_filter: Vec<FilterClause>,
}

/// Definition of a multi-step scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioDef {
    #[serde(default)]
    pub description: Option<String>,

    /// Weight for per-tick initiation sampling
    #[serde(default = "default_weight")]
    pub initiation_weight: f64,

    /// Entities that must exist before the scenario can start; bindings
    /// are captured at initiation
    #[serde(default)]
    pub requires_initial_entities: Vec<ScenarioRequirement>,

    pub steps: Vec<ScenarioStep>,
}

/// Record rendering for stdout and file sinks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Json,
    JsonPretty,
}

/// A single sink configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputConfig {
    Stdout {
        #[serde(default = "default_true")]
        enabled: bool,
        #[serde(default)]
        format: OutputFormat,
    },
    File {
        #[serde(default = "default_true")]
        enabled: bool,
        file_path: std::path::PathBuf,
        #[serde(default)]
        format: OutputFormat,
    },
    Kafka {
        #[serde(default = "default_true")]
        enabled: bool,
        #[serde(default)]
        topic_mapping: IndexMap<String, String>,
        #[serde(default)]
        default_topic: Option<String>,
        kafka_brokers: String,
        #[serde(default)]
        security_protocol: Option<String>,
        #[serde(default)]
        sasl_mechanism: Option<String>,
        #[serde(default)]
        sasl_plain_username: Option<String>,
        #[serde(default)]
        sasl_plain_password: Option<String>,
    },
}

impl OutputConfig {
    /// Whether this sink participates in the run.
    pub fn enabled(&self) -> bool {
        match self {
            OutputConfig::Stdout { enabled, .. } => *enabled,
            OutputConfig::File { enabled, .. } => *enabled,
            OutputConfig::Kafka { enabled, .. } => *enabled,
        }
    }

    /// Short sink-kind label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            OutputConfig::Stdout { .. } => "stdout",
            OutputConfig::File { .. } => "file",
            OutputConfig::Kafka { .. } => "kafka",
        }
    }
}
