//! In-memory entity store.
//!
//! Instances live only for the simulation run and are exclusively mutated
//! by the scheduler. Kinds and instances are kept in insertion order so
//! candidate enumeration is deterministic.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;

use resinker_core::spec::{FilterClause, FilterOperator};

use crate::error::EngineError;

/// A single stateful entity instance.
#[derive(Debug, Clone)]
pub struct EntityInstance {
    /// Entity kind this instance belongs to
    pub kind: String,

    /// Unique key within the kind, taken from the payload
    pub primary_key_value: Value,

    /// Payload fields, conforming to the entity's schema
    pub payload: serde_json::Map<String, Value>,

    /// Engine-managed state attributes
    pub state: serde_json::Map<String, Value>,

    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl EntityInstance {
    /// Store key for a primary-key value: strings verbatim, everything
    /// else via its JSON rendering.
    pub fn key_of(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Store key for this instance.
    pub fn key(&self) -> String {
        Self::key_of(&self.primary_key_value)
    }

    /// Resolves a filter field against this instance: `state.<name>` reads
    /// the state map, `payload.<path>` or a bare path reads the payload.
    pub fn resolve_field(&self, field: &str) -> Option<&Value> {
        if let Some(attribute) = field.strip_prefix("state.") {
            return self.state.get(attribute);
        }
        let path = field.strip_prefix("payload.").unwrap_or(field);
        lookup_path(&self.payload, path)
    }

    /// Whether this instance satisfies every clause of a filter
    /// conjunction. Type mismatches fail the clause, never the run.
    pub fn matches_filters(&self, filters: &[FilterClause]) -> bool {
        filters.iter().all(|clause| {
            let actual = self.resolve_field(&clause.field).unwrap_or(&Value::Null);
            clause_matches(actual, clause.operator, &clause.value)
        })
    }
}

/// Walks a dotted path through nested JSON objects.
pub fn lookup_path<'a>(map: &'a serde_json::Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut current: Option<&Value> = None;
    for part in path.split('.') {
        current = match current {
            None => map.get(part),
            Some(Value::Object(nested)) => nested.get(part),
            _ => None,
        };
        current?;
    }
    current
}

fn clause_matches(actual: &Value, operator: FilterOperator, expected: &Value) -> bool {
    match operator {
        FilterOperator::Equals => actual == expected,
        FilterOperator::NotEquals => actual != expected,
        FilterOperator::GreaterThan => numeric(actual, expected, |a, b| a > b),
        FilterOperator::LessThan => numeric(actual, expected, |a, b| a < b),
        FilterOperator::GreaterOrEqual => numeric(actual, expected, |a, b| a >= b),
        FilterOperator::LessOrEqual => numeric(actual, expected, |a, b| a <= b),
        FilterOperator::In => match expected {
            Value::Array(options) => options.contains(actual),
            _ => false,
        },
        FilterOperator::NotIn => match expected {
            Value::Array(options) => !options.contains(actual),
            _ => false,
        },
    }
}

fn numeric(actual: &Value, expected: &Value, compare: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => compare(a, b),
        _ => false,
    }
}

/// Maps `(entity_kind, primary_key)` to instances.
#[derive(Debug, Default)]
pub struct EntityStore {
    kinds: IndexMap<String, IndexMap<String, EntityInstance>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new instance, failing on a primary-key collision.
    /// Returns the store key.
    pub fn insert(&mut self, instance: EntityInstance) -> Result<String, EngineError> {
        let key = instance.key();
        let kind_map = self.kinds.entry(instance.kind.clone()).or_default();
        if kind_map.contains_key(&key) {
            return Err(EngineError::DuplicatePrimaryKey {
                kind: instance.kind.clone(),
                key,
            });
        }
        kind_map.insert(key.clone(), instance);
        Ok(key)
    }

    pub fn get(&self, kind: &str, key: &str) -> Option<&EntityInstance> {
        self.kinds.get(kind)?.get(key)
    }

    /// Applies a mutator to one instance atomically, stamping
    /// `last_updated_at`.
    pub fn update(
        &mut self,
        kind: &str,
        key: &str,
        now: DateTime<Utc>,
        mutate: impl FnOnce(&mut EntityInstance),
    ) -> Result<(), EngineError> {
        let instance = self
            .kinds
            .get_mut(kind)
            .and_then(|kind_map| kind_map.get_mut(key))
            .ok_or_else(|| EngineError::EntityNotFound {
                kind: kind.to_string(),
                key: key.to_string(),
            })?;
        mutate(instance);
        instance.last_updated_at = now;
        Ok(())
    }

    /// All instances of a kind satisfying the filter conjunction, in
    /// insertion order.
    pub fn select<'a>(
        &'a self,
        kind: &str,
        filters: &[FilterClause],
    ) -> Vec<(&'a str, &'a EntityInstance)> {
        let Some(kind_map) = self.kinds.get(kind) else {
            return Vec::new();
        };
        kind_map
            .iter()
            .filter(|(_, instance)| instance.matches_filters(filters))
            .map(|(key, instance)| (key.as_str(), instance))
            .collect()
    }

    /// Number of instances whose state attribute equals the given value.
    pub fn count_where(&self, kind: &str, attribute: &str, value: &Value) -> usize {
        let Some(kind_map) = self.kinds.get(kind) else {
            return 0;
        };
        kind_map
            .values()
            .filter(|instance| instance.state.get(attribute) == Some(value))
            .count()
    }

    /// Number of instances of a kind.
    pub fn count(&self, kind: &str) -> usize {
        self.kinds.get(kind).map_or(0, IndexMap::len)
    }

    /// Store keys of every instance of a kind, in insertion order.
    pub fn keys(&self, kind: &str) -> Vec<String> {
        self.kinds
            .get(kind)
            .map(|kind_map| kind_map.keys().cloned().collect())
            .unwrap_or_default()
    }
}
