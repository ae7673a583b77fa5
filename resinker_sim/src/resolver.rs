//! Dependency resolution and candidate selection.
//!
//! Before an event can be generated, every entry of its
//! `consumes_entities` list must bind to a live entity instance. A binding
//! lives only for one generate-and-commit; scenario runs capture
//! alias → instance references that are reused when alias (or produced
//! kind) names match.

use indexmap::IndexMap;
use rand::Rng;

use resinker_core::spec::{EntityConsumption, EventTypeDef};

use crate::error::GeneratorError;
use crate::prng::PrngStreams;
use crate::store::EntityStore;

/// A reference captured by a scenario run: alias → instance.
#[derive(Debug, Clone)]
pub struct CapturedRef {
    pub kind: String,
    pub key: String,
}

/// Alias → instance references a scenario run threads across its steps.
pub type CapturedBindings = IndexMap<String, CapturedRef>;

/// One bound consumption: the chosen instance plus the candidate pool it
/// was chosen from (array-item fields re-draw from the pool).
#[derive(Debug, Clone)]
pub struct BindingEntry {
    pub alias: String,
    pub kind: String,
    pub selected: String,
    pub candidates: Vec<String>,
}

/// Alias → entity bindings for a single event generation.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    entries: Vec<BindingEntry>,
}

impl Binding {
    pub fn insert(&mut self, entry: BindingEntry) {
        self.entries.push(entry);
    }

    pub fn get(&self, alias: &str) -> Option<&BindingEntry> {
        self.entries.iter().find(|entry| entry.alias == alias)
    }

    pub fn entries(&self) -> &[BindingEntry] {
        &self.entries
    }

    /// Resolves a `from_entity` reference: by kind when unique, by alias
    /// when several bindings share the kind.
    pub fn resolve_kind(&self, kind: &str) -> Result<&BindingEntry, GeneratorError> {
        let mut matches = self.entries.iter().filter(|entry| entry.kind == kind);
        let first = matches.next();
        let second = matches.next();
        match (first, second) {
            (Some(entry), None) => Ok(entry),
            (Some(_), Some(_)) => self
                .get(kind)
                .ok_or_else(|| GeneratorError::AmbiguousBinding(kind.to_string())),
            (None, _) => Err(GeneratorError::MissingBinding(kind.to_string())),
        }
    }
}

/// Looks up a captured reference usable for a consumption: by alias first,
/// then by the consumed kind's name (how produced entities are recorded).
fn captured_for<'a>(
    captured: Option<&'a CapturedBindings>,
    consumption: &EntityConsumption,
    store: &EntityStore,
) -> Option<&'a CapturedRef> {
    let captured = captured?;
    captured
        .get(&consumption.alias)
        .or_else(|| captured.get(&consumption.name))
        .filter(|reference| reference.kind == consumption.name)
        .filter(|reference| store.get(&reference.kind, &reference.key).is_some())
}

/// Whether the event could be generated and committed right now: every
/// consumed entity has enough candidates and any max-active budget has
/// headroom.
pub fn is_feasible(
    event: &EventTypeDef,
    store: &EntityStore,
    captured: Option<&CapturedBindings>,
) -> bool {
    for consumption in &event.consumes_entities {
        if captured_for(captured, consumption, store).is_some() {
            continue;
        }
        let candidates = store.select(&consumption.name, &consumption.selection_filter);
        if candidates.len() < consumption.min_required {
            return false;
        }
    }
    if let Some(cap) = &event.max_active_instances_of_state {
        if store.count_where(&cap.entity, &cap.attribute, &cap.value) >= cap.max_count {
            return false;
        }
    }
    true
}

/// Builds the binding for one event generation, reusing captured scenario
/// references where alias names match and selecting fresh instances
/// otherwise. Returns `None` when a consumption cannot be satisfied.
pub fn build_binding(
    event: &EventTypeDef,
    store: &EntityStore,
    streams: &mut PrngStreams,
    captured: Option<&CapturedBindings>,
) -> Option<Binding> {
    let mut binding = Binding::default();
    for consumption in &event.consumes_entities {
        if let Some(reference) = captured_for(captured, consumption, store) {
            binding.insert(BindingEntry {
                alias: consumption.alias.clone(),
                kind: reference.kind.clone(),
                selected: reference.key.clone(),
                candidates: vec![reference.key.clone()],
            });
            continue;
        }

        let candidates: Vec<String> = store
            .select(&consumption.name, &consumption.selection_filter)
            .into_iter()
            .map(|(key, _)| key.to_string())
            .collect();
        if candidates.len() < consumption.min_required {
            return None;
        }
        let selected = candidates[streams.selection.gen_range(0..candidates.len())].clone();
        binding.insert(BindingEntry {
            alias: consumption.alias.clone(),
            kind: consumption.name.clone(),
            selected,
            candidates,
        });
    }
    Some(binding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityInstance;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn store_with_users(states: &[(&str, bool)]) -> EntityStore {
        let mut store = EntityStore::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for (id, logged_in) in states {
            let payload = match json!({"user_id": id}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            };
            let state = match json!({"is_logged_in": logged_in}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            };
            store
                .insert(EntityInstance {
                    kind: "User".to_string(),
                    primary_key_value: Value::String(id.to_string()),
                    payload,
                    state,
                    created_at: at,
                    last_updated_at: at,
                })
                .unwrap();
        }
        store
    }

    fn login_event(max_count: Option<usize>) -> EventTypeDef {
        let mut yaml = String::from(
            r#"
payload_schema: LoginPayload
consumes_entities:
  - name: User
    alias: user
    selection_filter:
      - { field: state.is_logged_in, operator: equals, value: false }
"#,
        );
        if let Some(max_count) = max_count {
            yaml.push_str(&format!(
                "max_active_instances_of_state: {{ entity: User, attribute: is_logged_in, value: true, max_count: {max_count} }}\n"
            ));
        }
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn test_feasible_with_matching_candidate() {
        let store = store_with_users(&[("u1", false)]);
        assert!(is_feasible(&login_event(None), &store, None));
    }

    #[test]
    fn test_infeasible_without_candidates() {
        let store = store_with_users(&[("u1", true)]);
        assert!(!is_feasible(&login_event(None), &store, None));
    }

    #[test]
    fn test_cap_blocks_feasibility() {
        let store = store_with_users(&[("u1", false), ("u2", true), ("u3", true)]);
        assert!(is_feasible(&login_event(Some(3)), &store, None));
        assert!(!is_feasible(&login_event(Some(2)), &store, None));
    }

    #[test]
    fn test_binding_selects_only_matching_candidates() {
        let store = store_with_users(&[("u1", true), ("u2", false), ("u3", true)]);
        let mut streams = PrngStreams::new(1);
        let binding = build_binding(&login_event(None), &store, &mut streams, None).unwrap();
        let entry = binding.get("user").unwrap();
        assert_eq!(entry.selected, "u2");
        assert_eq!(entry.candidates, vec!["u2".to_string()]);
    }

    #[test]
    fn test_captured_reference_is_reused_and_skips_filter() {
        let store = store_with_users(&[("u1", true), ("u2", false)]);
        let mut streams = PrngStreams::new(1);
        let mut captured = CapturedBindings::new();
        captured.insert(
            "user".to_string(),
            CapturedRef {
                kind: "User".to_string(),
                key: "u1".to_string(),
            },
        );

        // u1 no longer matches the filter, but the threaded binding wins.
        let binding =
            build_binding(&login_event(None), &store, &mut streams, Some(&captured)).unwrap();
        assert_eq!(binding.get("user").unwrap().selected, "u1");
        assert!(is_feasible(&login_event(None), &store, Some(&captured)));
    }

    #[test]
    fn test_captured_by_produced_kind_name() {
        let store = store_with_users(&[("u1", true)]);
        let mut streams = PrngStreams::new(1);
        let mut captured = CapturedBindings::new();
        // A producing step records the instance under its kind name.
        captured.insert(
            "User".to_string(),
            CapturedRef {
                kind: "User".to_string(),
                key: "u1".to_string(),
            },
        );

        let binding =
            build_binding(&login_event(None), &store, &mut streams, Some(&captured)).unwrap();
        assert_eq!(binding.get("user").unwrap().selected, "u1");
    }

    #[test]
    fn test_resolve_kind_by_uniqueness_and_alias() {
        let mut binding = Binding::default();
        binding.insert(BindingEntry {
            alias: "buyer".to_string(),
            kind: "User".to_string(),
            selected: "u1".to_string(),
            candidates: vec!["u1".to_string()],
        });
        assert_eq!(binding.resolve_kind("User").unwrap().selected, "u1");

        binding.insert(BindingEntry {
            alias: "User".to_string(),
            kind: "User".to_string(),
            selected: "u2".to_string(),
            candidates: vec!["u2".to_string()],
        });
        // Ambiguous by kind, resolved by the alias that equals the kind.
        assert_eq!(binding.resolve_kind("User").unwrap().selected, "u2");

        assert!(matches!(
            binding.resolve_kind("Product"),
            Err(GeneratorError::MissingBinding(_))
        ));
    }
}
