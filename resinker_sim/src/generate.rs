//! Generator interpreter.
//!
//! Evaluates a schema node against a rendering context to produce one
//! payload value. Field modifiers apply in a fixed order: entity-sourced
//! copy, `$ref` resolution, nullable draw, generator invocation, precision
//! rounding. Object fields are emitted in declared order and each field
//! sees its earlier siblings; array items additionally re-draw entity
//! references from the binding's candidate pool.

use rand::distributions::{Alphanumeric, WeightedIndex};
use rand::prelude::Distribution;
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};

use resinker_core::spec::{schema_name, SchemaNode, SchemaType};
use resinker_core::{Expression, RealisticProvider};

use crate::clock::SimClock;
use crate::error::GeneratorError;
use crate::prng::PrngStreams;
use crate::resolver::Binding;
use crate::store::{lookup_path, EntityStore};

type JsonMap = serde_json::Map<String, Value>;

/// Everything a schema node needs to render a value.
pub struct RenderContext<'a> {
    pub schemas: &'a indexmap::IndexMap<String, SchemaNode>,
    pub clock: &'a SimClock,
    pub store: &'a EntityStore,
    pub binding: &'a Binding,
    pub provider: &'a dyn RealisticProvider,
}

/// Renders a complete payload from its schema.
pub fn render_payload(
    schema: &SchemaNode,
    ctx: &RenderContext<'_>,
    streams: &mut PrngStreams,
) -> Result<Value, GeneratorError> {
    render_node(schema, ctx, streams, &JsonMap::new(), false)
}

fn render_node(
    node: &SchemaNode,
    ctx: &RenderContext<'_>,
    streams: &mut PrngStreams,
    scope: &JsonMap,
    in_array_item: bool,
) -> Result<Value, GeneratorError> {
    // 1. Entity-sourced fields copy straight from the binding.
    if let Some(kind) = &node.from_entity {
        let field = node.field.as_deref().ok_or(GeneratorError::BadParams {
            generator: "from_entity",
            detail: "field is required".to_string(),
        })?;
        return resolve_entity_field(kind, field, ctx, streams, in_array_item);
    }

    // 2. References resolve with local overrides layered on top.
    if let Some(reference) = &node.reference {
        let referenced = ctx
            .schemas
            .get(schema_name(reference))
            .ok_or_else(|| GeneratorError::UnresolvedRef(reference.clone()))?;
        let merged = node.merged_into(referenced);
        return render_node(&merged, ctx, streams, scope, in_array_item);
    }

    // 3. Nullable draw, from the generator stream.
    if let Some(probability) = node.nullable_probability {
        if probability > 0.0 && streams.generator.gen_bool(probability.clamp(0.0, 1.0)) {
            return Ok(Value::Null);
        }
    }

    match node.node_type {
        Some(SchemaType::Object) => render_object(node, ctx, streams, scope),
        Some(SchemaType::Array) => render_array(node, ctx, streams, scope),
        _ => match &node.generator {
            Some(generator) => eval_generator(generator, node, ctx, streams, scope, in_array_item),
            None => default_value(node, ctx, streams),
        },
    }
}

fn render_object(
    node: &SchemaNode,
    ctx: &RenderContext<'_>,
    streams: &mut PrngStreams,
    scope: &JsonMap,
) -> Result<Value, GeneratorError> {
    let Some(properties) = &node.properties else {
        return Ok(Value::Object(JsonMap::new()));
    };
    let mut result = JsonMap::new();
    // Each field sees the parent scope plus its earlier siblings.
    let mut local_scope = scope.clone();
    for (field, child) in properties {
        let value = render_node(child, ctx, streams, &local_scope, false)?;
        local_scope.insert(field.clone(), value.clone());
        result.insert(field.clone(), value);
    }
    Ok(Value::Object(result))
}

fn render_array(
    node: &SchemaNode,
    ctx: &RenderContext<'_>,
    streams: &mut PrngStreams,
    scope: &JsonMap,
) -> Result<Value, GeneratorError> {
    let Some(items) = &node.items else {
        return Ok(Value::Array(Vec::new()));
    };
    let min_items = node.min_items.unwrap_or(0);
    let max_items = node.max_items.unwrap_or(min_items + 5).max(min_items);
    let count = if min_items == max_items {
        min_items
    } else {
        streams.generator.gen_range(min_items..=max_items)
    };

    let mut result = Vec::with_capacity(count);
    for _ in 0..count {
        result.push(render_node(items, ctx, streams, scope, true)?);
    }
    Ok(Value::Array(result))
}

fn resolve_entity_field(
    kind: &str,
    field: &str,
    ctx: &RenderContext<'_>,
    streams: &mut PrngStreams,
    in_array_item: bool,
) -> Result<Value, GeneratorError> {
    let entry = ctx.binding.resolve_kind(kind)?;
    // Inside an array item each element re-draws from the candidate pool,
    // so e.g. items[].product_id can reference a different product per
    // line item.
    let key = if in_array_item && entry.candidates.len() > 1 {
        &entry.candidates[streams.selection.gen_range(0..entry.candidates.len())]
    } else {
        &entry.selected
    };
    let instance = ctx
        .store
        .get(&entry.kind, key)
        .ok_or_else(|| GeneratorError::MissingBinding(kind.to_string()))?;
    instance
        .resolve_field(field)
        .cloned()
        .ok_or_else(|| GeneratorError::MissingEntityField {
            kind: kind.to_string(),
            field: field.to_string(),
        })
}

fn eval_generator(
    generator: &str,
    node: &SchemaNode,
    ctx: &RenderContext<'_>,
    streams: &mut PrngStreams,
    scope: &JsonMap,
    in_array_item: bool,
) -> Result<Value, GeneratorError> {
    match generator {
        "uuid_v4" => {
            let mut bytes = [0u8; 16];
            streams.generator.fill(&mut bytes);
            let id = uuid::Builder::from_random_bytes(bytes).into_uuid();
            Ok(Value::String(id.to_string()))
        }
        "random_int" => {
            let min = param_i64(node, "min").unwrap_or(0);
            let max = param_i64(node, "max").unwrap_or(100);
            if min > max {
                return Err(GeneratorError::BadParams {
                    generator: "random_int",
                    detail: format!("min {min} exceeds max {max}"),
                });
            }
            Ok(Value::from(streams.generator.gen_range(min..=max)))
        }
        "random_float" => {
            let min = param_f64(node, "min").unwrap_or(0.0);
            let max = param_f64(node, "max").unwrap_or(1.0);
            if min > max {
                return Err(GeneratorError::BadParams {
                    generator: "random_float",
                    detail: format!("min {min} exceeds max {max}"),
                });
            }
            let raw = if min == max {
                min
            } else {
                streams.generator.gen_range(min..max)
            };
            let precision = param_u32(node, "precision").unwrap_or(2);
            Ok(Value::from(round_to_precision(raw, precision)))
        }
        "random_alphanumeric" => {
            let length = param_i64(node, "length").unwrap_or(10).max(0) as usize;
            Ok(Value::String(alphanumeric(streams, length)))
        }
        "choice" => {
            let choices = node
                .params
                .get("choices")
                .and_then(Value::as_array)
                .filter(|choices| !choices.is_empty())
                .ok_or(GeneratorError::BadParams {
                    generator: "choice",
                    detail: "choices must be a non-empty array".to_string(),
                })?;
            let weights = node.params.get("weights").and_then(Value::as_array);
            weighted_choice(choices, weights, streams)
        }
        "conditional_choice" => conditional_choice(node, streams, scope),
        "current_timestamp" => Ok(format_timestamp(ctx.clock, node.format.as_deref())),
        "static" => node
            .params
            .get("value")
            .cloned()
            .ok_or(GeneratorError::BadParams {
                generator: "static",
                detail: "value is required".to_string(),
            }),
        "static_hashed" => static_hashed(node, ctx, streams, scope, in_array_item),
        "derived" => {
            let expression = node
                .params
                .get("expression")
                .and_then(Value::as_str)
                .ok_or(GeneratorError::BadParams {
                    generator: "derived",
                    detail: "expression is required".to_string(),
                })?;
            let parsed = Expression::parse(expression)?;
            let value = parsed.evaluate(scope)?;
            let rounded = match param_u32(node, "precision") {
                Some(precision) => round_to_precision(value, precision),
                None => value,
            };
            Ok(Value::from(rounded))
        }
        faker if faker.starts_with("faker.") => {
            let method_path = &faker["faker.".len()..];
            Ok(ctx
                .provider
                .generate(method_path, &node.params, &mut streams.generator)?)
        }
        other => Err(GeneratorError::UnknownGenerator(other.to_string())),
    }
}

/// Rounds to `precision` decimal places, half away from zero.
pub fn round_to_precision(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

fn alphanumeric(streams: &mut PrngStreams, length: usize) -> String {
    (0..length)
        .map(|_| char::from(streams.generator.sample(Alphanumeric)))
        .collect()
}

fn weighted_choice(
    choices: &[Value],
    weights: Option<&Vec<Value>>,
    streams: &mut PrngStreams,
) -> Result<Value, GeneratorError> {
    let index = match weights {
        Some(weights) => {
            let weights: Vec<f64> = weights.iter().filter_map(Value::as_f64).collect();
            if weights.len() != choices.len() {
                return Err(GeneratorError::BadParams {
                    generator: "choice",
                    detail: format!("{} weights for {} choices", weights.len(), choices.len()),
                });
            }
            let distribution = WeightedIndex::new(&weights).map_err(|e| GeneratorError::BadParams {
                generator: "choice",
                detail: e.to_string(),
            })?;
            distribution.sample(&mut streams.generator)
        }
        None => streams.generator.gen_range(0..choices.len()),
    };
    Ok(choices[index].clone())
}

fn conditional_choice(
    node: &SchemaNode,
    streams: &mut PrngStreams,
    scope: &JsonMap,
) -> Result<Value, GeneratorError> {
    let condition_field = node
        .params
        .get("condition_field")
        .and_then(Value::as_str)
        .ok_or(GeneratorError::BadParams {
            generator: "conditional_choice",
            detail: "condition_field is required".to_string(),
        })?;
    let cases = node
        .params
        .get("cases")
        .and_then(Value::as_array)
        .ok_or(GeneratorError::BadParams {
            generator: "conditional_choice",
            detail: "cases are required".to_string(),
        })?;

    let condition_value = lookup_path(scope, condition_field);

    // First matching case wins, then the default case; with neither, the
    // first case stands in.
    if let Some(condition_value) = condition_value {
        for case in cases {
            let Some(case) = case.as_object() else {
                continue;
            };
            if case_matches(case, condition_value) {
                return choose_from_case(case, streams);
            }
        }
    }
    for case in cases {
        if let Some(case) = case.as_object() {
            if case.contains_key("default") {
                return choose_from_case(case, streams);
            }
        }
    }
    match cases.iter().find_map(Value::as_object) {
        Some(first) => choose_from_case(first, streams),
        None => Err(GeneratorError::BadParams {
            generator: "conditional_choice",
            detail: "cases must contain at least one case object".to_string(),
        }),
    }
}

fn case_matches(case: &JsonMap, condition_value: &Value) -> bool {
    if let Some(expected) = case.get("condition_value") {
        return condition_value == expected;
    }
    if let Some(threshold) = case.get("condition_value_greater_than").and_then(Value::as_f64) {
        return condition_value.as_f64().is_some_and(|v| v > threshold);
    }
    if let Some(threshold) = case.get("condition_value_less_than").and_then(Value::as_f64) {
        return condition_value.as_f64().is_some_and(|v| v < threshold);
    }
    if let Some(options) = case.get("condition_value_in").and_then(Value::as_array) {
        return options.contains(condition_value);
    }
    false
}

fn choose_from_case(case: &JsonMap, streams: &mut PrngStreams) -> Result<Value, GeneratorError> {
    let choices = case
        .get("choices")
        .and_then(Value::as_array)
        .filter(|choices| !choices.is_empty())
        .ok_or(GeneratorError::BadParams {
            generator: "conditional_choice",
            detail: "case has no choices".to_string(),
        })?;
    let weights = case.get("weights").and_then(Value::as_array);
    weighted_choice(choices, weights, streams)
}

fn static_hashed(
    node: &SchemaNode,
    ctx: &RenderContext<'_>,
    streams: &mut PrngStreams,
    scope: &JsonMap,
    in_array_item: bool,
) -> Result<Value, GeneratorError> {
    let raw = match node.params.get("raw_value_source") {
        Some(source) => {
            let source_node: SchemaNode = serde_json::from_value(source.clone()).map_err(|e| {
                GeneratorError::BadParams {
                    generator: "static_hashed",
                    detail: format!("invalid raw_value_source: {e}"),
                }
            })?;
            match render_node(&source_node, ctx, streams, scope, in_array_item)? {
                Value::String(s) => s,
                other => other.to_string(),
            }
        }
        None => alphanumeric(streams, 12),
    };

    let algorithm = node
        .params
        .get("algorithm")
        .and_then(Value::as_str)
        .unwrap_or("bcrypt");
    match algorithm {
        "bcrypt" => {
            // Salt comes from the generator stream so hashed fields stay
            // deterministic under the seed contract.
            let salt: [u8; 16] = streams.generator.gen();
            let cost = param_u32(node, "cost").unwrap_or(bcrypt::DEFAULT_COST);
            let hashed = bcrypt::hash_with_salt(raw.as_bytes(), cost, salt)
                .map_err(|e| GeneratorError::Hash(e.to_string()))?;
            Ok(Value::String(hashed.to_string()))
        }
        "sha256" => {
            let digest = Sha256::digest(raw.as_bytes());
            Ok(Value::String(hex::encode(digest)))
        }
        other => Err(GeneratorError::BadParams {
            generator: "static_hashed",
            detail: format!("unsupported algorithm {other:?}"),
        }),
    }
}

fn format_timestamp(clock: &SimClock, format: Option<&str>) -> Value {
    let now = clock.now();
    match format {
        Some("unix") => Value::from(now.timestamp()),
        Some("unix_ms") => Value::from(now.timestamp_millis()),
        _ => Value::String(now.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
    }
}

/// Fallback when a primitive node declares no generator.
fn default_value(
    node: &SchemaNode,
    ctx: &RenderContext<'_>,
    streams: &mut PrngStreams,
) -> Result<Value, GeneratorError> {
    match node.node_type {
        Some(SchemaType::Number) => Ok(Value::from(streams.generator.gen_range(0.0..100.0))),
        Some(SchemaType::Integer) => Ok(Value::from(streams.generator.gen_range(0..=100))),
        Some(SchemaType::Boolean) => Ok(Value::Bool(streams.generator.gen_bool(0.5))),
        _ => match node.format.as_deref() {
            Some("iso8601") | Some("date-time") => Ok(format_timestamp(ctx.clock, None)),
            Some("date") => Ok(Value::String(ctx.clock.now().format("%Y-%m-%d").to_string())),
            Some("time") => Ok(Value::String(ctx.clock.now().format("%H:%M:%S").to_string())),
            _ => Ok(ctx
                .provider
                .generate("word", &node.params, &mut streams.generator)?),
        },
    }
}

fn param_i64(node: &SchemaNode, name: &str) -> Option<i64> {
    node.params.get(name).and_then(Value::as_i64)
}

fn param_f64(node: &SchemaNode, name: &str) -> Option<f64> {
    node.params.get(name).and_then(Value::as_f64)
}

fn param_u32(node: &SchemaNode, name: &str) -> Option<u32> {
    node.params.get(name).and_then(Value::as_u64).map(|v| v as u32)
}
