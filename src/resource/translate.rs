//! Desired→Remote Translator
//!
//! Turns a (possibly partial) desired document into the payload the remote
//! API expects: defaults are applied, values converted to their declared
//! types, local names mapped to wire names and flattened objects lifted to
//! their parent level. Pure transform.

use serde_json::{Map, Value};

use super::defaults::fill_defaults;
use super::schema::{AttributeSchema, AttributeSpec, Shape};
use crate::error::Result;

/// Which lifecycle call the payload is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Update,
}

/// Translate a desired document into a remote payload
pub fn translate(desired: &Value, schema: &AttributeSchema, mode: Mode) -> Result<Value> {
    let completed = fill_defaults(desired, schema)?;
    let mut payload = Map::new();
    emit_object(&completed, Some(desired), schema, mode, &mut payload);
    Ok(Value::Object(payload))
}

/// Copy a payload with every sensitive value masked, for logging
pub fn redact(payload: &Value, schema: &AttributeSchema) -> Value {
    let mut out = payload.clone();
    if let Value::Object(map) = &mut out {
        redact_into(map, schema);
    }
    out
}

fn redact_into(map: &mut Map<String, Value>, schema: &AttributeSchema) {
    for spec in schema.iter() {
        match (spec.shape, &spec.nested) {
            (Shape::Object, Some(nested)) if spec.flatten => redact_into(map, nested),
            (Shape::Object, Some(nested)) => {
                if let Some(Value::Object(inner)) = map.get_mut(spec.wire_name) {
                    redact_into(inner, nested);
                }
            },
            (Shape::ListOfObject, Some(nested)) => {
                if let Some(Value::Array(items)) = map.get_mut(spec.wire_name) {
                    for item in items.iter_mut() {
                        if let Value::Object(inner) = item {
                            redact_into(inner, nested);
                        }
                    }
                }
            },
            _ if spec.sensitive => {
                if let Some(value) = map.get_mut(spec.wire_name) {
                    *value = Value::String("<redacted>".to_string());
                }
            },
            _ => {},
        }
    }
}

/// Emit `completed` into `out` using wire names.
///
/// `raw` is the caller's original sub-document, used to tell an explicitly
/// rotated secret from a defaulted placeholder.
fn emit_object(
    completed: &Value,
    raw: Option<&Value>,
    schema: &AttributeSchema,
    mode: Mode,
    out: &mut Map<String, Value>,
) {
    for spec in schema.iter() {
        if spec.computed {
            continue;
        }
        let value = completed.get(spec.name).unwrap_or(&Value::Null);
        let raw_value = raw.and_then(|r| r.get(spec.name)).filter(|v| !v.is_null());

        if spec.sensitive && mode == Mode::Update && !is_explicit_secret(spec, raw_value) {
            continue;
        }

        match (spec.shape, &spec.nested) {
            (Shape::Object, Some(nested)) if spec.flatten => {
                emit_object(value, raw_value, nested, mode, out);
            },
            (Shape::Object, Some(nested)) => {
                let mut inner = Map::new();
                emit_object(value, raw_value, nested, mode, &mut inner);
                out.insert(spec.wire_name.to_string(), Value::Object(inner));
            },
            (Shape::ListOfObject, Some(nested)) => {
                let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
                let raw_items = raw_value.and_then(Value::as_array);
                let emitted = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let mut inner = Map::new();
                        let raw_item = raw_items.and_then(|r| r.get(i));
                        emit_object(item, raw_item, nested, mode, &mut inner);
                        Value::Object(inner)
                    })
                    .collect();
                out.insert(spec.wire_name.to_string(), Value::Array(emitted));
            },
            _ => {
                out.insert(spec.wire_name.to_string(), value.clone());
            },
        }
    }
}

fn is_explicit_secret(spec: &AttributeSpec, raw: Option<&Value>) -> bool {
    match raw {
        Some(value) => !spec.is_placeholder(value),
        None => false,
    }
}
