//! Remote→Local Mapper
//!
//! Normalizes a remote record into schema-complete local state. Nested
//! objects and lists the remote omits are materialized from their defaults so
//! states stay comparable across reconciliation cycles. Sensitive values are
//! never read back from the remote; they are carried over from the caller's
//! last known document instead.

use serde_json::{Map, Value};

use super::defaults::{default_value, materialize_defaults};
use super::schema::{AttributePath, AttributeSchema, AttributeSpec, Shape};
use crate::error::{Error, Result};

/// Materialize local state from a remote record
pub fn materialize(record: &Value, schema: &AttributeSchema) -> Result<Value> {
    materialize_with(record, schema, None)
}

/// Materialize local state, taking sensitive values from `carry`
pub fn materialize_with(
    record: &Value,
    schema: &AttributeSchema,
    carry: Option<&Value>,
) -> Result<Value> {
    let Value::Object(fields) = record else {
        return Err(Error::mapping("<record>", "remote record is not an object"));
    };
    map_object(fields, schema, carry, &AttributePath::root())
}

fn map_object(
    fields: &Map<String, Value>,
    schema: &AttributeSchema,
    carry: Option<&Value>,
    at: &AttributePath,
) -> Result<Value> {
    let mut out = Map::new();
    for spec in schema.iter() {
        let path = at.field(spec.name);
        let carried = carry.and_then(|c| c.get(spec.name)).filter(|v| !v.is_null());

        let value = if spec.sensitive {
            carried.cloned().unwrap_or_else(|| default_value(spec))
        } else if spec.flatten {
            match &spec.nested {
                Some(nested) => map_object(fields, nested, carried, &path)?,
                None => default_value(spec),
            }
        } else {
            match present(fields, spec) {
                Some(remote) => map_attribute(remote, spec, carried, &path)?,
                None => absent(spec, &path)?,
            }
        };
        out.insert(spec.name.to_string(), value);
    }
    Ok(Value::Object(out))
}

/// Remote value of an attribute, treating an explicit null as absent
fn present<'a>(fields: &'a Map<String, Value>, spec: &AttributeSpec) -> Option<&'a Value> {
    fields.get(spec.wire_name).filter(|v| !v.is_null())
}

/// Local value for an attribute the remote omitted.
///
/// Only computed or default-less required scalars are mapping errors.
/// Objects are always defaulted, required ones included, so a record without
/// `provision.center` still maps.
fn absent(spec: &AttributeSpec, path: &AttributePath) -> Result<Value> {
    match spec.shape {
        Shape::Scalar if spec.computed || (spec.required && spec.default.is_none()) => Err(
            Error::mapping(path.to_string(), "required remote field is missing"),
        ),
        Shape::Object => Ok(spec
            .default
            .clone()
            .or_else(|| spec.nested.as_ref().map(materialize_defaults))
            .unwrap_or(Value::Null)),
        _ => Ok(default_value(spec)),
    }
}

fn map_attribute(
    remote: &Value,
    spec: &AttributeSpec,
    carry: Option<&Value>,
    path: &AttributePath,
) -> Result<Value> {
    match spec.shape {
        Shape::Scalar => spec.value_type.coerce(remote).ok_or_else(|| {
            Error::mapping(
                path.to_string(),
                format!("remote value {} is not a {}", remote, spec.value_type.name()),
            )
        }),
        Shape::ListOfScalar => {
            let items = remote
                .as_array()
                .ok_or_else(|| Error::mapping(path.to_string(), "remote value is not a list"))?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    spec.value_type.coerce(item).ok_or_else(|| {
                        Error::mapping(
                            path.index(i).to_string(),
                            format!("remote value {} is not a {}", item, spec.value_type.name()),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        },
        Shape::Object => {
            let (Value::Object(inner), Some(nested)) = (remote, &spec.nested) else {
                return Err(Error::mapping(path.to_string(), "remote value is not an object"));
            };
            map_object(inner, nested, carry, path)
        },
        Shape::ListOfObject => {
            let (Some(items), Some(nested)) = (remote.as_array(), &spec.nested) else {
                return Err(Error::mapping(path.to_string(), "remote value is not a list"));
            };
            let carried = carry.and_then(Value::as_array);
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let Value::Object(inner) = item else {
                        return Err(Error::mapping(
                            path.index(i).to_string(),
                            "list element is not an object",
                        ));
                    };
                    map_object(inner, nested, carried.and_then(|c| c.get(i)), &path.index(i))
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        },
    }
}
