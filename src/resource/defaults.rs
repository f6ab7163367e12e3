//! Default Materializer
//!
//! Produces schema-complete documents: every scalar holds its default, every
//! object a recursively materialized sub-tree and every list its seed (or an
//! empty list). Defaulting is total over a well-formed schema.

use serde_json::{Map, Value};

use super::schema::{AttributePath, AttributeSchema, AttributeSpec, Shape, ValueType};
use crate::error::{Error, Result};

/// Materialize the default instance of a schema
pub fn materialize_defaults(schema: &AttributeSchema) -> Value {
    let mut map = Map::new();
    for spec in schema.iter() {
        map.insert(spec.name.to_string(), default_value(spec));
    }
    Value::Object(map)
}

/// Default for a single attribute
///
/// Required scalars have no declared default; when their container is
/// defaulted wholesale they get the zero value of their type.
pub fn default_value(spec: &AttributeSpec) -> Value {
    if let Some(value) = &spec.default {
        return value.clone();
    }
    match (spec.shape, &spec.nested) {
        (Shape::Object, Some(nested)) => materialize_defaults(nested),
        (Shape::ListOfObject, _) | (Shape::ListOfScalar, _) => Value::Array(Vec::new()),
        (Shape::Scalar, _) => zero_value(spec.value_type),
        (Shape::Object, None) => Value::Object(Map::new()),
    }
}

/// Zero value emitted for a required scalar inside a defaulted container
fn zero_value(value_type: ValueType) -> Value {
    match value_type {
        ValueType::String => Value::String(String::new()),
        ValueType::Int => Value::from(0),
        ValueType::Bool => Value::Bool(false),
    }
}

/// Fill every gap of a desired document with defaults.
///
/// Missing required attributes fail with a validation error naming the
/// path; values that cannot be converted to the declared type fail with a
/// translation error.
pub fn fill_defaults(desired: &Value, schema: &AttributeSchema) -> Result<Value> {
    fill_object(desired, schema, &AttributePath::root())
}

fn fill_object(desired: &Value, schema: &AttributeSchema, at: &AttributePath) -> Result<Value> {
    let fields = match desired {
        Value::Object(map) => Some(map),
        Value::Null => None,
        _ => return Err(Error::validation(display(at), "expected an object")),
    };

    let mut out = Map::new();
    for spec in schema.iter() {
        let path = at.field(spec.name);
        let given = fields.and_then(|m| m.get(spec.name)).filter(|v| !v.is_null());
        let value = match given {
            Some(value) => fill_attribute(value, spec, &path)?,
            None if spec.required && !spec.computed && spec.default.is_none() => {
                return Err(Error::validation(
                    path.to_string(),
                    "required attribute is missing",
                ));
            },
            None => default_value(spec),
        };
        out.insert(spec.name.to_string(), value);
    }
    Ok(Value::Object(out))
}

fn fill_attribute(value: &Value, spec: &AttributeSpec, path: &AttributePath) -> Result<Value> {
    match spec.shape {
        Shape::Scalar => spec.value_type.coerce(value).ok_or_else(|| {
            Error::translation(
                path.to_string(),
                format!("cannot convert {} to {}", value, spec.value_type.name()),
            )
        }),
        Shape::ListOfScalar => {
            let items = value
                .as_array()
                .ok_or_else(|| Error::validation(path.to_string(), "expected a list"))?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    spec.value_type.coerce(item).ok_or_else(|| {
                        Error::translation(
                            path.index(i).to_string(),
                            format!("cannot convert {} to {}", item, spec.value_type.name()),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        },
        Shape::Object => match &spec.nested {
            Some(nested) => fill_object(value, nested, path),
            None => Ok(value.clone()),
        },
        Shape::ListOfObject => {
            let items = value
                .as_array()
                .ok_or_else(|| Error::validation(path.to_string(), "expected a list"))?;
            let Some(nested) = &spec.nested else {
                return Ok(value.clone());
            };
            items
                .iter()
                .enumerate()
                .map(|(i, item)| fill_object(item, nested, &path.index(i)))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        },
    }
}

fn display(path: &AttributePath) -> String {
    let text = path.to_string();
    if text.is_empty() {
        "<document>".to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::schema::ReplacePolicy;
    use serde_json::json;

    fn sample_schema() -> AttributeSchema {
        AttributeSchema::new(vec![
            AttributeSpec::id(),
            AttributeSpec::string("name").required(),
            AttributeSpec::int("threshold").with_default(json!(0)),
            AttributeSpec::int_list("server_ids").with_default(json!([3, 4])),
            AttributeSpec::object(
                "definition",
                AttributeSchema::new(vec![
                    AttributeSpec::string("restrict_by").with_default(json!("C")),
                    AttributeSpec::list_of(
                        "attributes",
                        AttributeSchema::new(vec![AttributeSpec::string("vm_gpu_field")
                            .with_default(json!(""))
                            .replace(ReplacePolicy::Always)]),
                    ),
                ]),
            ),
        ])
    }

    #[test]
    fn test_materialize_defaults_is_complete() {
        let defaults = materialize_defaults(&sample_schema());
        assert_eq!(defaults["threshold"], json!(0));
        assert_eq!(defaults["server_ids"], json!([3, 4]));
        assert_eq!(defaults["definition"]["restrict_by"], json!("C"));
        assert_eq!(defaults["definition"]["attributes"], json!([]));
        assert_eq!(defaults["id"], json!(""));
    }

    #[test]
    fn test_fill_missing_required_names_path() {
        let err = fill_defaults(&json!({}), &sample_schema()).unwrap_err();
        assert!(matches!(err, Error::Validation { ref path, .. } if path == "name"));
    }

    #[test]
    fn test_fill_keeps_given_and_defaults_rest() {
        let filled = fill_defaults(
            &json!({"name": "pool-a", "server_ids": ["10", 11], "definition": {}}),
            &sample_schema(),
        )
        .unwrap();
        assert_eq!(filled["name"], json!("pool-a"));
        assert_eq!(filled["server_ids"], json!([10, 11]));
        assert_eq!(filled["definition"]["restrict_by"], json!("C"));
    }

    #[test]
    fn test_fill_reports_bad_list_element() {
        let err = fill_defaults(
            &json!({"name": "pool-a", "server_ids": ["10", "eleven"]}),
            &sample_schema(),
        )
        .unwrap_err();
        assert_eq!(err.path(), Some("server_ids[1]"));
        assert!(matches!(err, Error::Translation { .. }));
    }

    #[test]
    fn test_fill_list_elements_get_defaults() {
        let filled = fill_defaults(
            &json!({"name": "p", "definition": {"attributes": [{}, {"vm_gpu_field": "nvidia"}]}}),
            &sample_schema(),
        )
        .unwrap();
        assert_eq!(
            filled["definition"]["attributes"],
            json!([{"vm_gpu_field": ""}, {"vm_gpu_field": "nvidia"}])
        );
    }
}
