//! Attribute Schema - static per-kind declaration of attributes
//!
//! A schema is an ordered list of [`AttributeSpec`]s. Order matters: the
//! translator emits payload fields in declaration order, and list elements
//! keep the order given by the caller.

use serde_json::{Number, Value};
use std::fmt;

/// Placeholder stored for sensitive attributes whose real value is unknown
pub const SENSITIVE_PLACEHOLDER: &str = "**********";

/// Structural shape of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Object,
    ListOfScalar,
    ListOfObject,
}

/// Type of a scalar (or of the elements of a scalar list)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Int,
    Bool,
}

impl ValueType {
    /// Convert a JSON value to this type.
    ///
    /// Numeric text becomes a 64-bit integer, numbers become text where a
    /// string is expected. Returns `None` when the value cannot be converted.
    pub fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ValueType::String, Value::String(_)) => Some(value.clone()),
            (ValueType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (ValueType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (ValueType::Int, Value::Number(n)) => n.as_i64().map(|i| Value::Number(i.into())),
            (ValueType::Int, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .ok()
                .map(|i| Value::Number(Number::from(i))),
            (ValueType::Int, Value::Bool(b)) => Some(Value::Number(i64::from(*b).into())),
            (ValueType::Bool, Value::Bool(_)) => Some(value.clone()),
            (ValueType::Bool, Value::Number(n)) => match n.as_i64() {
                Some(0) => Some(Value::Bool(false)),
                Some(1) => Some(Value::Bool(true)),
                _ => None,
            },
            (ValueType::Bool, Value::String(s)) => match s.as_str() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Int => "int64",
            ValueType::Bool => "bool",
        }
    }
}

/// Predicate over (old, new) deciding whether a change forces replacement
pub type ReplacePredicate = fn(&Value, &Value) -> bool;

/// Per-attribute policy for changed values
#[derive(Debug, Clone, Copy)]
pub enum ReplacePolicy {
    /// Changes are applied in place
    Never,
    /// Any change forces destroy-then-recreate
    Always,
    /// Changes force replacement only when the predicate holds
    When(ReplacePredicate),
}

/// Declaration of a single attribute
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    pub name: &'static str,
    /// Field name used by the remote API
    pub wire_name: &'static str,
    pub shape: Shape,
    pub value_type: ValueType,
    pub required: bool,
    pub computed: bool,
    pub sensitive: bool,
    /// Object fields live at the parent level of the remote payload
    pub flatten: bool,
    pub default: Option<Value>,
    pub nested: Option<AttributeSchema>,
    pub replace: ReplacePolicy,
    pub description: &'static str,
}

impl AttributeSpec {
    fn new(name: &'static str, shape: Shape, value_type: ValueType) -> Self {
        Self {
            name,
            wire_name: name,
            shape,
            value_type,
            required: false,
            computed: false,
            sensitive: false,
            flatten: false,
            default: None,
            nested: None,
            replace: ReplacePolicy::Never,
            description: "",
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, Shape::Scalar, ValueType::String)
    }

    pub fn int(name: &'static str) -> Self {
        Self::new(name, Shape::Scalar, ValueType::Int)
    }

    pub fn bool(name: &'static str) -> Self {
        Self::new(name, Shape::Scalar, ValueType::Bool)
    }

    pub fn int_list(name: &'static str) -> Self {
        Self::new(name, Shape::ListOfScalar, ValueType::Int)
    }

    pub fn object(name: &'static str, nested: AttributeSchema) -> Self {
        let mut spec = Self::new(name, Shape::Object, ValueType::String);
        spec.nested = Some(nested);
        spec
    }

    pub fn list_of(name: &'static str, nested: AttributeSchema) -> Self {
        let mut spec = Self::new(name, Shape::ListOfObject, ValueType::String);
        spec.nested = Some(nested);
        spec
    }

    /// Server-assigned identifier: computed, never sent
    pub fn id() -> Self {
        Self::string("id")
            .computed()
            .with_default(Value::String(String::new()))
            .describe("Unique identifier assigned by the remote API.")
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self.default = Some(Value::String(SENSITIVE_PLACEHOLDER.to_string()));
        self
    }

    pub fn wire(mut self, wire_name: &'static str) -> Self {
        self.wire_name = wire_name;
        self
    }

    pub fn flatten(mut self) -> Self {
        self.flatten = true;
        self
    }

    pub fn replace(mut self, policy: ReplacePolicy) -> Self {
        self.replace = policy;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// True when a sensitive value is only the placeholder (or unset)
    pub fn is_placeholder(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            other => self.default.as_ref() == Some(other),
        }
    }
}

/// Ordered set of attribute declarations
#[derive(Debug, Clone, Default)]
pub struct AttributeSchema {
    attributes: Vec<AttributeSpec>,
}

impl AttributeSchema {
    pub fn new(attributes: Vec<AttributeSpec>) -> Self {
        Self { attributes }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.attributes.iter()
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Resolve the spec for a dotted path such as `pool_definition.attributes[1].vm_gpu_field`
    pub fn lookup(&self, path: &AttributePath) -> Option<&AttributeSpec> {
        let mut schema = self;
        let mut found = None;
        for segment in &path.0 {
            match segment {
                PathSegment::Field(name) => {
                    let spec = schema.get(name)?;
                    found = Some(spec);
                    if let Some(nested) = &spec.nested {
                        schema = nested;
                    }
                },
                PathSegment::Index(_) => {},
            }
        }
        found
    }

    /// Check the structural invariants every schema must satisfy.
    ///
    /// Returns one message per violation; an empty list means well-formed.
    pub fn check(&self) -> Vec<String> {
        let mut problems = Vec::new();
        self.check_into(&AttributePath::root(), false, &mut problems);
        problems
    }

    fn check_into(&self, at: &AttributePath, in_list: bool, problems: &mut Vec<String>) {
        for spec in &self.attributes {
            let path = at.field(spec.name);
            match spec.shape {
                Shape::Object | Shape::ListOfObject => match &spec.nested {
                    Some(nested) => {
                        nested.check_into(&path, in_list || spec.shape == Shape::ListOfObject, problems)
                    },
                    None => problems.push(format!("{}: nested schema missing", path)),
                },
                Shape::Scalar | Shape::ListOfScalar => {
                    if spec.nested.is_some() {
                        problems.push(format!("{}: scalar with nested schema", path));
                    }
                    if !spec.required && spec.default.is_none() {
                        problems.push(format!("{}: optional attribute without default", path));
                    }
                },
            }
            if in_list && spec.required && spec.default.is_none() {
                problems.push(format!("{}: list element attribute is required", path));
            }
            if spec.flatten && spec.shape != Shape::Object {
                problems.push(format!("{}: only objects can be flattened", path));
            }
        }
    }
}

/// One step of an attribute path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Location of an attribute inside a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributePath(Vec<PathSegment>);

impl AttributePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn field(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Field(name.to_string()));
        Self(segments)
    }

    pub fn index(&self, idx: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(idx));
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Parse the dotted display form back into a path
    pub fn parse(text: &str) -> Self {
        let mut path = Self::root();
        for part in text.split('.').filter(|p| !p.is_empty()) {
            let (name, rest) = part.split_once('[').unwrap_or((part, ""));
            path = path.field(name);
            for idx in rest.split('[') {
                if let Ok(i) = idx.trim_end_matches(']').parse::<usize>() {
                    path = path.index(i);
                }
            }
        }
        path
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i == 0 => write!(f, "{}", name)?,
                PathSegment::Field(name) => write!(f, ".{}", name)?,
                PathSegment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_numeric_text_to_int() {
        assert_eq!(ValueType::Int.coerce(&json!("42")), Some(json!(42)));
        assert_eq!(ValueType::Int.coerce(&json!(7)), Some(json!(7)));
        assert_eq!(ValueType::Int.coerce(&json!("seven")), None);
        assert_eq!(ValueType::Int.coerce(&json!(1.5)), None);
    }

    #[test]
    fn test_coerce_number_to_string() {
        assert_eq!(ValueType::String.coerce(&json!(42)), Some(json!("42")));
        assert_eq!(ValueType::String.coerce(&json!([1])), None);
    }

    #[test]
    fn test_path_display_and_parse() {
        let path = AttributePath::root()
            .field("pool_definition")
            .field("attributes")
            .index(2)
            .field("vm_gpu_field");
        assert_eq!(path.to_string(), "pool_definition.attributes[2].vm_gpu_field");
        assert_eq!(AttributePath::parse(&path.to_string()), path);
    }

    #[test]
    fn test_check_flags_list_element_required() {
        let schema = AttributeSchema::new(vec![AttributeSpec::list_of(
            "rules",
            AttributeSchema::new(vec![AttributeSpec::string("match").required()]),
        )]);
        let problems = schema.check();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("rules.match"));
    }

    #[test]
    fn test_check_flags_missing_default() {
        let schema = AttributeSchema::new(vec![AttributeSpec::int("threshold")]);
        assert_eq!(schema.check().len(), 1);
    }

    #[test]
    fn test_lookup_through_list() {
        let schema = AttributeSchema::new(vec![AttributeSpec::list_of(
            "attributes",
            AttributeSchema::new(vec![AttributeSpec::string("vm_gpu_field")
                .with_default(json!(""))
                .replace(ReplacePolicy::Always)]),
        )]);
        let spec = schema
            .lookup(&AttributePath::parse("attributes[3].vm_gpu_field"))
            .unwrap();
        assert!(matches!(spec.replace, ReplacePolicy::Always));
    }
}
