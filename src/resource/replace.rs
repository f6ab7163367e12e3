//! Replace Policy Evaluator
//!
//! Walks two schema-complete documents side by side and reports every changed
//! attribute path together with whether the change forces replacement. Each
//! list element is evaluated against the element schema, not the list.

use serde_json::Value;

use super::defaults::materialize_defaults;
use super::schema::{AttributePath, AttributeSchema, AttributeSpec, ReplacePolicy, Shape};

/// A single changed attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub path: AttributePath,
    pub old: Value,
    pub new: Value,
    pub requires_replace: bool,
}

/// Decide whether changing `old` to `new` at `path` forces replacement
pub fn requires_replace(path: &AttributePath, old: &Value, new: &Value, spec: &AttributeSpec) -> bool {
    if old == new {
        return false;
    }
    let replace = match spec.replace {
        ReplacePolicy::Never => false,
        ReplacePolicy::Always => true,
        ReplacePolicy::When(predicate) => predicate(old, new),
    };
    if replace {
        tracing::debug!(path = %path, "change requires replacement");
    }
    replace
}

/// GPU matching predicate: an empty field and an unset one are the same
/// match; anything else that differs needs a new pool.
pub fn gpu_match_changed(old: &Value, new: &Value) -> bool {
    fn normalized(value: &Value) -> &str {
        value.as_str().unwrap_or_default().trim()
    }
    normalized(old) != normalized(new)
}

/// Diff the current state against the completed desired document
pub fn diff(schema: &AttributeSchema, current: &Value, desired: &Value) -> Vec<Change> {
    let mut changes = Vec::new();
    diff_object(schema, current, desired, &AttributePath::root(), &mut changes);
    changes
}

fn diff_object(
    schema: &AttributeSchema,
    current: &Value,
    desired: &Value,
    at: &AttributePath,
    changes: &mut Vec<Change>,
) {
    for spec in schema.iter() {
        if spec.computed {
            continue;
        }
        let path = at.field(spec.name);
        let old = current.get(spec.name).unwrap_or(&Value::Null);
        let new = desired.get(spec.name).unwrap_or(&Value::Null);

        // An unset secret means "keep whatever the remote has"
        if spec.sensitive && spec.is_placeholder(new) {
            continue;
        }

        match (spec.shape, &spec.nested) {
            (Shape::Object, Some(nested)) => diff_object(nested, old, new, &path, changes),
            (Shape::ListOfObject, Some(nested)) => diff_list(spec, nested, old, new, &path, changes),
            _ => record(spec, &path, old, new, changes),
        }
    }
}

fn diff_list(
    spec: &AttributeSpec,
    nested: &AttributeSchema,
    old: &Value,
    new: &Value,
    path: &AttributePath,
    changes: &mut Vec<Change>,
) {
    let old_items = old.as_array().map(Vec::as_slice).unwrap_or_default();
    let new_items = new.as_array().map(Vec::as_slice).unwrap_or_default();

    if old_items.len() != new_items.len() {
        record(
            spec,
            path,
            &Value::from(old_items.len()),
            &Value::from(new_items.len()),
            changes,
        );
    }

    // Added or removed elements are compared against an all-defaults element
    let blank = materialize_defaults(nested);
    for i in 0..old_items.len().max(new_items.len()) {
        let before = old_items.get(i).unwrap_or(&blank);
        let after = new_items.get(i).unwrap_or(&blank);
        diff_object(nested, before, after, &path.index(i), changes);
    }
}

fn record(spec: &AttributeSpec, path: &AttributePath, old: &Value, new: &Value, changes: &mut Vec<Change>) {
    if old == new {
        return;
    }
    changes.push(Change {
        path: path.clone(),
        old: old.clone(),
        new: new.clone(),
        requires_replace: requires_replace(path, old, new, spec),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> AttributeSchema {
        AttributeSchema::new(vec![
            AttributeSpec::id(),
            AttributeSpec::string("notes").with_default(json!("")),
            AttributeSpec::string("type")
                .with_default(json!("amazon"))
                .replace(ReplacePolicy::Always),
            AttributeSpec::string("password").sensitive(),
            AttributeSpec::list_of(
                "attributes",
                AttributeSchema::new(vec![
                    AttributeSpec::string("vm_table_field").with_default(json!("")),
                    AttributeSpec::string("vm_gpu_field")
                        .with_default(json!(""))
                        .replace(ReplacePolicy::When(gpu_match_changed)),
                ]),
            ),
        ])
    }

    fn base() -> Value {
        json!({
            "id": "1",
            "notes": "",
            "type": "amazon",
            "password": "real",
            "attributes": [
                {"vm_table_field": "name", "vm_gpu_field": ""},
                {"vm_table_field": "", "vm_gpu_field": "nvidia"}
            ]
        })
    }

    #[test]
    fn test_identical_documents_have_no_changes() {
        assert!(diff(&schema(), &base(), &base()).is_empty());
    }

    #[test]
    fn test_notes_change_updates_in_place() {
        let mut desired = base();
        desired["notes"] = json!("moved to rack 4");
        let changes = diff(&schema(), &base(), &desired);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path.to_string(), "notes");
        assert!(!changes[0].requires_replace);
    }

    #[test]
    fn test_gpu_change_in_second_element_requires_replace() {
        let mut desired = base();
        desired["attributes"][1]["vm_gpu_field"] = json!("amd");
        let changes = diff(&schema(), &base(), &desired);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path.to_string(), "attributes[1].vm_gpu_field");
        assert!(changes[0].requires_replace);
    }

    #[test]
    fn test_sibling_field_in_element_never_replaces() {
        let mut desired = base();
        desired["attributes"][1]["vm_table_field"] = json!("ip");
        let changes = diff(&schema(), &base(), &desired);
        assert!(changes.iter().all(|c| !c.requires_replace));
    }

    #[test]
    fn test_appended_element_with_gpu_requires_replace() {
        let mut desired = base();
        desired["attributes"]
            .as_array_mut()
            .unwrap()
            .push(json!({"vm_table_field": "", "vm_gpu_field": "nvidia"}));
        let changes = diff(&schema(), &base(), &desired);
        assert!(changes.iter().any(|c| c.path.to_string() == "attributes"));
        assert!(changes
            .iter()
            .any(|c| c.path.to_string() == "attributes[2].vm_gpu_field" && c.requires_replace));
    }

    #[test]
    fn test_placeholder_secret_is_not_a_change() {
        let mut desired = base();
        desired["password"] = json!(crate::resource::schema::SENSITIVE_PLACEHOLDER);
        assert!(diff(&schema(), &base(), &desired).is_empty());
    }

    #[test]
    fn test_unconditional_trigger() {
        let mut desired = base();
        desired["type"] = json!("azure");
        let changes = diff(&schema(), &base(), &desired);
        assert!(changes[0].requires_replace);
    }

    #[test]
    fn test_gpu_predicate_treats_unset_as_empty() {
        assert!(!gpu_match_changed(&json!(""), &Value::Null));
        assert!(gpu_match_changed(&json!("nvidia"), &json!("")));
    }
}
