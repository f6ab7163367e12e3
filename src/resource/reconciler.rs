//! Reconciler - lifecycle orchestration for one resource kind
//!
//! One generic [`Reconciler`] serves every kind: it is parameterized by a
//! [`ResourceDef`] (schema plus the two translation steps) and receives its
//! remote client explicitly. Transformations are pure; the only side effects
//! are the remote-client calls.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use super::defaults::fill_defaults;
use super::kinds::{ResourceDef, ResourceKind};
use super::remote::RemoteClient;
use super::replace::{diff, Change};
use super::schema::{AttributeSchema, Shape};
use super::translate::{redact, Mode};
use crate::error::{Error, Operation, RemoteError, Result};

/// Lifecycle phase of a single resource instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Absent,
    Creating,
    Present,
    Updating,
    Deleting,
    Gone,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Absent => "absent",
            Phase::Creating => "creating",
            Phase::Present => "present",
            Phase::Updating => "updating",
            Phase::Deleting => "deleting",
            Phase::Gone => "gone",
        };
        f.write_str(name)
    }
}

/// A resource instance as tracked by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    id: Option<String>,
    phase: Phase,
    state: Option<Value>,
}

impl Instance {
    /// Instance that does not exist remotely yet
    pub fn absent() -> Self {
        Self {
            id: None,
            phase: Phase::Absent,
            state: None,
        }
    }

    /// Known remote object, optionally with its last reconciled state
    pub fn present(id: impl Into<String>, state: Option<Value>) -> Self {
        Self {
            id: Some(id.into()),
            phase: Phase::Present,
            state,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> Option<&Value> {
        self.state.as_ref()
    }

    pub fn into_state(self) -> Option<Value> {
        self.state
    }
}

/// Result of a read
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Present(Value),
    /// Deleted out of band; the caller should drop it and create again
    Gone,
}

/// Result of an update
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(Value),
    /// At least one changed attribute cannot be updated in place
    ReplaceRequired(Vec<Change>),
}

/// Lifecycle orchestrator for one resource kind
pub struct Reconciler<C: ?Sized> {
    client: Arc<C>,
    def: Arc<ResourceDef>,
}

impl<C: ?Sized> Clone for Reconciler<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            def: Arc::clone(&self.def),
        }
    }
}

impl<C: RemoteClient + ?Sized> Reconciler<C> {
    pub fn new(client: Arc<C>, def: Arc<ResourceDef>) -> Self {
        Self { client, def }
    }

    pub fn kind(&self) -> ResourceKind {
        self.def.kind
    }

    pub fn schema(&self) -> &AttributeSchema {
        &self.def.schema
    }

    /// Create the remote object described by `desired`.
    ///
    /// On success the instance is `Present` with its remote ID and state. On
    /// failure it is back to `Absent` and the error is returned as is.
    pub async fn create(&self, instance: &mut Instance, desired: &Value) -> Result<Value> {
        if !matches!(instance.phase, Phase::Absent | Phase::Gone) {
            return Err(self.invalid(Operation::Create, instance.phase));
        }
        instance.phase = Phase::Creating;

        let result = self.create_inner(desired).await;
        match result {
            Ok((id, state)) => {
                tracing::info!(kind = %self.kind(), id = %id, "created");
                instance.id = Some(id);
                instance.state = Some(state.clone());
                instance.phase = Phase::Present;
                Ok(state)
            },
            Err(e) => {
                instance.id = None;
                instance.state = None;
                instance.phase = Phase::Absent;
                Err(e)
            },
        }
    }

    async fn create_inner(&self, desired: &Value) -> Result<(String, Value)> {
        let completed = fill_defaults(desired, &self.def.schema)?;
        let payload = (self.def.translate)(desired, &self.def.schema, Mode::Create)?;
        tracing::debug!(
            kind = %self.kind(),
            payload = %redact(&payload, &self.def.schema),
            "create payload"
        );

        let record = self
            .client
            .create(self.kind(), &payload)
            .await
            .map_err(|e| self.remote(Operation::Create, e))?;

        let state = (self.def.materialize)(&record, &self.def.schema, Some(&completed))?;
        let id = state_id(&state)?;
        Ok((id, state))
    }

    /// Refresh an instance from the remote.
    ///
    /// An unknown ID is not an error: the instance moves to `Gone`.
    pub async fn read(&self, instance: &mut Instance) -> Result<ReadOutcome> {
        let id = self.require_present(instance, Operation::Read)?;

        match self.client.get(self.kind(), &id).await {
            Ok(record) => {
                let state = (self.def.materialize)(&record, &self.def.schema, instance.state.as_ref())?;
                instance.state = Some(state.clone());
                Ok(ReadOutcome::Present(state))
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!(kind = %self.kind(), id = %id, "remote object is gone");
                instance.phase = Phase::Gone;
                instance.state = None;
                Ok(ReadOutcome::Gone)
            },
            Err(e) => Err(self.remote(Operation::Read, e)),
        }
    }

    /// Apply `desired` to an existing instance.
    ///
    /// Without a known current state the instance is read first. If any changed attribute
    /// is replace-triggering nothing is sent and the changes are returned;
    /// sequencing delete-then-create is up to the caller.
    pub async fn update(&self, instance: &mut Instance, desired: &Value) -> Result<UpdateOutcome> {
        let id = self.require_present(instance, Operation::Update)?;
        let current = match instance.state.clone() {
            Some(state) => state,
            None => match self.read(instance).await? {
                ReadOutcome::Present(state) => state,
                ReadOutcome::Gone => {
                    return Err(self.remote(Operation::Update, RemoteError::NotFound { id }));
                },
            },
        };

        let completed = fill_defaults(desired, &self.def.schema)?;
        let changes = diff(&self.def.schema, &current, &completed);
        if changes.iter().any(|c| c.requires_replace) {
            let paths: Vec<String> = changes
                .iter()
                .filter(|c| c.requires_replace)
                .map(|c| c.path.to_string())
                .collect();
            tracing::warn!(kind = %self.kind(), id = %id, ?paths, "replacement required");
            return Ok(UpdateOutcome::ReplaceRequired(changes));
        }

        instance.phase = Phase::Updating;
        let result = self.update_inner(&id, desired, &completed, &current).await;
        instance.phase = Phase::Present;

        let state = result?;
        tracing::info!(kind = %self.kind(), id = %id, changed = changes.len(), "updated");
        instance.state = Some(state.clone());
        Ok(UpdateOutcome::Updated(state))
    }

    async fn update_inner(
        &self,
        id: &str,
        desired: &Value,
        completed: &Value,
        current: &Value,
    ) -> Result<Value> {
        let payload = (self.def.translate)(desired, &self.def.schema, Mode::Update)?;
        tracing::debug!(
            kind = %self.kind(),
            id = %id,
            payload = %redact(&payload, &self.def.schema),
            "update payload"
        );

        let record = self
            .client
            .update(self.kind(), id, &payload)
            .await
            .map_err(|e| self.remote(Operation::Update, e))?;

        let carry = carry_secrets(&self.def.schema, completed, current);
        (self.def.materialize)(&record, &self.def.schema, Some(&carry))
    }

    /// Delete an instance. An object the remote no longer knows counts as
    /// deleted.
    pub async fn delete(&self, instance: &mut Instance) -> Result<()> {
        let previous = instance.phase;
        if !matches!(previous, Phase::Present | Phase::Gone) {
            return Err(self.invalid(Operation::Delete, previous));
        }
        let Some(id) = instance.id.clone() else {
            instance.phase = Phase::Gone;
            return Ok(());
        };

        instance.phase = Phase::Deleting;
        match self.client.delete(self.kind(), &id).await {
            Ok(()) => {
                tracing::info!(kind = %self.kind(), id = %id, "deleted");
            },
            Err(e) if e.is_not_found() => {
                tracing::debug!(kind = %self.kind(), id = %id, "already gone");
            },
            Err(e) => {
                instance.phase = previous;
                return Err(self.remote(Operation::Delete, e));
            },
        }
        instance.phase = Phase::Gone;
        instance.state = None;
        Ok(())
    }

    /// Adopt an existing remote object by ID
    pub async fn import(&self, id: &str) -> Result<Instance> {
        let record = match self.client.get(self.kind(), id).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                return Err(Error::Import {
                    kind: self.kind().to_string(),
                    id: id.to_string(),
                });
            },
            Err(e) => return Err(self.remote(Operation::Import, e)),
        };
        let state = (self.def.materialize)(&record, &self.def.schema, None)?;
        tracing::info!(kind = %self.kind(), id = %id, "imported");
        Ok(Instance::present(state_id(&state)?, Some(state)))
    }

    /// Enumerate every remote object of this kind as summary records
    pub async fn list(&self) -> Result<Vec<Value>> {
        let records = self
            .client
            .list(self.kind())
            .await
            .map_err(|e| self.remote(Operation::List, e))?;
        tracing::debug!(kind = %self.kind(), count = records.len(), "listed");
        records
            .iter()
            .map(|record| (self.def.materialize)(record, &self.def.summary, None))
            .collect()
    }

    /// Read several independent instances concurrently
    pub async fn read_many(&self, ids: &[String]) -> Vec<(String, Result<ReadOutcome>)> {
        let reads = ids.iter().map(|id| async move {
            let mut instance = Instance::present(id.clone(), None);
            (id.clone(), self.read(&mut instance).await)
        });
        futures::future::join_all(reads).await
    }

    fn require_present(&self, instance: &Instance, operation: Operation) -> Result<String> {
        match (&instance.id, instance.phase) {
            (Some(id), Phase::Present) => Ok(id.clone()),
            (_, phase) => Err(self.invalid(operation, phase)),
        }
    }

    fn invalid(&self, operation: Operation, phase: Phase) -> Error {
        Error::InvalidTransition { operation, phase }
    }

    fn remote(&self, operation: Operation, source: RemoteError) -> Error {
        tracing::error!(kind = %self.kind(), %operation, "remote call failed: {}", source);
        Error::Remote {
            kind: self.kind().to_string(),
            operation,
            source,
        }
    }
}

/// Remote-assigned ID of a materialized state
fn state_id(state: &Value) -> Result<String> {
    match state.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(Error::mapping("id", "remote record has no identifier")),
    }
}

/// Build the document secrets are carried from after an update: a rotated
/// value from `desired`, otherwise whatever `current` held.
fn carry_secrets(schema: &AttributeSchema, desired: &Value, current: &Value) -> Value {
    let mut out = Map::new();
    for spec in schema.iter() {
        let wanted = desired.get(spec.name).unwrap_or(&Value::Null);
        let held = current.get(spec.name).unwrap_or(&Value::Null);
        let value = match (spec.shape, &spec.nested) {
            _ if spec.sensitive => {
                if spec.is_placeholder(wanted) {
                    held.clone()
                } else {
                    wanted.clone()
                }
            },
            (Shape::Object, Some(nested)) => carry_secrets(nested, wanted, held),
            (Shape::ListOfObject, Some(nested)) => {
                let items = wanted.as_array().map(Vec::as_slice).unwrap_or_default();
                let held_items = held.as_array();
                Value::Array(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| {
                            let before = held_items.and_then(|h| h.get(i)).unwrap_or(&Value::Null);
                            carry_secrets(nested, item, before)
                        })
                        .collect(),
                )
            },
            _ => continue,
        };
        out.insert(spec.name.to_string(), value);
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Bootstrap;
    use crate::resource::kinds::Schemas;
    use crate::resource::schema::SENSITIVE_PLACEHOLDER;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Remote that records calls and answers from a script
    #[derive(Default)]
    struct ScriptedRemote {
        calls: Mutex<Vec<String>>,
        record: Mutex<Option<Value>>,
        fail: bool,
    }

    impl ScriptedRemote {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn respond(&self, op: &str) -> std::result::Result<Value, RemoteError> {
            self.calls.lock().unwrap().push(op.to_string());
            if self.fail {
                return Err(RemoteError::Other(anyhow::anyhow!("API request failed: 500")));
            }
            self.record
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| RemoteError::NotFound { id: "7".to_string() })
        }
    }

    #[async_trait]
    impl RemoteClient for ScriptedRemote {
        async fn create(&self, _: ResourceKind, payload: &Value) -> std::result::Result<Value, RemoteError> {
            let mut record = payload.clone();
            record["id"] = json!(7);
            *self.record.lock().unwrap() = Some(record);
            self.respond("create")
        }

        async fn get(&self, _: ResourceKind, _: &str) -> std::result::Result<Value, RemoteError> {
            self.respond("get")
        }

        async fn update(&self, _: ResourceKind, _: &str, payload: &Value) -> std::result::Result<Value, RemoteError> {
            let mut record = payload.clone();
            record["id"] = json!(7);
            *self.record.lock().unwrap() = Some(record);
            self.respond("update")
        }

        async fn delete(&self, _: ResourceKind, _: &str) -> std::result::Result<(), RemoteError> {
            self.respond("delete").map(|_| ())
        }

        async fn list(&self, _: ResourceKind) -> std::result::Result<Vec<Value>, RemoteError> {
            self.respond("list").map(|r| vec![r])
        }
    }

    fn reconciler(remote: Arc<ScriptedRemote>, kind: ResourceKind) -> Reconciler<ScriptedRemote> {
        Reconciler::new(remote, Schemas::build(&Bootstrap::default()).get(kind))
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let remote = Arc::new(ScriptedRemote::default());
        let rec = reconciler(Arc::clone(&remote), ResourceKind::Gateway);
        let mut instance = Instance::absent();
        let state = rec.create(&mut instance, &json!({"name": "gw"})).await.unwrap();
        assert_eq!(instance.phase(), Phase::Present);
        assert_eq!(instance.id(), Some("7"));
        assert_eq!(state["name"], json!("gw"));
    }

    #[tokio::test]
    async fn test_failed_create_returns_to_absent() {
        let remote = Arc::new(ScriptedRemote {
            fail: true,
            ..Default::default()
        });
        let rec = reconciler(remote, ResourceKind::Gateway);
        let mut instance = Instance::absent();
        let err = rec.create(&mut instance, &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Remote { operation: Operation::Create, .. }));
        assert_eq!(instance.phase(), Phase::Absent);
        assert!(instance.id().is_none());
    }

    #[tokio::test]
    async fn test_validation_error_makes_no_remote_call() {
        let remote = Arc::new(ScriptedRemote::default());
        let rec = reconciler(Arc::clone(&remote), ResourceKind::Center);
        let mut instance = Instance::absent();
        let err = rec
            .create(&mut instance, &json!({"center_definition": {}}))
            .await
            .unwrap_err();
        assert_eq!(err.path(), Some("center_definition.name"));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_unknown_id_is_gone() {
        let remote = Arc::new(ScriptedRemote::default());
        let rec = reconciler(remote, ResourceKind::Pool);
        let mut instance = Instance::present("7", None);
        assert_eq!(rec.read(&mut instance).await.unwrap(), ReadOutcome::Gone);
        assert_eq!(instance.phase(), Phase::Gone);
    }

    #[tokio::test]
    async fn test_read_from_absent_is_invalid() {
        let rec = reconciler(Arc::new(ScriptedRemote::default()), ResourceKind::Pool);
        let err = rec.read(&mut Instance::absent()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { phase: Phase::Absent, .. }));
    }

    #[tokio::test]
    async fn test_replace_required_skips_remote() {
        let remote = Arc::new(ScriptedRemote::default());
        let rec = reconciler(Arc::clone(&remote), ResourceKind::Center);
        let mut instance = Instance::absent();
        let desired = json!({"center_definition": {"name": "aws", "vc_password": "s3cret"}});
        rec.create(&mut instance, &desired).await.unwrap();

        let changed = json!({"center_definition": {"name": "aws", "type": "azure"}});
        let outcome = rec.update(&mut instance, &changed).await.unwrap();
        let UpdateOutcome::ReplaceRequired(changes) = outcome else {
            panic!("expected replacement");
        };
        assert!(changes
            .iter()
            .any(|c| c.path.to_string() == "center_definition.type" && c.requires_replace));
        assert_eq!(remote.calls(), vec!["create"]);
        assert_eq!(instance.phase(), Phase::Present);
    }

    #[tokio::test]
    async fn test_update_keeps_secret_out_of_payload_and_state() {
        let remote = Arc::new(ScriptedRemote::default());
        let rec = reconciler(Arc::clone(&remote), ResourceKind::Center);
        let mut instance = Instance::absent();
        rec.create(
            &mut instance,
            &json!({"center_definition": {"name": "aws", "vc_password": "s3cret"}}),
        )
        .await
        .unwrap();

        let outcome = rec
            .update(
                &mut instance,
                &json!({"center_definition": {"name": "aws", "notes": "n", "vc_password": SENSITIVE_PLACEHOLDER}}),
            )
            .await
            .unwrap();
        let UpdateOutcome::Updated(state) = outcome else {
            panic!("expected in-place update");
        };
        let sent = remote.record.lock().unwrap().clone().unwrap();
        assert!(sent["center_definition"].get("vc_password").is_none());
        assert_eq!(state["center_definition"]["vc_password"], json!("s3cret"));
        assert_eq!(state["center_definition"]["notes"], json!("n"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let rec = reconciler(Arc::new(ScriptedRemote::default()), ResourceKind::Gateway);
        let mut instance = Instance::present("7", None);
        rec.delete(&mut instance).await.unwrap();
        assert_eq!(instance.phase(), Phase::Gone);
        rec.delete(&mut instance).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_phase() {
        let remote = Arc::new(ScriptedRemote {
            fail: true,
            ..Default::default()
        });
        let rec = reconciler(remote, ResourceKind::Gateway);
        let mut instance = Instance::present("7", None);
        let err = rec.delete(&mut instance).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(instance.phase(), Phase::Present);
    }

    #[tokio::test]
    async fn test_import_unknown_id() {
        let rec = reconciler(Arc::new(ScriptedRemote::default()), ResourceKind::Gateway);
        let err = rec.import("99").await.unwrap_err();
        assert!(matches!(err, Error::Import { ref id, .. } if id == "99"));
    }

    #[test]
    fn test_carry_secrets_prefers_rotated_value() {
        let schema = Schemas::build(&Bootstrap::default())
            .get(ResourceKind::Center)
            .schema
            .clone();
        let current = json!({"center_definition": {"vc_password": "old"}});
        let kept = carry_secrets(
            &schema,
            &json!({"center_definition": {"vc_password": SENSITIVE_PLACEHOLDER}}),
            &current,
        );
        assert_eq!(kept["center_definition"]["vc_password"], json!("old"));
        let rotated = carry_secrets(&schema, &json!({"center_definition": {"vc_password": "new"}}), &current);
        assert_eq!(rotated["center_definition"]["vc_password"], json!("new"));
    }
}
