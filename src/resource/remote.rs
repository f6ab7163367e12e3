//! Remote-client collaborator boundary
//!
//! The engine never talks HTTP itself. Anything that can create, fetch,
//! update, delete and enumerate records per [`ResourceKind`] can back a
//! [`Reconciler`](super::Reconciler). Retries, timeouts and authentication
//! belong to the implementation.

use async_trait::async_trait;
use serde_json::Value;

use super::kinds::ResourceKind;
use crate::error::RemoteError;

#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Create a record and return it as stored (including its new ID)
    async fn create(&self, kind: ResourceKind, payload: &Value) -> Result<Value, RemoteError>;

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Value, RemoteError>;

    /// Apply a payload to an existing record and return the stored result
    async fn update(&self, kind: ResourceKind, id: &str, payload: &Value) -> Result<Value, RemoteError>;

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), RemoteError>;

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Value>, RemoteError>;
}

