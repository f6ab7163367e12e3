//! Leostream Client
//!
//! Main client for the Leostream REST API, combining session authentication
//! and HTTP functionality. Implements the engine's remote-client boundary.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use url::Url;

use super::auth::Session;
use super::http::{status_of, LeostreamHttpClient};
use crate::config::ConnectionSettings;
use crate::error::RemoteError;
use crate::resource::{RemoteClient, ResourceKind};

/// Main Leostream client
#[derive(Clone, Debug)]
pub struct LeostreamClient {
    session: Session,
    http: LeostreamHttpClient,
    base_url: Url,
}

impl LeostreamClient {
    /// Create a new client; no request is made until the first call
    pub fn new(settings: &ConnectionSettings) -> Result<Self> {
        let mut base_url = settings.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = LeostreamHttpClient::new()?;
        let session = Session::new(http.clone(), &base_url, settings)?;

        Ok(Self {
            session,
            http,
            base_url,
        })
    }

    /// Make an authenticated request, logging in again once if the session
    /// was rejected
    async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let sid = self.session.sid().await?;
        match self.http.send(method.clone(), url, Some(&sid), body).await {
            Err(e) if status_of(&e) == Some(StatusCode::UNAUTHORIZED) => {
                tracing::debug!("Session rejected, logging in again");
                let sid = self.session.refresh().await?;
                self.http.send(method, url, Some(&sid), body).await
            },
            other => other,
        }
    }

    /// Make a GET request to the Leostream API
    pub async fn get(&self, url: &str) -> Result<Value> {
        self.request(Method::GET, url, None).await
    }

    /// Make a POST request to the Leostream API
    pub async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, url, Some(body)).await
    }

    /// Make a PUT request to the Leostream API
    pub async fn put(&self, url: &str, body: &Value) -> Result<Value> {
        self.request(Method::PUT, url, Some(body)).await
    }

    /// Make a DELETE request to the Leostream API
    pub async fn delete(&self, url: &str) -> Result<Value> {
        self.request(Method::DELETE, url, None).await
    }

    // =========================================================================
    // Endpoint helpers
    // =========================================================================

    /// Build the collection URL for a kind (pool kinds share one endpoint)
    pub fn collection_url(&self, kind: ResourceKind) -> Result<String> {
        let path = match kind {
            ResourceKind::Gateway => "rest/v6/gateways",
            ResourceKind::Center => "rest/v6/centers",
            ResourceKind::Pool | ResourceKind::AwsPool => "rest/v6/pools",
        };
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("Failed to build {} URL", kind))?;
        Ok(url.into())
    }

    /// Build the URL of a single object
    pub fn item_url(&self, kind: ResourceKind, id: &str) -> Result<String> {
        Ok(format!(
            "{}/{}",
            self.collection_url(kind)?,
            urlencoding::encode(id)
        ))
    }
}

/// Identifier of a freshly stored object in a create response
fn stored_id(response: &Value) -> Option<String> {
    let id = response
        .pointer("/stored_data/id")
        .or_else(|| response.get("id"))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Classify a failed call: 404 means the remote does not know `id`
fn classify(error: anyhow::Error, id: &str) -> RemoteError {
    if status_of(&error) == Some(StatusCode::NOT_FOUND) {
        RemoteError::NotFound { id: id.to_string() }
    } else {
        RemoteError::Other(error)
    }
}

#[async_trait]
impl RemoteClient for LeostreamClient {
    async fn create(&self, kind: ResourceKind, payload: &Value) -> Result<Value, RemoteError> {
        let url = self.collection_url(kind)?;
        let response = self
            .post(&url, payload)
            .await
            .with_context(|| format!("Failed to create {}", kind))?;

        let id = stored_id(&response)
            .ok_or_else(|| anyhow!("Create {} response carries no stored ID", kind))?;
        tracing::debug!("Created {} {}", kind, id);

        RemoteClient::get(self, kind, &id).await
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Value, RemoteError> {
        let url = self.item_url(kind, id)?;
        LeostreamClient::get(self, &url)
            .await
            .map_err(|e| classify(e, id))
    }

    async fn update(&self, kind: ResourceKind, id: &str, payload: &Value) -> Result<Value, RemoteError> {
        let url = self.item_url(kind, id)?;
        self.put(&url, payload).await.map_err(|e| classify(e, id))?;
        RemoteClient::get(self, kind, id).await
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), RemoteError> {
        let url = self.item_url(kind, id)?;
        LeostreamClient::delete(self, &url)
            .await
            .map(|_| ())
            .map_err(|e| classify(e, id))
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Value>, RemoteError> {
        let url = self.collection_url(kind)?;
        let response = LeostreamClient::get(self, &url).await?;
        match response {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            _ => Err(anyhow!("List {} response is not an array", kind).into()),
        }
    }
}
