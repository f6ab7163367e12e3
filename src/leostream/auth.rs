//! Leostream Authentication
//!
//! Logs in with the configured API user and caches the session ID the broker
//! hands back. A rejected session is dropped and a fresh login performed.

use anyhow::{Context, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

use super::http::LeostreamHttpClient;
use crate::config::ConnectionSettings;

/// Login path, relative to the broker base URL
pub const LOGIN_PATH: &str = "rest/v6/session/login";

#[derive(Serialize)]
struct LoginRequest<'a> {
    user_login: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    sid: String,
}

/// Leostream session holder with session ID caching
#[derive(Clone)]
pub struct Session {
    http: LeostreamHttpClient,
    login_url: Url,
    username: String,
    password: String,
    sid_cache: Arc<RwLock<Option<String>>>,
}

impl Session {
    pub fn new(http: LeostreamHttpClient, base_url: &Url, settings: &ConnectionSettings) -> Result<Self> {
        let login_url = base_url
            .join(LOGIN_PATH)
            .context("Failed to build login URL")?;

        Ok(Self {
            http,
            login_url,
            username: settings.username.clone(),
            password: settings.password.clone(),
            sid_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Get a session ID for API calls, logging in if none is cached
    pub async fn sid(&self) -> Result<String> {
        {
            let cache = self.sid_cache.read().await;
            if let Some(sid) = cache.as_ref() {
                return Ok(sid.clone());
            }
        }

        let mut cache = self.sid_cache.write().await;
        // Another task may have logged in while we waited for the lock
        if let Some(sid) = cache.as_ref() {
            return Ok(sid.clone());
        }

        let sid = self.login().await?;
        *cache = Some(sid.clone());
        Ok(sid)
    }

    /// Drop the cached session and log in again
    pub async fn refresh(&self) -> Result<String> {
        {
            let mut cache = self.sid_cache.write().await;
            *cache = None;
        }

        self.sid().await
    }

    async fn login(&self) -> Result<String> {
        tracing::debug!("Logging in to Leostream as {}", self.username);

        let body = serde_json::to_value(LoginRequest {
            user_login: &self.username,
            password: &self.password,
        })?;

        let response = self
            .http
            .send(Method::POST, self.login_url.as_str(), None, Some(&body))
            .await
            .context("Leostream login failed")?;

        let login: LoginResponse =
            serde_json::from_value(response).context("Login response carries no session ID")?;

        tracing::debug!("New Leostream session cached");
        Ok(login.sid)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("login_url", &self.login_url.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
