//! Configuration Management
//!
//! Loads the leosync configuration file: connection settings
//! for the Leostream broker and the bootstrap constants baked into the pool
//! schemas.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Environment variables consulted for connection settings
pub const ENV_HOST: &str = "leostream_HOST";
pub const ENV_USERNAME: &str = "leostream_USERNAME";
pub const ENV_PASSWORD: &str = "leostream_PASSWORD";

/// Process-wide defaults injected into pool schemas at definition time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bootstrap {
    /// Default restrict-by mode for new pools
    pub restrict_by: String,
    /// Default join mode for pool attributes (A = and, O = or)
    pub pool_attribute_join: String,
    /// Seed list of server identifiers for new pools
    pub server_ids: Vec<i64>,
    pub provision_on_off: i64,
    pub provision_max: i64,
    pub provision_vm_id: i64,
    pub provision_server_id: i64,
    pub provision_threshold: i64,
    pub provision_tenant_id: i64,
    pub provision_limits_enforce: i64,
    pub mark_deletable: i64,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self {
            restrict_by: "C".to_string(),
            pool_attribute_join: "A".to_string(),
            server_ids: Vec::new(),
            provision_on_off: 0,
            provision_max: 0,
            provision_vm_id: 0,
            provision_server_id: 0,
            provision_threshold: 0,
            provision_tenant_id: 0,
            provision_limits_enforce: 0,
            mark_deletable: 0,
        }
    }
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Broker host or base URL
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Stored password; prefer the environment
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub bootstrap: Bootstrap,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("leosync").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Resolve connection settings (CLI > environment > config file)
    pub fn connection(&self, overrides: &ConnectionOverrides) -> Result<ConnectionSettings> {
        let host = pick(&overrides.host, ENV_HOST, &self.host);
        let username = pick(&overrides.username, ENV_USERNAME, &self.username);
        let password = pick(&overrides.password, ENV_PASSWORD, &self.password);

        let Some(host) = host else {
            bail!("Missing Leostream API host: set --host, {} or the config file", ENV_HOST);
        };
        let Some(username) = username else {
            bail!("Missing Leostream API username: set --username, {} or the config file", ENV_USERNAME);
        };
        let Some(password) = password else {
            bail!("Missing Leostream API password: set --password or {}", ENV_PASSWORD);
        };

        Ok(ConnectionSettings {
            base_url: base_url(&host)?,
            username,
            password,
        })
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Fully resolved settings for talking to a broker
#[derive(Clone)]
pub struct ConnectionSettings {
    pub base_url: Url,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// First non-blank value of CLI, environment and config file, in that order
fn pick(cli: &Option<String>, env_key: &str, file: &Option<String>) -> Option<String> {
    cli.clone()
        .filter(|v| nonblank(v))
        .or_else(|| std::env::var(env_key).ok().filter(|v| nonblank(v)))
        .or_else(|| file.clone().filter(|v| nonblank(v)))
}

fn nonblank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Normalize a host ("broker.example.com" or a full URL) into a base URL
pub fn base_url(host: &str) -> Result<Url> {
    let host = host.trim().trim_end_matches('/');
    let candidate = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };
    let url = Url::parse(&candidate).with_context(|| format!("Invalid Leostream host: {}", host))?;
    if url.host_str().is_none() {
        bail!("Leostream host has no hostname: {}", host);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_adds_scheme() {
        let url = base_url("broker.example.com").unwrap();
        assert_eq!(url.as_str(), "https://broker.example.com/");
    }

    #[test]
    fn test_base_url_keeps_explicit_scheme() {
        let url = base_url("http://127.0.0.1:8080/").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_bootstrap_partial_config() {
        let config: Config =
            serde_json::from_str(r#"{"host": "b", "bootstrap": {"server_ids": [5, 6]}}"#).unwrap();
        assert_eq!(config.bootstrap.server_ids, vec![5, 6]);
        assert_eq!(config.bootstrap.restrict_by, "C");
        assert_eq!(config.bootstrap.pool_attribute_join, "A");
    }

    #[test]
    fn test_cli_override_wins() {
        let config = Config {
            host: Some("file-host".to_string()),
            username: Some("file-user".to_string()),
            password: Some("file-pass".to_string()),
            bootstrap: Bootstrap::default(),
        };
        let overrides = ConnectionOverrides {
            host: Some("cli-host".to_string()),
            username: Some("cli-user".to_string()),
            password: Some("cli-pass".to_string()),
        };
        let settings = config.connection(&overrides).unwrap();
        assert_eq!(settings.base_url.host_str(), Some("cli-host"));
        assert_eq!(settings.username, "cli-user");
        assert!(!format!("{:?}", settings).contains("cli-pass"));
    }

    #[test]
    fn test_blank_sources_fall_through() {
        let file = Some("file-host".to_string());
        std::env::set_var("leosync_TEST_BLANK", "");
        assert_eq!(
            pick(&Some("  ".to_string()), "leosync_TEST_BLANK", &file),
            Some("file-host".to_string())
        );
        std::env::set_var("leosync_TEST_SET", "env-host");
        assert_eq!(
            pick(&None, "leosync_TEST_SET", &file),
            Some("env-host".to_string())
        );
        assert_eq!(pick(&None, "leosync_TEST_UNSET", &Some(String::new())), None);
    }

    #[test]
    fn test_empty_env_host_does_not_shadow_config_file() {
        std::env::set_var(ENV_HOST, "");
        let config = Config {
            host: Some("file-host".to_string()),
            username: Some("file-user".to_string()),
            password: Some("file-pass".to_string()),
            bootstrap: Bootstrap::default(),
        };
        let settings = config.connection(&ConnectionOverrides::default()).unwrap();
        assert_eq!(settings.base_url.host_str(), Some("file-host"));
    }
}
