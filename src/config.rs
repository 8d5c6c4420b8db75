//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;
use crate::Result;
use crate::error::Error;
use crate::auth::{redirect_uri, DEFAULT_CALLBACK_PORT};

/// Environment variable overriding the MCP server URL
pub const SERVER_URL_ENV: &str = "MCP_SERVER_URL";

/// Environment variable overriding the OAuth client id
pub const CLIENT_ID_ENV: &str = "MCP_CLIENT_ID";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the MCP server
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// OAuth client id registered with the authorization server
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Local port for the OAuth redirect
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,

    /// Scopes requested during authorization
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Base URL stored alongside the API key
    #[serde(default = "default_api_key_base_url")]
    pub api_key_base_url: String,
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_client_id() -> String {
    "YOUR_CLIENT_ID".to_string()
}

fn default_callback_port() -> u16 {
    DEFAULT_CALLBACK_PORT
}

fn default_scopes() -> Vec<String> {
    vec!["twenty:read".to_string(), "twenty:write".to_string()]
}

fn default_api_key_base_url() -> String {
    "https://api.twenty.com".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            client_id: default_client_id(),
            callback_port: default_callback_port(),
            scopes: default_scopes(),
            api_key_base_url: default_api_key_base_url(),
        }
    }
}

impl Config {
    /// Space-separated scope parameter
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    /// Redirect URI for the configured callback port
    pub fn redirect_uri(&self) -> String {
        redirect_uri(self.callback_port)
    }

    /// Reject values the flow cannot work with
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.server_url)
            .map_err(|e| Error::Config(format!("Invalid server URL {:?}: {}", self.server_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!("Unsupported server URL scheme: {}", url.scheme())));
        }
        if self.scopes.is_empty() {
            return Err(Error::Config("At least one scope is required".to_string()));
        }
        Ok(())
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(SERVER_URL_ENV).filter(|v| !v.is_empty()) {
            self.server_url = url;
        }
        if let Some(id) = lookup(CLIENT_ID_ENV).filter(|v| !v.is_empty()) {
            self.client_id = id;
        }
        self
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-oauth")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from a file, falling back to defaults when it is absent
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!("No config at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Load configuration from the default location plus environment overrides
pub fn load() -> Result<Config> {
    let config = load_from(&config_path())?;
    Ok(config.with_overrides(|key| std::env::var(key).ok()))
}

/// Save configuration to a file
pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
