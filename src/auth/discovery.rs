//! OAuth endpoint discovery
//!
//! Fetches the RFC 9728 protected resource metadata and the RFC 8414
//! authorization server metadata from the MCP server's well-known URIs.

use std::collections::HashMap;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use crate::Result;
use crate::error::Error;
use super::pkce::CODE_CHALLENGE_METHOD;

const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";
const AUTHORIZATION_SERVER_PATH: &str = "/.well-known/oauth-authorization-server";

/// Metadata describing the protected MCP resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The URI of the protected resource itself
    pub resource: String,

    /// Issuer URIs of the authorization servers protecting this resource
    #[serde(default)]
    pub authorization_servers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_methods_supported: Option<Vec<String>>,
}

/// Metadata describing the authorization server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    #[serde(default)]
    pub response_types_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl AuthorizationServerMetadata {
    /// Whether the server accepts S256 challenges
    ///
    /// Servers that don't advertise their methods are assumed to accept it.
    pub fn supports_s256(&self) -> bool {
        match &self.code_challenge_methods_supported {
            Some(methods) => methods.iter().any(|m| m == CODE_CHALLENGE_METHOD),
            None => true,
        }
    }
}

/// Join a path onto the server URL without doubling slashes
pub fn endpoint_url(server_url: &str, path: &str) -> String {
    format!("{}{}", server_url.trim_end_matches('/'), path)
}

/// Well-known URI of the protected resource metadata
pub fn protected_resource_url(server_url: &str) -> String {
    endpoint_url(server_url, PROTECTED_RESOURCE_PATH)
}

/// Well-known URI of the authorization server metadata
pub fn authorization_server_url(server_url: &str) -> String {
    endpoint_url(server_url, AUTHORIZATION_SERVER_PATH)
}

/// Fetch the protected resource metadata document
pub async fn fetch_protected_resource_metadata(
    http: &Client,
    server_url: &str,
) -> Result<ProtectedResourceMetadata> {
    let url = protected_resource_url(server_url);
    tracing::debug!("GET {}", url);

    let response = http.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Discovery(format!("Discovery failed: {}", status)));
    }

    Ok(response.json().await?)
}

/// Fetch the authorization server metadata document
pub async fn fetch_authorization_server_metadata(
    http: &Client,
    server_url: &str,
) -> Result<AuthorizationServerMetadata> {
    let url = authorization_server_url(server_url);
    tracing::debug!("GET {}", url);

    let response = http.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Discovery(format!("Auth server discovery failed: {}", status)));
    }

    let metadata: AuthorizationServerMetadata = response.json().await?;
    if !metadata.supports_s256() {
        tracing::warn!("Authorization server {} does not advertise S256 PKCE", metadata.issuer);
    }
    Ok(metadata)
}
