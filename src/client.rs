//! McpClient - authenticated client for an MCP server
//!
//! Holds the HTTP client plus the per-flow secrets (PKCE verifier, state,
//! access token) and performs every call the OAuth walkthrough needs.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use crate::Result;
use crate::auth::{
    self, AccessToken, AuthorizationServerMetadata, PkcePair, ProtectedResourceMetadata,
};
use crate::config::Config;
use crate::error::Error;

/// Error body returned by `/mcp` when the user has no API key stored
const NO_API_KEY_ERROR: &str = "No API key configured";

/// `/health` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    #[serde(default)]
    pub auth_enabled: bool,
}

/// `/api/keys` request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreApiKeyRequest<'a> {
    api_key: &'a str,
    base_url: &'a str,
}

/// `/api/keys` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyMetadata {
    pub has_key: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Result of the JSON-RPC `initialize` call
#[derive(Debug, Clone, PartialEq)]
pub enum McpResponse {
    /// The server rejected the bearer token
    Unauthorized,
    /// The user has not stored an API key yet
    NoApiKey,
    /// Any other answer, with its status and body
    Body { status: u16, text: String },
}

/// Everything the caller needs to send the user to the authorization server
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub pkce: PkcePair,
}

/// Client for one OAuth flow against one MCP server
pub struct McpClient {
    config: Config,
    http: Client,
    access_token: Option<AccessToken>,
    code_verifier: Option<String>,
    state: Option<String>,
}

impl McpClient {
    pub fn new(config: Config) -> Self {
        Self::with_http_client(config, Client::new())
    }

    pub fn with_http_client(config: Config, http: Client) -> Self {
        Self {
            config,
            http,
            access_token: None,
            code_verifier: None,
            state: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn access_token(&self) -> Option<&AccessToken> {
        self.access_token.as_ref()
    }

    /// Exact comparison against the state sent with the authorization request
    pub fn verify_state(&self, received: &str) -> bool {
        self.state.as_deref() == Some(received)
    }

    fn url(&self, path: &str) -> String {
        auth::endpoint_url(&self.config.server_url, path)
    }

    /// Bearer value for authenticated calls, empty without a usable token
    fn bearer_token(&self) -> &str {
        match &self.access_token {
            Some(token) if token.is_expired() => {
                tracing::warn!("Access token expired, sending an empty bearer");
                ""
            }
            Some(token) => &token.access_token,
            None => "",
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.bearer_token())
    }

    /// Check that the server is up and whether it enforces auth
    pub async fn health_check(&self) -> Result<HealthStatus> {
        let url = self.url("/health");
        tracing::debug!("GET {}", url);

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::status("Server not responding", response.status()));
        }
        Ok(response.json().await?)
    }

    /// Step 1: discover the protected resource metadata
    pub async fn discover_endpoints(&self) -> Result<ProtectedResourceMetadata> {
        auth::fetch_protected_resource_metadata(&self.http, &self.config.server_url).await
    }

    /// Step 2: fetch the authorization server metadata
    pub async fn get_auth_server_metadata(&self) -> Result<AuthorizationServerMetadata> {
        auth::fetch_authorization_server_metadata(&self.http, &self.config.server_url).await
    }

    /// Step 3: start an authorization attempt
    ///
    /// Every call produces a fresh verifier and state, replacing any earlier ones.
    pub fn start_auth_flow(
        &mut self,
        metadata: &AuthorizationServerMetadata,
    ) -> Result<AuthorizationRequest> {
        let redirect_uri = self.config.redirect_uri();
        self.start_auth_flow_with_redirect(metadata, &redirect_uri)
    }

    /// Like [`McpClient::start_auth_flow`] with an explicit redirect URI
    pub fn start_auth_flow_with_redirect(
        &mut self,
        metadata: &AuthorizationServerMetadata,
        redirect_uri: &str,
    ) -> Result<AuthorizationRequest> {
        let pkce = auth::generate_pkce();
        let state = auth::generate_state();

        let url = auth::build_authorization_url(
            &metadata.authorization_endpoint,
            &self.config.client_id,
            redirect_uri,
            &self.config.scope(),
            &pkce.challenge,
            &state,
        )?;

        self.code_verifier = Some(pkce.verifier.clone());
        self.state = Some(state.clone());
        tracing::info!("Authorization flow started against {}", metadata.issuer);

        Ok(AuthorizationRequest { url, state, pkce })
    }

    /// Pretend the user authorized and the code was exchanged
    pub fn simulate_callback(&mut self) -> String {
        let token = auth::mock_access_token();
        self.access_token = Some(AccessToken::bearer(token.clone()));
        token
    }

    /// Exchange the received code for an access token
    pub async fn exchange_code(
        &mut self,
        metadata: &AuthorizationServerMetadata,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AccessToken> {
        let verifier = self
            .code_verifier
            .as_deref()
            .ok_or_else(|| Error::OAuth("no PKCE verifier; start the authorization flow first".to_string()))?;

        let token = auth::exchange_code(
            &self.http,
            &metadata.token_endpoint,
            &self.config.client_id,
            redirect_uri,
            code,
            verifier,
        )
        .await?;

        // a verifier is good for a single exchange
        self.code_verifier = None;
        self.access_token = Some(token.clone());
        Ok(token)
    }

    /// Step 4: store the user's API key
    ///
    /// Returns `false` when the server rejects the bearer token.
    pub async fn store_api_key(&self, api_key: &str, base_url: &str) -> Result<bool> {
        let url = self.url("/api/keys");
        tracing::debug!("POST {}", url);

        let body = StoreApiKeyRequest { api_key, base_url };
        let response = self.authorized(self.http.post(&url)).json(&body).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(Error::status("Failed to store API key", status)),
        }
    }

    /// Step 5: fetch metadata about the stored API key
    pub async fn get_api_key_metadata(&self) -> Result<Option<ApiKeyMetadata>> {
        let url = self.url("/api/keys");
        tracing::debug!("GET {}", url);

        let response = self.authorized(self.http.get(&url)).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(Error::status("Failed to get metadata", status)),
        }
    }

    /// Step 6: send an authenticated JSON-RPC `initialize`
    ///
    /// 401 and the "No API key configured" 400 are reported as their own outcomes.
    pub async fn make_mcp_request(&self) -> Result<McpResponse> {
        let url = self.url("/mcp");
        tracing::debug!("POST {}", url);

        let body = json!({
            "jsonrpc": "2.0",
            "method": "initialize",
            "params": {},
            "id": 1
        });
        let response = self.authorized(self.http.post(&url)).json(&body).send().await?;
        read_mcp_response(response).await
    }
}

async fn read_mcp_response(response: Response) -> Result<McpResponse> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Ok(McpResponse::Unauthorized);
    }

    let text = response.text().await?;
    if status == StatusCode::BAD_REQUEST {
        if let Ok(body) = serde_json::from_str::<ErrorBody>(&text) {
            if body.error.as_deref() == Some(NO_API_KEY_ERROR) {
                return Ok(McpResponse::NoApiKey);
            }
        }
    }

    tracing::info!("MCP response status: {}", status);
    Ok(McpResponse::Body {
        status: status.as_u16(),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard) -> McpClient {
        let config = Config {
            server_url: server.url(),
            ..Config::default()
        };
        McpClient::new(config)
    }

    fn metadata(base: &str) -> AuthorizationServerMetadata {
        serde_json::from_value(json!({
            "issuer": base,
            "authorization_endpoint": format!("{}/authorize", base),
            "token_endpoint": format!("{}/token", base),
            "response_types_supported": ["code"],
            "code_challenge_methods_supported": ["S256"]
        }))
        .unwrap()
    }

    #[test]
    fn test_start_auth_flow_stores_fresh_secrets() {
        let mut client = McpClient::new(Config::default());
        let meta = metadata("https://auth.example.com");

        let first = client.start_auth_flow(&meta).unwrap();
        assert!(first.pkce.is_consistent());
        assert!(client.verify_state(&first.state));
        assert!(first.url.starts_with("https://auth.example.com/authorize?response_type=code"));
        assert!(first.url.contains(&format!("code_challenge={}", first.pkce.challenge)));
        assert!(first.url.contains(&format!("state={}", first.state)));

        let second = client.start_auth_flow(&meta).unwrap();
        assert_ne!(first.state, second.state);
        assert_ne!(first.pkce.verifier, second.pkce.verifier);
        assert!(!client.verify_state(&first.state));
        assert!(client.verify_state(&second.state));
    }

    #[test]
    fn test_verify_state_without_flow() {
        let client = McpClient::new(Config::default());
        assert!(!client.verify_state(""));
    }

    #[test]
    fn test_simulate_callback_sets_token() {
        let mut client = McpClient::new(Config::default());
        let token = client.simulate_callback();
        assert!(token.starts_with("mock_access_token_"));
        assert_eq!(client.access_token().unwrap().access_token, token);
    }

    #[test]
    fn test_expired_token_is_not_sent() {
        let mut client = McpClient::new(Config::default());
        assert_eq!(client.bearer_token(), "");

        let mut token = AccessToken::bearer("live-token");
        client.access_token = Some(token.clone());
        assert_eq!(client.bearer_token(), "live-token");

        token.expires_at = Some(chrono::Utc::now() - chrono::Duration::minutes(1));
        client.access_token = Some(token);
        assert_eq!(client.bearer_token(), "");
    }

    #[tokio::test]
    async fn test_health_check() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"ok","authEnabled":true}"#)
            .create_async()
            .await;

        let health = client_for(&server).health_check().await.unwrap();
        assert!(health.auth_enabled);
    }

    #[tokio::test]
    async fn test_health_check_failure() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/health").with_status(500).create_async().await;

        let err = client_for(&server).health_check().await.unwrap_err();
        assert!(matches!(err, Error::Status { .. }));
    }

    #[tokio::test]
    async fn test_store_api_key_sends_bearer_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mut client = client_for(&server);
        let token = client.simulate_callback();

        let _m = server
            .mock("POST", "/api/keys")
            .match_header("authorization", format!("Bearer {}", token).as_str())
            .match_body(Matcher::Json(json!({
                "apiKey": "demo-key",
                "baseUrl": "https://api.twenty.com"
            })))
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;

        assert!(client.store_api_key("demo-key", "https://api.twenty.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_api_key_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("POST", "/api/keys").with_status(401).create_async().await;

        let mut client = client_for(&server);
        client.simulate_callback();
        assert!(!client.store_api_key("k", "https://api.twenty.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_api_key_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("POST", "/api/keys").with_status(500).create_async().await;

        let err = client_for(&server)
            .store_api_key("k", "https://api.twenty.com")
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to store API key"));
    }

    #[tokio::test]
    async fn test_get_api_key_metadata() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/keys")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"hasKey":true,"baseUrl":"https://api.twenty.com","updatedAt":"2024-01-01T00:00:00Z"}"#)
            .create_async()
            .await;

        let meta = client_for(&server).get_api_key_metadata().await.unwrap().unwrap();
        assert!(meta.has_key);
        assert_eq!(meta.base_url.as_deref(), Some("https://api.twenty.com"));
        assert_eq!(meta.updated_at.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_get_api_key_metadata_without_key() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/keys")
            .with_status(200)
            .with_body(r#"{"hasKey":false}"#)
            .create_async()
            .await;

        let meta = client_for(&server).get_api_key_metadata().await.unwrap().unwrap();
        assert!(!meta.has_key);
        assert!(meta.base_url.is_none());
    }

    #[tokio::test]
    async fn test_get_api_key_metadata_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/api/keys").with_status(401).create_async().await;

        assert!(client_for(&server).get_api_key_metadata().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mcp_request_sends_initialize() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/mcp")
            .match_body(Matcher::Json(json!({
                "jsonrpc": "2.0",
                "method": "initialize",
                "params": {},
                "id": 1
            })))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#)
            .create_async()
            .await;

        match client_for(&server).make_mcp_request().await.unwrap() {
            McpResponse::Body { status, text } => {
                assert_eq!(status, 200);
                assert!(text.contains("\"result\""));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mcp_request_without_api_key() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/mcp")
            .with_status(400)
            .with_body(r#"{"error":"No API key configured"}"#)
            .create_async()
            .await;

        assert_eq!(client_for(&server).make_mcp_request().await.unwrap(), McpResponse::NoApiKey);
    }

    #[tokio::test]
    async fn test_mcp_request_other_bad_request_is_returned() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/mcp")
            .with_status(400)
            .with_body(r#"{"error":"Bad payload"}"#)
            .create_async()
            .await;

        match client_for(&server).make_mcp_request().await.unwrap() {
            McpResponse::Body { status, text } => {
                assert_eq!(status, 400);
                assert!(text.contains("Bad payload"));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mcp_request_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("POST", "/mcp").with_status(401).create_async().await;

        assert_eq!(client_for(&server).make_mcp_request().await.unwrap(), McpResponse::Unauthorized);
    }

    #[tokio::test]
    async fn test_exchange_code_requires_flow() {
        let mut client = McpClient::new(Config::default());
        let err = client
            .exchange_code(&metadata("https://auth.example.com"), "code", "http://localhost:8080/callback")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OAuth(_)));
    }

    #[tokio::test]
    async fn test_exchange_code_uses_flow_verifier() {
        let mut server = mockito::Server::new_async().await;
        let mut client = client_for(&server);
        let meta = metadata(&server.url());
        let request = client.start_auth_flow(&meta).unwrap();

        let _m = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("code_verifier".into(), request.pkce.verifier.clone()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"issued","token_type":"Bearer"}"#)
            .create_async()
            .await;

        let token = client
            .exchange_code(&meta, "code", "http://localhost:8080/callback")
            .await
            .unwrap();
        assert_eq!(token.access_token, "issued");
        assert_eq!(client.access_token().unwrap().access_token, "issued");

        // the verifier is consumed
        let again = client.exchange_code(&meta, "code", "http://localhost:8080/callback").await;
        assert!(again.is_err());
    }
}
