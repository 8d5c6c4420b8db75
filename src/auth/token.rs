//! Authorization code exchange
//!
//! Trades the code received on the callback for an access token at the
//! discovered token endpoint, proving possession of the PKCE verifier.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use crate::Result;
use crate::error::Error;
use super::pkce::random_hex;

/// Token endpoint response (RFC 6749 section 5.1)
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Token exchange request, sent form-encoded
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    code_verifier: &'a str,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// An access token held in memory for the lifetime of the flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Returned by some servers; never used since refresh is not supported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl AccessToken {
    /// Wrap a bare bearer token with no expiry
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            expires_at: None,
            refresh_token: None,
            scope: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => Utc::now() >= expires,
            None => false,
        }
    }

    /// Token shortened for display
    pub fn masked(&self) -> String {
        mask_token(&self.access_token)
    }
}

impl From<TokenResponse> for AccessToken {
    fn from(response: TokenResponse) -> Self {
        // out-of-range lifetimes are treated as no expiry
        let expires_at = response
            .expires_in
            .and_then(chrono::Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));

        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_at,
            refresh_token: response.refresh_token,
            scope: response.scope,
        }
    }
}

/// First 20 characters of a token followed by an ellipsis
pub fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(20).collect();
    format!("{}...", prefix)
}

/// Stand-in token used when the authorization step is simulated
pub fn mock_access_token() -> String {
    format!("mock_access_token_{}", random_hex(16))
}

/// Exchange an authorization code for an access token
pub async fn exchange_code(
    http: &Client,
    token_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    code: &str,
    code_verifier: &str,
) -> Result<AccessToken> {
    let request = TokenExchangeRequest {
        grant_type: "authorization_code",
        code,
        redirect_uri,
        client_id,
        code_verifier,
    };

    tracing::debug!("POST {}", token_endpoint);
    let response = http
        .post(token_endpoint)
        .form(&request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(Error::OAuth(format!("Token exchange failed ({}): {}", status, error_text)));
    }

    let token_response: TokenResponse = response.json().await?;
    Ok(token_response.into())
}
