//! OAuth 2.1 authorization for MCP servers
//!
//! This module provides:
//! - PKCE verifier/challenge and state token generation
//! - Protected resource and authorization server discovery
//! - Authorization URL construction
//! - Local callback server
//! - Authorization code exchange

mod pkce;
mod discovery;
mod callback_server;
mod token;

use url::Url;
use crate::Result;
use crate::error::Error;

pub use pkce::{
    generate_code_challenge, generate_code_verifier, generate_pkce, generate_state, random_hex,
    PkcePair, CODE_CHALLENGE_METHOD,
};
pub use discovery::{
    authorization_server_url, endpoint_url, fetch_authorization_server_metadata,
    fetch_protected_resource_metadata, protected_resource_url, AuthorizationServerMetadata,
    ProtectedResourceMetadata,
};
pub use callback_server::{
    handle_callback, handle_request, redirect_uri, CallbackOutcome, CallbackQuery,
    CallbackResponse, CallbackServer, CALLBACK_PATH, DEFAULT_CALLBACK_PORT,
};
pub use token::{exchange_code, mask_token, mock_access_token, AccessToken};

/// Build the authorization URL for an authorization-code + PKCE request
pub fn build_authorization_url(
    authorization_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    code_challenge: &str,
    state: &str,
) -> Result<String> {
    let mut url = Url::parse(authorization_endpoint)
        .map_err(|e| Error::OAuth(format!("Invalid authorization endpoint: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", scope)
        .append_pair("code_challenge", code_challenge)
        .append_pair("code_challenge_method", CODE_CHALLENGE_METHOD)
        .append_pair("state", state);

    Ok(url.to_string())
}
