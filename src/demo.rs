//! Narrated walkthrough of the complete OAuth flow
//!
//! The authorization step is simulated with a mock token, so the
//! authenticated calls are expected to come back 401 against a server that
//! validates tokens. Those 401s are reported, not treated as failures.

use crate::Result;
use crate::auth::mask_token;
use crate::client::{McpClient, McpResponse};
use crate::ui;

/// API key stored by the demo
pub const DEMO_API_KEY: &str = "demo-twenty-api-key-12345";

/// Which steps of the demo went through
#[derive(Debug, Clone, PartialEq)]
pub struct DemoReport {
    pub authorization_url: String,
    pub api_key_stored: bool,
    pub api_key_metadata: bool,
    pub mcp_response: McpResponse,
}

/// Check the server is reachable before running the demo
///
/// Returns `false` if the server could not be reached.
pub async fn preflight(client: &McpClient) -> bool {
    match client.health_check().await {
        Ok(health) => {
            if !health.auth_enabled {
                ui::print_warning("Auth is not enabled on the MCP server");
                ui::print_info("Run \"npm run setup:oauth\" to enable authentication");
            }
            true
        }
        Err(e) => {
            tracing::debug!("Health check failed: {}", e);
            ui::print_error(&format!("Cannot connect to MCP server at {}", client.config().server_url));
            ui::print_info("Make sure the server is running: npm start");
            false
        }
    }
}

/// Run every step of the flow in order
pub async fn run_complete_flow(client: &mut McpClient, api_key: &str, base_url: &str) -> Result<DemoReport> {
    ui::print_header("OAuth 2.1 Flow Demo for MCP Server", &client.config().server_url);

    match run_steps(client, api_key, base_url).await {
        Ok(report) => {
            print_summary();
            Ok(report)
        }
        Err(e) => {
            ui::print_error(&format!("Demo failed: {}", e));
            Err(e)
        }
    }
}

async fn run_steps(client: &mut McpClient, api_key: &str, base_url: &str) -> Result<DemoReport> {

    ui::print_section("🔍 Discovering OAuth endpoints...");
    let resource = client.discover_endpoints().await?;
    ui::print_success("OAuth endpoints discovered");
    ui::print_detail("Resource", &resource.resource);
    ui::print_detail("Auth Servers", &resource.authorization_servers.join(", "));

    ui::print_section("📋 Getting authorization server metadata...");
    let metadata = client.get_auth_server_metadata().await?;
    ui::print_success("Authorization server metadata retrieved");
    ui::print_detail("Issuer", &metadata.issuer);
    ui::print_detail("Auth Endpoint", &metadata.authorization_endpoint);
    ui::print_detail("Token Endpoint", &metadata.token_endpoint);

    ui::print_section("🚀 Starting OAuth authorization flow...");
    let request = client.start_auth_flow(&metadata)?;
    ui::print_detail("Authorization URL", &request.url);
    ui::print_info("In a real app, the user would be redirected to authorize");
    ui::print_info("For this demo, the callback is simulated with a mock token");
    let authorization_url = request.url;

    ui::print_section("🔄 Simulating OAuth callback...");
    let token = client.simulate_callback();
    ui::print_success("Authorization completed (simulated)");
    ui::print_detail("Access Token", &mask_token(&token));

    ui::print_section("💾 Storing API key...");
    let api_key_stored = client.store_api_key(api_key, base_url).await?;
    if api_key_stored {
        ui::print_success("API key stored successfully");
    } else {
        ui::print_error("Authentication failed (expected with mock token)");
        ui::print_info("In production, use real bearer tokens");
    }

    ui::print_section("📊 Getting API key metadata...");
    let api_key_metadata = match client.get_api_key_metadata().await? {
        Some(meta) => {
            ui::print_success("API key metadata retrieved");
            ui::print_detail("Has Key", &meta.has_key.to_string());
            ui::print_detail("Base URL", meta.base_url.as_deref().unwrap_or("default"));
            ui::print_detail("Updated", meta.updated_at.as_deref().unwrap_or("never"));
            true
        }
        None => {
            ui::print_error("Authentication failed (expected with mock token)");
            false
        }
    };

    ui::print_section("🔗 Making authenticated MCP request...");
    let mcp_response = client.make_mcp_request().await?;
    match &mcp_response {
        McpResponse::Unauthorized => {
            ui::print_error("Authentication failed (expected with mock token)");
            ui::print_info("In production, use real bearer tokens");
        }
        McpResponse::NoApiKey => ui::print_info("User needs to configure their Twenty API key first"),
        McpResponse::Body { status, text } => {
            ui::print_detail("MCP Response Status", &status.to_string());
            ui::print_detail("MCP Response", &ui::truncate(text, 200));
        }
    }

    tracing::info!("Demo flow finished");
    Ok(DemoReport {
        authorization_url,
        api_key_stored,
        api_key_metadata,
        mcp_response,
    })
}

fn print_summary() {
    ui::print_section("🎉 OAuth flow demo completed!");
    ui::print_success("OAuth endpoints discovered");
    ui::print_success("Authorization flow initiated");
    ui::print_success("API key management tested");
    ui::print_success("MCP request attempted");
    println!();
    ui::print_info("To test with real tokens, run `mcp-oauth authorize` with a registered client id");
}
