//! mcp-oauth CLI entry point

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use anyhow::Result;
use mcp_oauth::auth::{self, CallbackServer};
use mcp_oauth::config::{self, Config};
use mcp_oauth::{demo, ui, McpClient};

#[derive(Parser)]
#[command(name = "mcp-oauth")]
#[command(about = "OAuth 2.1 + PKCE client for MCP servers")]
#[command(version)]
struct Cli {
    /// MCP server base URL
    #[arg(long, global = true, env = "MCP_SERVER_URL")]
    server: Option<String>,

    /// OAuth client id
    #[arg(long, global = true, env = "MCP_CLIENT_ID")]
    client_id: Option<String>,

    /// Local callback port
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk through the whole flow with a simulated authorization step
    Demo {
        /// API key to store on the server
        #[arg(long, default_value = demo::DEMO_API_KEY)]
        api_key: String,

        /// Base URL stored alongside the API key
        #[arg(long)]
        api_base_url: Option<String>,
    },

    /// Check the server's health endpoint
    Health,

    /// Print a fresh PKCE pair and state token
    Pkce,

    /// Run the real authorization flow through the browser
    Authorize {
        /// Print the URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Run only the callback listener with a fresh state token
    Callback,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = config::load()?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(client_id) = cli.client_id {
        config.client_id = client_id;
    }
    if let Some(port) = cli.port {
        config.callback_port = port;
    }
    config.validate()?;

    let command = cli.command.unwrap_or(Commands::Demo {
        api_key: demo::DEMO_API_KEY.to_string(),
        api_base_url: None,
    });

    match command {
        Commands::Demo { api_key, api_base_url } => {
            let base_url = api_base_url.unwrap_or_else(|| config.api_key_base_url.clone());
            let mut client = McpClient::new(config);
            if !demo::preflight(&client).await {
                return Ok(());
            }
            demo::run_complete_flow(&mut client, &api_key, &base_url).await?;
        }

        Commands::Health => {
            let client = McpClient::new(config);
            let health = client.health_check().await?;
            ui::print_success(&format!("Server at {} is up", client.config().server_url));
            ui::print_detail("Auth Enabled", &health.auth_enabled.to_string());
        }

        Commands::Pkce => {
            let pkce = auth::generate_pkce();
            ui::print_detail("code_verifier", &pkce.verifier);
            ui::print_detail("code_challenge", &pkce.challenge);
            ui::print_detail("code_challenge_method", pkce.method);
            ui::print_detail("state", &auth::generate_state());
        }

        Commands::Authorize { no_browser } => {
            run_authorize(config, no_browser).await?;
        }

        Commands::Callback => {
            let state = auth::generate_state();
            let server = CallbackServer::bind(config.callback_port, state.clone()).await?;
            ui::print_step(&format!("Callback server listening on {}", server.redirect_uri()?));
            ui::print_detail("Expected state", &state);
            let code = server.wait_for_code().await?;
            ui::print_success(&format!("Received authorization code: {}", code));
        }
    }

    Ok(())
}

async fn run_authorize(config: Config, no_browser: bool) -> Result<()> {
    let mut client = McpClient::new(config);

    ui::print_section("🔍 Discovering OAuth endpoints...");
    let resource = client.discover_endpoints().await?;
    ui::print_detail("Resource", &resource.resource);
    let metadata = client.get_auth_server_metadata().await?;
    ui::print_detail("Issuer", &metadata.issuer);

    let redirect_uri = client.config().redirect_uri();
    let request = client.start_auth_flow_with_redirect(&metadata, &redirect_uri)?;
    let server = CallbackServer::bind(client.config().callback_port, request.state.clone()).await?;
    let waiter = tokio::spawn(server.wait_for_code());

    ui::print_section("🚀 Authorize in your browser:");
    println!("\n{}\n", request.url);
    if !no_browser {
        if let Err(e) = open::that(&request.url) {
            tracing::warn!("Failed to open browser: {}", e);
        }
    }

    ui::print_step("Waiting for authorization...");
    let code = waiter.await??;

    ui::print_step("Authorization received, exchanging code...");
    let token = client.exchange_code(&metadata, &code, &redirect_uri).await?;
    ui::print_success("Access token issued");
    ui::print_detail("Access Token", &token.masked());
    if let Some(scope) = &token.scope {
        ui::print_detail("Scope", scope);
    }

    match client.get_api_key_metadata().await? {
        Some(meta) => ui::print_detail("Has API Key", &meta.has_key.to_string()),
        None => ui::print_warning("The MCP server rejected the issued token"),
    }

    Ok(())
}
