//! mcp-oauth - OAuth 2.1 authorization-code + PKCE client for MCP servers
//!
//! This library discovers a server's OAuth endpoints, builds PKCE
//! authorization requests, receives the redirect on a local callback server,
//! and calls the server's authenticated API-key and JSON-RPC endpoints.

pub mod auth;
pub mod client;
pub mod config;
pub mod demo;
pub mod error;
pub mod ui;

pub use client::McpClient;
pub use error::{Error, Result};
