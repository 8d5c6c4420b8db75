//! OAuth callback server
//!
//! A temporary local HTTP server that captures the authorization code from
//! the browser redirect and checks the returned state token.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::Url;
use crate::Result;
use crate::error::Error;

/// Default callback port
pub const DEFAULT_CALLBACK_PORT: u16 = 8080;

/// Route served by the callback server
pub const CALLBACK_PATH: &str = "/callback";

/// How long a connection may stay silent before it is dropped
const READ_TIMEOUT: Duration = Duration::from_secs(10);

const SUCCESS_BODY: &str = "<p>You can close this window and return to the application.</p>\n    <script>window.close();</script>";

/// Query parameters delivered to the callback route
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackQuery {
    /// Extract the parameters from a parsed callback URL
    pub fn from_url(url: &Url) -> Self {
        let mut query = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => query.code = Some(value.to_string()),
                "state" => query.state = Some(value.to_string()),
                "error" => query.error = Some(value.to_string()),
                "error_description" => query.error_description = Some(value.to_string()),
                _ => {}
            }
        }
        query
    }
}

/// What a single callback request amounted to
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// A valid authorization code arrived
    Code(String),
    /// The authorization server reported an error
    Denied(String),
    /// The request was rejected (bad state, missing code, wrong path)
    Rejected,
}

/// HTTP response for a callback request
#[derive(Debug, Clone)]
pub struct CallbackResponse {
    pub status: u16,
    pub html: String,
    pub outcome: CallbackOutcome,
}

impl CallbackResponse {
    fn page(status: u16, title: &str, body: &str, outcome: CallbackOutcome) -> Self {
        Self {
            status,
            html: format!("<h1>{}</h1>\n    {}", title, body),
            outcome,
        }
    }

    fn not_found() -> Self {
        Self::page(404, "Not Found", "<p>Unknown path</p>", CallbackOutcome::Rejected)
    }

    fn status_line(&self) -> &'static str {
        match self.status {
            200 => "200 OK",
            404 => "404 Not Found",
            _ => "400 Bad Request",
        }
    }

    /// Serialize as a complete HTTP/1.1 response
    pub fn to_http(&self) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status_line(),
            self.html.len(),
            self.html
        )
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Decide the response for a callback query
///
/// Errors from the authorization server win over everything else, then the
/// state must match exactly, then a non-empty code must be present.
pub fn handle_callback(query: &CallbackQuery, expected_state: &str) -> CallbackResponse {
    if let Some(error) = &query.error {
        let message = match &query.error_description {
            Some(description) => format!("{} - {}", error, description),
            None => error.clone(),
        };
        return CallbackResponse::page(
            400,
            "Authorization Error",
            &format!("<p>{}</p>", escape_html(&message)),
            CallbackOutcome::Denied(message),
        );
    }

    if query.state.as_deref() != Some(expected_state) {
        return CallbackResponse::page(
            400,
            "Invalid State",
            "<p>State parameter mismatch</p>",
            CallbackOutcome::Rejected,
        );
    }

    match query.code.as_deref() {
        Some(code) if !code.is_empty() => CallbackResponse::page(
            200,
            "Authorization Successful!",
            SUCCESS_BODY,
            CallbackOutcome::Code(code.to_string()),
        ),
        _ => CallbackResponse::page(
            400,
            "Missing Code",
            "<p>No authorization code received</p>",
            CallbackOutcome::Rejected,
        ),
    }
}

/// Route a raw HTTP request to the callback handler
pub fn handle_request(request: &str, expected_state: &str) -> CallbackResponse {
    // Parse: GET /callback?code=xxx&state=yyy HTTP/1.1
    let target = request
        .lines()
        .next()
        .and_then(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("GET"), Some(target)) => Some(target),
                _ => None,
            }
        });

    let Some(target) = target else {
        return CallbackResponse::not_found();
    };

    let url = match Url::parse(&format!("http://localhost{}", target)) {
        Ok(url) => url,
        Err(_) => return CallbackResponse::not_found(),
    };

    if url.path() != CALLBACK_PATH {
        return CallbackResponse::not_found();
    }

    handle_callback(&CallbackQuery::from_url(&url), expected_state)
}

/// Callback redirect URI for a local port
pub fn redirect_uri(port: u16) -> String {
    format!("http://localhost:{}{}", port, CALLBACK_PATH)
}

/// Single-route listener for the OAuth redirect
pub struct CallbackServer {
    listener: TcpListener,
    expected_state: String,
}

impl CallbackServer {
    /// Bind the callback server on localhost
    ///
    /// Port 0 picks a free port; use [`CallbackServer::redirect_uri`] to learn it.
    pub async fn bind(port: u16, expected_state: impl Into<String>) -> Result<Self> {
        let addr = format!("127.0.0.1:{}", port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::OAuth(format!("Failed to start callback server on {}: {}", addr, e)))?;

        Ok(Self {
            listener,
            expected_state: expected_state.into(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Redirect URI pointing at the bound port
    pub fn redirect_uri(&self) -> Result<String> {
        Ok(redirect_uri(self.local_addr()?.port()))
    }

    /// Serve requests until an authorization code or an authorization error arrives
    ///
    /// Each connection is handled on its own task, so an idle socket (a
    /// browser preconnect, for instance) never holds up the real redirect.
    pub async fn wait_for_code(self) -> Result<String> {
        tracing::info!("Callback server listening on http://{}", self.local_addr()?);

        let expected_state: Arc<str> = Arc::from(self.expected_state);
        let (tx, mut rx) = mpsc::channel::<CallbackOutcome>(8);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (socket, peer) = accepted
                        .map_err(|e| Error::OAuth(format!("Failed to accept connection: {}", e)))?;
                    let tx = tx.clone();
                    let expected_state = Arc::clone(&expected_state);
                    tokio::spawn(async move {
                        let outcome = serve_connection(socket, peer, &expected_state).await;
                        if tx.send(outcome).await.is_err() {
                            tracing::debug!("Callback from {} arrived after the flow finished", peer);
                        }
                    });
                }
                Some(outcome) = rx.recv() => match outcome {
                    CallbackOutcome::Code(code) => {
                        tracing::info!("Received authorization code");
                        return Ok(code);
                    }
                    CallbackOutcome::Denied(message) => {
                        return Err(Error::OAuth(format!("Authorization failed: {}", message)));
                    }
                    CallbackOutcome::Rejected => {
                        tracing::warn!("Rejected callback request, still waiting");
                    }
                },
            }
        }
    }
}

/// Read one request from a socket, answer it and report what it carried
async fn serve_connection(mut socket: TcpStream, peer: SocketAddr, expected_state: &str) -> CallbackOutcome {
    let mut buffer = vec![0u8; 4096];
    let n = match timeout(READ_TIMEOUT, socket.read(&mut buffer)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            tracing::debug!("Failed to read request from {}: {}", peer, e);
            return CallbackOutcome::Rejected;
        }
        Err(_) => {
            tracing::debug!("No request from {} within {:?}", peer, READ_TIMEOUT);
            return CallbackOutcome::Rejected;
        }
    };
    let request = String::from_utf8_lossy(&buffer[..n]);

    let response = handle_request(&request, expected_state);
    tracing::debug!("Callback from {} answered with {}", peer, response.status);

    if let Err(e) = socket.write_all(response.to_http().as_bytes()).await {
        tracing::debug!("Failed to write callback response to {}: {}", peer, e);
    }
    if let Err(e) = socket.shutdown().await {
        tracing::debug!("Failed to close callback connection to {}: {}", peer, e);
    }

    response.outcome
}
