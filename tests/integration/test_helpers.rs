//! Shared helpers for integration tests.
//!
//! Spawns a real server instance on a discovered free port, with its
//! registry exposed so lifecycle tests can observe bookkeeping directly.

use std::sync::Arc;
use std::time::Duration;

use mcp_clock::config::ServerConfig;
use mcp_clock::mcp::handler::AppState;
use mcp_clock::mcp::http;
use mcp_clock::session::SessionRegistry;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// A running server instance plus the hooks tests need to observe it.
pub struct TestServer {
    /// Base URL of the HTTP listener (no trailing slash).
    pub base_url: String,
    /// Registry owned by this instance.
    pub registry: Arc<SessionRegistry>,
    ct: CancellationToken,
}

impl TestServer {
    /// Full URL of the MCP endpoint.
    pub fn mcp_url(&self) -> String {
        format!("{}/mcp", self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

/// Spawn a server on an ephemeral port and wait for it to accept requests.
pub async fn spawn_server() -> TestServer {
    // Discover a free port, then configure the server to use it.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let state = Arc::new(AppState {
        config: Arc::new(ServerConfig::with_port(port)),
    });
    let registry = Arc::new(SessionRegistry::new());
    let ct = CancellationToken::new();

    let server_state = Arc::clone(&state);
    let server_registry = Arc::clone(&registry);
    let server_ct = ct.clone();
    tokio::spawn(async move {
        let _ = http::serve_http(server_state, server_registry, server_ct).await;
    });

    tokio::time::sleep(Duration::from_millis(250)).await;

    TestServer {
        base_url: format!("http://127.0.0.1:{port}"),
        registry,
        ct,
    }
}

/// A well-formed `initialize` request envelope.
pub fn initialize_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 0,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "integration-tests", "version": "0.0.0" }
        }
    })
}

/// A `tools/call` envelope for `get_current_time`.
pub fn time_call_body(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": "get_current_time", "arguments": {} }
    })
}

/// Run the initialize handshake and return the minted session id.
pub async fn establish_session(client: &reqwest::Client, mcp_url: &str) -> String {
    let resp = client
        .post(mcp_url)
        .header("content-type", "application/json")
        .json(&initialize_body())
        .send()
        .await
        .expect("POST initialize");
    assert!(resp.status().is_success(), "initialize failed: {}", resp.status());

    let sid = resp
        .headers()
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .expect("mcp-session-id header")
        .to_owned();

    // Complete the lifecycle handshake.
    let notified = client
        .post(mcp_url)
        .header("content-type", "application/json")
        .header("mcp-session-id", &sid)
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .send()
        .await
        .expect("POST initialized notification");
    assert_eq!(notified.status().as_u16(), 202);

    sid
}
