#![forbid(unsafe_code)]

//! `mcp-clock-client` — demo client companion for `mcp-clock`.
//!
//! Connects to the server's streamable HTTP endpoint, performs the
//! initialize handshake, lists the available tools, calls
//! `get_current_time`, prints the result, and closes the session.

use clap::Parser;
use serde_json::{json, Value};

use mcp_clock::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "mcp-clock-client",
    about = "Demo client for the mcp-clock server",
    version,
    long_about = None
)]
struct Cli {
    /// MCP endpoint of a running server.
    #[arg(long, env = "MCP_CLOCK_URL", default_value = "http://127.0.0.1:8334/mcp")]
    url: String,
}

/// Minimal MCP client over the streamable HTTP transport.
///
/// Tracks the session id returned by the initialize handshake and echoes
/// it on every subsequent request.
struct ClockClient {
    http: reqwest::Client,
    url: String,
    session_id: Option<String>,
    next_id: i64,
}

impl ClockClient {
    fn new(url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            session_id: None,
            next_id: 0,
        }
    }

    /// POST one JSON-RPC request and return the `result` member.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` on transport failures and `AppError::Mcp`
    /// when the server answers with a JSON-RPC error.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });

        let mut req = self
            .http
            .post(&self.url)
            .header("content-type", "application/json")
            .json(&body);
        if let Some(ref sid) = self.session_id {
            req = req.header("mcp-session-id", sid);
        }

        let resp = req
            .send()
            .await
            .map_err(|err| AppError::Http(format!("POST {method} failed: {err}")))?;

        if let Some(sid) = resp
            .headers()
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(sid.to_owned());
        }

        let status = resp.status();
        let payload: Value = resp
            .json()
            .await
            .map_err(|err| AppError::Mcp(format!("invalid response to {method}: {err}")))?;

        if let Some(error) = payload.get("error") {
            return Err(AppError::Mcp(format!("{method} returned error: {error}")));
        }
        if !status.is_success() {
            return Err(AppError::Http(format!("{method} returned HTTP {status}")));
        }

        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    /// POST one JSON-RPC notification (no response expected).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` on transport failures.
    async fn notify(&self, method: &str) -> Result<()> {
        let body = json!({ "jsonrpc": "2.0", "method": method });
        let mut req = self
            .http
            .post(&self.url)
            .header("content-type", "application/json")
            .json(&body);
        if let Some(ref sid) = self.session_id {
            req = req.header("mcp-session-id", sid);
        }
        req.send()
            .await
            .map_err(|err| AppError::Http(format!("POST {method} failed: {err}")))?;
        Ok(())
    }

    /// DELETE the session, releasing its registry entry on the server.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` on transport failures.
    async fn close(&self) -> Result<()> {
        let Some(ref sid) = self.session_id else {
            return Ok(());
        };
        self.http
            .delete(&self.url)
            .header("mcp-session-id", sid)
            .send()
            .await
            .map_err(|err| AppError::Http(format!("DELETE session failed: {err}")))?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    println!("Connecting to MCP server at {}", args.url);
    let mut client = ClockClient::new(args.url);

    let init = client
        .request(
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {
                    "name": "mcp-clock-client",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
        .await?;
    client.notify("notifications/initialized").await?;

    let server_name = init
        .pointer("/serverInfo/name")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let session_id = client.session_id.clone().unwrap_or_default();
    println!("Initialized against {server_name} (session {session_id})");

    let tools = client.request("tools/list", json!({})).await?;
    println!("Available tools:");
    let tool_list = tools
        .get("tools")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for tool in &tool_list {
        let name = tool.get("name").and_then(Value::as_str).unwrap_or("?");
        let description = tool
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("");
        println!("- {name}: {description}");
    }

    let has_time_tool = tool_list
        .iter()
        .any(|t| t.get("name").and_then(Value::as_str) == Some("get_current_time"));
    if has_time_tool {
        let result = client
            .request(
                "tools/call",
                json!({ "name": "get_current_time", "arguments": {} }),
            )
            .await?;
        let text = result
            .pointer("/content/0/text")
            .and_then(Value::as_str)
            .unwrap_or_default();
        println!("get_current_time result: {text}");
    } else {
        println!("get_current_time tool not found on server");
    }

    client.close().await?;
    println!("Session closed");

    Ok(())
}
