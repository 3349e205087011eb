//! Streamable HTTP transport for MCP sessions.
//!
//! Mounts a single logical endpoint `/mcp` behind an axum router. POST
//! carries a JSON-RPC envelope; the first well-formed `initialize` request
//! without a session header mints a fresh session, and every other request
//! must present a known `mcp-session-id` header. GET and DELETE manage the
//! session lifecycle. A `GET /health` liveness probe is mounted alongside.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::handler::{AppState, ClockServer};
use crate::session::{self, SessionHandle, SessionRegistry};
use crate::{AppError, Result};

/// Header carrying the session identifier on every non-initialize request.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Plain-text body returned when GET/DELETE session validation fails.
const INVALID_SESSION_TEXT: &str = "Invalid or missing session ID";

/// Shared state for the axum handlers.
#[derive(Clone)]
struct HttpState {
    state: Arc<AppState>,
    registry: Arc<SessionRegistry>,
    closed_tx: mpsc::UnboundedSender<String>,
}

/// Handler for `GET /health` — returns 200 OK with a plain-text body.
///
/// Useful for probing liveness without initiating an MCP session.
async fn health() -> &'static str {
    "ok"
}

/// Start the streamable HTTP MCP transport on the configured address.
///
/// The registry is owned by the caller; this function wires the
/// closed-session channel to it and spawns one rmcp service per
/// established session.
///
/// # Errors
///
/// Returns `AppError::Http` if the server fails to bind or serve.
pub async fn serve_http(
    state: Arc<AppState>,
    registry: Arc<SessionRegistry>,
    ct: CancellationToken,
) -> Result<()> {
    let bind = state.config.socket_addr();

    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    let close_listener = session::spawn_close_listener(Arc::clone(&registry), closed_rx);

    let http_state = HttpState {
        state,
        registry,
        closed_tx,
    };
    let router = Router::new()
        .route("/mcp", post(post_mcp).get(get_mcp).delete(delete_mcp))
        .route("/health", get(health))
        .with_state(http_state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Http(format!("failed to bind {bind}: {err}")))?;

    info!(%bind, "starting streamable HTTP MCP transport");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
        })
        .await
        .map_err(|err| AppError::Http(format!("HTTP server error: {err}")))?;

    close_listener.abort();
    info!("streamable HTTP MCP transport shut down");
    Ok(())
}

/// Handler for `POST /mcp`.
///
/// A request with a known session id is routed pass-through to that
/// session's handle. A request with no session id establishes a new
/// session only when it is a well-formed `initialize` request; anything
/// else is rejected with the fixed structured error.
async fn post_mcp(State(st): State<HttpState>, headers: HeaderMap, body: String) -> Response {
    let message: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(err) => {
            return jsonrpc_error_response(-32700, &format!("parse error: {err}"), Value::Null)
        }
    };
    if message.is_array() {
        return jsonrpc_error_response(-32600, "batching not supported", Value::Null);
    }

    if let Some(sid) = header_str(&headers, SESSION_ID_HEADER) {
        let Some(handle) = st.registry.lookup(sid).await else {
            return session_error_response();
        };
        return dispatch_to_session(&handle, message).await;
    }

    // No session header: only a valid initialize request may mint a session.
    if !is_initialize_request(&message) {
        return session_error_response();
    }

    let request_id = message.get("id").cloned().unwrap_or(Value::Null);
    let id = session::mint_session_id();
    let server = ClockServer::new(Arc::clone(&st.state));
    let handle = SessionHandle::spawn(id.clone(), server, st.closed_tx.clone());
    if let Err(err) = st.registry.register(&id, Arc::clone(&handle)).await {
        warn!(%err, "session id collision on register");
        handle.close();
        return jsonrpc_error_response(-32603, "could not register session", request_id);
    }
    info!(session_id = %id, "session established");

    match handle.send_request(message).await {
        Ok(response) => json_response(&response, Some(&id)),
        Err(err) => {
            warn!(session_id = %id, %err, "initialize dispatch failed");
            st.registry.remove(&id).await;
            handle.close();
            jsonrpc_error_response(-32603, &err.to_string(), request_id)
        }
    }
}

/// Handler for `GET /mcp`.
///
/// The demo has no server-initiated messages, so a valid session gets 405
/// rather than an event stream.
async fn get_mcp(State(st): State<HttpState>, headers: HeaderMap) -> Response {
    if known_session(&st, &headers).await.is_none() {
        return (StatusCode::BAD_REQUEST, INVALID_SESSION_TEXT).into_response();
    }
    (
        StatusCode::METHOD_NOT_ALLOWED,
        "server-initiated streams not supported",
    )
        .into_response()
}

/// Handler for `DELETE /mcp` — closes the session and removes it from the
/// registry.
async fn delete_mcp(State(st): State<HttpState>, headers: HeaderMap) -> Response {
    let Some(handle) = known_session(&st, &headers).await else {
        return (StatusCode::BAD_REQUEST, INVALID_SESSION_TEXT).into_response();
    };

    handle.close();
    st.registry.remove(handle.id()).await;
    info!(session_id = %handle.id(), "session deleted");
    StatusCode::ACCEPTED.into_response()
}

/// Resolve the `mcp-session-id` header against the registry.
async fn known_session(
    st: &HttpState,
    headers: &HeaderMap,
) -> Option<Arc<SessionHandle>> {
    let sid = header_str(headers, SESSION_ID_HEADER)?;
    st.registry.lookup(sid).await
}

/// Forward one message into an established session.
///
/// Requests await the matched response; notifications and client responses
/// are accepted without a body.
async fn dispatch_to_session(handle: &SessionHandle, message: Value) -> Response {
    let is_request =
        message.get("method").is_some() && message.get("id").is_some_and(|v| !v.is_null());

    if is_request {
        let request_id = message.get("id").cloned().unwrap_or(Value::Null);
        match handle.send_request(message).await {
            Ok(response) => json_response(&response, Some(handle.id())),
            Err(err) => jsonrpc_error_response(-32603, &err.to_string(), request_id),
        }
    } else {
        match handle.send_notification(&message) {
            Ok(()) => StatusCode::ACCEPTED.into_response(),
            Err(err) => jsonrpc_error_response(-32603, &err.to_string(), Value::Null),
        }
    }
}

/// A well-formed `initialize` request: the method matches and an id is
/// present, so a response can be correlated.
fn is_initialize_request(message: &Value) -> bool {
    message.get("method").and_then(Value::as_str) == Some("initialize")
        && message.get("id").is_some_and(|v| !v.is_null())
}

/// The fixed session-validation error: HTTP 400 with a structured
/// JSON-RPC body and a null id.
fn session_error_response() -> Response {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "error": {
            "code": -32000,
            "message": "Bad Request: No valid session ID provided"
        },
        "id": null
    });
    (
        StatusCode::BAD_REQUEST,
        [("content-type", "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// A JSON-RPC error envelope delivered over HTTP 200 like any other
/// protocol-level response.
///
/// Echoes the request id when the caller knows it; parse, batch, and
/// notification failures pass `Value::Null`.
fn jsonrpc_error_response(code: i64, message: &str, id: Value) -> Response {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message },
        "id": id
    });
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Serialize a JSON-RPC response, echoing the session id header when known.
fn json_response(message: &Value, session_id: Option<&str>) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json");

    if let Some(sid) = session_id {
        if let Ok(value) = HeaderValue::from_str(sid) {
            builder = builder.header(SESSION_ID_HEADER, value);
        }
    }

    builder
        .body(axum::body::Body::from(message.to_string()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}
