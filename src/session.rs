//! In-memory session registry and per-session connection handles.
//!
//! Each MCP session maps an opaque generated identifier to a live
//! [`SessionHandle`]. The handle owns the client side of an in-process
//! duplex pipe whose server side runs an rmcp service for that session,
//! so all protocol framing and dispatch stays inside the SDK while the
//! registry does nothing but bookkeeping.
//!
//! The registry is an explicitly owned, passed-in object rather than a
//! process-wide singleton, so tests can run several independent server
//! instances in one process. Session termination is reported over an
//! explicit channel of closed ids consumed by the registry owner (see
//! [`spawn_close_listener`]) instead of a hidden close callback.

use std::collections::HashMap;
use std::sync::Arc;

use rmcp::service::ServiceExt;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::mcp::handler::ClockServer;
use crate::{AppError, Result};

/// Thread-safe map of in-flight JSON-RPC response senders keyed by
/// serialized request id.
type PendingResponses = Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>;

/// Capacity of the in-process duplex pipe backing one session.
const SESSION_PIPE_BYTES: usize = 64 * 1024;

/// Mint a fresh session identifier from a cryptographically random UUID.
///
/// Identifiers are never reused within the process lifetime.
#[must_use]
pub fn mint_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Live connection state for one session.
///
/// Owns the message-processing entry points ([`SessionHandle::send_request`]
/// and [`SessionHandle::send_notification`]) and the cancellation token that
/// tears the session down. Exactly one handle exists per registered id.
pub struct SessionHandle {
    id: String,
    outbound: mpsc::UnboundedSender<String>,
    pending: PendingResponses,
    ct: CancellationToken,
}

impl SessionHandle {
    /// Spawn the per-session rmcp service and return the handle wired to it.
    ///
    /// Three background tasks are started: the rmcp service loop reading the
    /// server side of the duplex pipe, a writer draining queued outbound
    /// lines, and a reader resolving responses against the pending map. When
    /// the transport closes the session id is sent on `closed_tx`.
    #[must_use]
    pub fn spawn(id: String, server: ClockServer, closed_tx: mpsc::UnboundedSender<String>) -> Arc<Self> {
        let (client_io, server_io) = tokio::io::duplex(SESSION_PIPE_BYTES);
        let (server_read, server_write) = tokio::io::split(server_io);
        let (client_read, client_write) = tokio::io::split(client_io);

        let ct = CancellationToken::new();
        let service_ct = ct.clone();
        let service_id = id.clone();
        tokio::spawn(async move {
            match server.serve_with_ct((server_read, server_write), service_ct).await {
                Ok(service) => {
                    if let Err(err) = service.waiting().await {
                        debug!(session_id = %service_id, %err, "session service ended with error");
                    }
                }
                Err(err) => {
                    debug!(session_id = %service_id, %err, "session handshake did not complete");
                }
            }
        });

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let mut writer = client_write;
            while let Some(line) = outbound_rx.recv().await {
                if writer.write_all(line.as_bytes()).await.is_err()
                    || writer.write_all(b"\n").await.is_err()
                    || writer.flush().await.is_err()
                {
                    break;
                }
            }
        });

        let pending = PendingResponses::default();
        let reader_pending = Arc::clone(&pending);
        let reader_ct = ct.clone();
        let reader_id = id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(client_read).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => route_inbound(&reader_pending, &line).await,
                    Ok(None) => break,
                    Err(err) => {
                        debug!(session_id = %reader_id, %err, "session stream read failed");
                        break;
                    }
                }
            }
            // Mark the session closed before draining, so no request can
            // slip in between the drain and the registry eviction.
            reader_ct.cancel();
            reader_pending.lock().await.clear();
            let _ = closed_tx.send(reader_id);
        });

        Arc::new(Self {
            id,
            outbound,
            pending,
            ct,
        })
    }

    /// Session identifier this handle was registered under.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Forward a JSON-RPC request to the session service and await its
    /// response. Responses are matched on the request id, so any number of
    /// requests may be in flight concurrently.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Mcp` when the message carries no id, or
    /// `AppError::Session` when the session closes before responding.
    pub async fn send_request(&self, message: Value) -> Result<Value> {
        let Some(request_id) = message.get("id").filter(|v| !v.is_null()) else {
            return Err(AppError::Mcp("request is missing an id".into()));
        };
        let key = request_id.to_string();

        if self.ct.is_cancelled() {
            return Err(AppError::Session("session is closed".into()));
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(key.clone(), tx);

        if self.outbound.send(message.to_string()).is_err() {
            self.pending.lock().await.remove(&key);
            return Err(AppError::Session("session transport closed".into()));
        }

        tokio::select! {
            biased;
            response = rx => response
                .map_err(|_| AppError::Session("session closed before a response arrived".into())),
            () = self.ct.cancelled() => {
                self.pending.lock().await.remove(&key);
                Err(AppError::Session("session closed before a response arrived".into()))
            }
        }
    }

    /// Forward a JSON-RPC notification to the session service (no response).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` when the session transport has closed.
    pub fn send_notification(&self, message: &Value) -> Result<()> {
        self.outbound
            .send(message.to_string())
            .map_err(|_| AppError::Session("session transport closed".into()))
    }

    /// Tear the session down. The service loop stops, the transport closes,
    /// and the closed-session event fires. Safe to call more than once.
    pub fn close(&self) {
        self.ct.cancel();
    }
}

/// Resolve one inbound line against the pending map.
///
/// Server-initiated requests and notifications are not part of this demo
/// and are dropped after logging.
async fn route_inbound(pending: &PendingResponses, line: &str) {
    let message: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, "discarding unparseable session message");
            return;
        }
    };

    let Some(id) = message.get("id").filter(|v| !v.is_null()) else {
        debug!("dropping server-initiated notification");
        return;
    };
    if message.get("result").is_none() && message.get("error").is_none() {
        debug!(request_id = %id, "dropping server-initiated request");
        return;
    }

    let key = id.to_string();
    if let Some(tx) = pending.lock().await.remove(&key) {
        let _ = tx.send(message);
    } else {
        debug!(request_id = %key, "response without a pending request");
    }
}

/// Flat in-memory map from session id to its exclusive [`SessionHandle`].
///
/// Per-key linearizability comes from the single mutex guard; entries are
/// only removed explicitly (DELETE or close event), never evicted.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new mapping.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if `id` is already registered.
    pub async fn register(&self, id: &str, handle: Arc<SessionHandle>) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(id) {
            return Err(AppError::Session(format!("session {id} already registered")));
        }
        sessions.insert(id.to_owned(), handle);
        Ok(())
    }

    /// Return the handle registered under `id`, if any.
    pub async fn lookup(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// Delete the mapping for `id`. Idempotent: removing an unknown id is a
    /// no-op returning `None`.
    pub async fn remove(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.lock().await.remove(id)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether the registry holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

/// Consume closed-session events and remove the matching registry entries.
///
/// The returned task runs until the sender side (held by every live
/// session's reader task) is dropped.
pub fn spawn_close_listener(
    registry: Arc<SessionRegistry>,
    mut closed_rx: mpsc::UnboundedReceiver<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(id) = closed_rx.recv().await {
            if registry.remove(&id).await.is_some() {
                info!(session_id = %id, "session closed, registry entry removed");
            }
        }
    })
}
