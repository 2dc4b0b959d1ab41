// crates/locus-server/src/bridge/mod.rs
// Client bridge: owns connected interactive clients and multiplexes calls

pub mod actions;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tracing::{debug, warn};

use locus_types::{ActionStatus, ClientFrame, ServerFrame};

use crate::error::{BrokerError, Result};
use actions::ActionLedger;

/// One connected interactive client.
///
/// Exclusively owned by the bridge; other components refer to it by id.
pub struct ClientConnection {
    pub client_id: String,
    /// Outbound frames; the WebSocket writer task drains the other end.
    tx: mpsc::UnboundedSender<ServerFrame>,
    pub capabilities: HashSet<String>,
    /// Last UI-state snapshot pushed by the client. May be empty.
    pub last_state: Value,
    pub ledger: ActionLedger,
    pub connected_at: chrono::DateTime<chrono::Utc>,
}

struct PendingCall {
    client_id: String,
    waiter: oneshot::Sender<Result<Value>>,
}

/// Owns the set of client connections and correlates `tool_call` frames
/// with their `tool_result` replies by `call_id`.
#[derive(Default)]
pub struct ClientBridge {
    clients: RwLock<HashMap<String, ClientConnection>>,
    pending: Mutex<HashMap<u64, PendingCall>>,
    next_call_id: AtomicU64,
}

impl ClientBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection; returns its assigned client id.
    pub async fn register(&self, tx: mpsc::UnboundedSender<ServerFrame>) -> String {
        let client_id = uuid::Uuid::new_v4().to_string();
        let connection = ClientConnection {
            client_id: client_id.clone(),
            tx,
            capabilities: HashSet::new(),
            last_state: Value::Null,
            ledger: ActionLedger::default(),
            connected_at: chrono::Utc::now(),
        };
        self.clients
            .write()
            .await
            .insert(client_id.clone(), connection);
        debug!(client_id = %client_id, "Client connected");
        client_id
    }

    /// Remove a connection and fail every in-flight invoke targeting it.
    pub async fn deregister(&self, client_id: &str) {
        self.clients.write().await.remove(client_id);

        let orphaned: Vec<PendingCall> = {
            let mut pending = self.pending.lock().await;
            let ids: Vec<u64> = pending
                .iter()
                .filter(|(_, call)| call.client_id == client_id)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id))
                .collect()
        };
        for call in orphaned {
            let _ = call
                .waiter
                .send(Err(BrokerError::ClientDisconnected(client_id.to_string())));
        }
        debug!(client_id = %client_id, "Client disconnected");
    }

    /// Forward a tool call to one client and await its correlated reply.
    pub async fn invoke(
        &self,
        client_id: &str,
        tool: &str,
        args: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (waiter_tx, waiter_rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                call_id,
                PendingCall {
                    client_id: client_id.to_string(),
                    waiter: waiter_tx,
                },
            );
        }

        let frame = ServerFrame::ToolCall {
            call_id,
            tool: tool.to_string(),
            args,
        };
        if !self.send_frame(client_id, frame).await {
            self.pending.lock().await.remove(&call_id);
            return Err(BrokerError::ClientDisconnected(client_id.to_string()));
        }

        match tokio::time::timeout(timeout, waiter_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BrokerError::ClientDisconnected(client_id.to_string())),
            Err(_) => {
                self.pending.lock().await.remove(&call_id);
                // Best-effort cancel; the client may never reply.
                let _ = self
                    .send_frame(client_id, ServerFrame::Cancel { call_id })
                    .await;
                Err(BrokerError::ClientTimeout(timeout))
            }
        }
    }

    async fn send_frame(&self, client_id: &str, frame: ServerFrame) -> bool {
        let clients = self.clients.read().await;
        match clients.get(client_id) {
            Some(connection) => connection.tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Fire-and-forget event to every connected client.
    pub async fn broadcast(&self, event: &str, payload: Value) {
        let clients = self.clients.read().await;
        for connection in clients.values() {
            let frame = ServerFrame::Event {
                event: event.to_string(),
                payload: payload.clone(),
            };
            if connection.tx.send(frame).is_err() {
                warn!(client_id = %connection.client_id, "Dropping broadcast to closed client");
            }
        }
    }

    /// Handle one inbound frame from a client.
    pub async fn on_frame(&self, client_id: &str, frame: ClientFrame) {
        match frame {
            ClientFrame::Hello { capabilities } => {
                let mut clients = self.clients.write().await;
                if let Some(connection) = clients.get_mut(client_id) {
                    connection.capabilities = capabilities.into_iter().collect();
                    debug!(
                        client_id = %client_id,
                        count = connection.capabilities.len(),
                        "Client capabilities registered"
                    );
                }
            }
            ClientFrame::StateUpdate { snapshot } => {
                let mut clients = self.clients.write().await;
                if let Some(connection) = clients.get_mut(client_id) {
                    connection.last_state = snapshot;
                }
            }
            ClientFrame::ToolResult {
                call_id,
                ok,
                data,
                error,
            } => {
                let call = {
                    let mut pending = self.pending.lock().await;
                    // A reply only resolves a call addressed to the same client.
                    match pending.get(&call_id) {
                        Some(entry) if entry.client_id == client_id => pending.remove(&call_id),
                        _ => None,
                    }
                };
                match call {
                    Some(call) => {
                        let outcome = if ok {
                            Ok(data.unwrap_or_else(|| json!({})))
                        } else {
                            Err(BrokerError::Internal(
                                error.unwrap_or_else(|| "client reported failure".to_string()),
                            ))
                        };
                        let _ = call.waiter.send(outcome);
                    }
                    None => {
                        debug!(call_id, "tool_result for unknown call (timed out or cancelled)");
                    }
                }
            }
            ClientFrame::ActionProgress { action_id, status } => {
                let mut clients = self.clients.write().await;
                if let Some(connection) = clients.get_mut(client_id)
                    && !connection.ledger.update_status(&action_id, status)
                {
                    debug!(action_id = %action_id, "action_progress for unknown action");
                }
            }
        }
    }

    /// Pick the target client for a client-side call.
    ///
    /// Policy: an explicit `clientId` argument wins; else the single
    /// connected client; else fail with a diagnostic listing who is
    /// connected.
    pub async fn select_target(&self, explicit: Option<&str>) -> Result<String> {
        let clients = self.clients.read().await;
        if let Some(id) = explicit {
            if clients.contains_key(id) {
                return Ok(id.to_string());
            }
            return Err(BrokerError::NoClientAvailable(format!(
                "client `{id}` is not connected (connected: [{}])",
                join_ids(&clients)
            )));
        }
        match clients.len() {
            1 => Ok(clients
                .keys()
                .next()
                .map(|k| k.to_string())
                .unwrap_or_default()),
            0 => Err(BrokerError::NoClientAvailable(
                "no interactive clients connected".to_string(),
            )),
            _ => Err(BrokerError::NoClientAvailable(format!(
                "multiple clients connected, pass clientId (connected: [{}])",
                join_ids(&clients)
            ))),
        }
    }

    /// Run a closure against one client's action ledger.
    pub async fn with_ledger<R>(
        &self,
        client_id: &str,
        f: impl FnOnce(&mut ActionLedger) -> R,
    ) -> Result<R> {
        let mut clients = self.clients.write().await;
        match clients.get_mut(client_id) {
            Some(connection) => Ok(f(&mut connection.ledger)),
            None => Err(BrokerError::ClientDisconnected(client_id.to_string())),
        }
    }

    /// Update one action's status (used by `action_progress` handling
    /// and by the execute path).
    pub async fn set_action_status(
        &self,
        client_id: &str,
        action_id: &str,
        status: ActionStatus,
    ) -> Result<bool> {
        self.with_ledger(client_id, |ledger| ledger.update_status(action_id, status))
            .await
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn client_ids(&self) -> Vec<String> {
        let clients = self.clients.read().await;
        let mut ids: Vec<String> = clients.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Last pushed state snapshot for a client.
    pub async fn last_state(&self, client_id: &str) -> Option<Value> {
        self.clients
            .read()
            .await
            .get(client_id)
            .map(|c| c.last_state.clone())
    }

    /// Any client's state snapshot, preferring the single connected client.
    /// Feeds the dynamic selector's context boost.
    pub async fn any_state(&self) -> Option<Value> {
        let clients = self.clients.read().await;
        clients
            .values()
            .map(|c| c.last_state.clone())
            .find(|s| !s.is_null())
    }

    /// Connection summaries for diagnostics and `list_clients`.
    pub async fn clients_info(&self) -> Vec<Value> {
        let clients = self.clients.read().await;
        let mut info: Vec<Value> = clients
            .values()
            .map(|c| {
                let mut capabilities: Vec<&String> = c.capabilities.iter().collect();
                capabilities.sort();
                json!({
                    "client_id": c.client_id,
                    "capabilities": capabilities,
                    "connected_at": c.connected_at.to_rfc3339(),
                    "has_state": !c.last_state.is_null(),
                    "pending_actions": c.ledger.pending_count(),
                })
            })
            .collect();
        info.sort_by_key(|v| v["client_id"].as_str().map(|s| s.to_string()));
        info
    }
}

fn join_ids(clients: &HashMap<String, ClientConnection>) -> String {
    let mut ids: Vec<&str> = clients.keys().map(|k| k.as_str()).collect();
    ids.sort();
    ids.join(", ")
}
