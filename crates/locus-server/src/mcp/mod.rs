// crates/locus-server/src/mcp/mod.rs
// MCP transport: JSON-RPC 2.0 over stdio, newline-delimited
//
// stdout is reserved for protocol frames; every diagnostic goes to stderr
// through tracing. Mixing the two corrupts the host's parser.

pub mod protocol;

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::core::Core;
use crate::dispatch::Origin;
use crate::error::Result;
use crate::tasks::TaskEvent;
use protocol::{JsonRpcRequest, METHOD_NOT_FOUND, notification, response_err, response_ok};

/// Exit codes defined by the stdio contract.
pub const EXIT_OK: i32 = 0;
pub const EXIT_STARTUP: i32 = 1;
pub const EXIT_PROTOCOL: i32 = 2;

/// Serve MCP over stdin/stdout until EOF. Returns the process exit code.
pub async fn run(core: Arc<Core>) -> Result<i32> {
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Value>();

    let writer = tokio::spawn(write_frames(out_rx));
    let forwarder = tokio::spawn(forward_task_events(core.clone(), out_tx.clone()));

    let exit_code = read_loop(core, out_tx).await;

    forwarder.abort();
    // Dropping the last sender lets the writer drain and finish.
    let _ = writer.await;
    Ok(exit_code)
}

/// Single writer: every outbound frame is serialized here, one per line.
async fn write_frames(mut rx: mpsc::UnboundedReceiver<Value>) {
    let mut stdout = tokio::io::stdout();
    while let Some(frame) = rx.recv().await {
        let mut line = frame.to_string();
        line.push('\n');
        if stdout.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        let _ = stdout.flush().await;
    }
}

/// Task progress events become `notifications/progress` frames and are
/// mirrored to connected WebSocket clients.
async fn forward_task_events(core: Arc<Core>, out_tx: mpsc::UnboundedSender<Value>) {
    let mut events = core.tasks.subscribe();
    loop {
        match events.recv().await {
            Ok(TaskEvent::Progress {
                task_id,
                tool,
                progress,
                message,
            }) => {
                let params = json!({
                    "task_id": task_id,
                    "tool": tool,
                    "progress": progress,
                    "message": message,
                });
                let _ = out_tx.send(notification("notifications/progress", params.clone()));
                core.bridge.broadcast("task_progress", params).await;
            }
            Ok(TaskEvent::StateChanged { task_id, tool, state }) => {
                core.bridge
                    .broadcast(
                        "task_state",
                        json!({"task_id": task_id, "tool": tool, "state": state}),
                    )
                    .await;
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Task event forwarder lagged");
            }
            Err(_) => break,
        }
    }
}

async fn read_loop(core: Arc<Core>, out_tx: mpsc::UnboundedSender<Value>) -> i32 {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin closed, shutting down");
                return EXIT_OK;
            }
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                return EXIT_PROTOCOL;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                // Unparseable input on stdin is protocol misuse.
                error!(error = %e, "Unparseable JSON-RPC frame");
                return EXIT_PROTOCOL;
            }
        };

        if request.is_notification() {
            handle_notification(&core, request).await;
            continue;
        }

        // Requests run concurrently; replies correlate by id, not order.
        let core = core.clone();
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            let id = request.id.clone().unwrap_or(Value::Null);
            let reply = handle_request(&core, &request).await;
            let frame = match reply {
                Ok(result) => response_ok(&id, result),
                Err((code, message)) => response_err(&id, code, &message),
            };
            let _ = out_tx.send(frame);
        });
    }
}

async fn handle_notification(core: &Arc<Core>, request: JsonRpcRequest) {
    match request.method.as_str() {
        "notifications/cancel" => {
            let task_id = request.params["task_id"]
                .as_str()
                .or_else(|| request.params["taskId"].as_str());
            match task_id {
                Some(task_id) => {
                    let cancelled = core.tasks.cancel(task_id).await;
                    debug!(task_id, cancelled, "Cancel notification handled");
                }
                None => warn!("notifications/cancel without task_id"),
            }
        }
        "notifications/initialized" => {}
        other => debug!(method = other, "Ignoring unknown notification"),
    }
}

async fn handle_request(
    core: &Arc<Core>,
    request: &JsonRpcRequest,
) -> std::result::Result<Value, (i64, String)> {
    match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {"listChanged": false},
            },
            "serverInfo": {
                "name": "locus",
                "version": env!("CARGO_PKG_VERSION"),
            },
        })),
        "ping" => Ok(json!({})),
        "tools/list" => {
            // Vendor extension: a context.intent narrows the list to the
            // dynamic selector's top-K.
            let intent = request.params["context"]["intent"].as_str();
            Ok(core.tools_payload(intent, None).await)
        }
        "tools/call" => {
            let name = request.params["name"].as_str().ok_or((
                protocol::INVALID_PARAMS,
                "tools/call requires a name".to_string(),
            ))?;
            let arguments = request
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            match core
                .dispatcher
                .dispatch(name, arguments, Origin::McpJsonRpc)
                .await
            {
                Ok(result) => {
                    let text = result.to_string();
                    Ok(json!({
                        "content": [{"type": "text", "text": text}],
                    }))
                }
                Err(err) => Err((err.kind().json_rpc_code(), err.to_string())),
            }
        }
        other => Err((
            METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    }
}
