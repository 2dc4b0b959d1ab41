// crates/locus-server/src/web/ws.rs
// WebSocket endpoint for interactive clients

use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use locus_types::{ClientFrame, ServerFrame};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::AppState;

/// Close code for framing violations (non-JSON, missing `type`).
const CLOSE_UNSUPPORTED: u16 = 1003;

/// WebSocket upgrade handler.
pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Connection lifecycle: register with the bridge, pump frames both ways,
/// deregister on close. A framing violation closes with 1003.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
    let (close_tx, mut close_rx) = oneshot::channel::<u16>();

    let client_id = state.core.bridge.register(tx).await;
    debug!(client_id = %client_id, "WebSocket client connected");

    // Writer: outbound frames from the bridge, plus the close handshake.
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(frame) => {
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(error = %e, "Failed to serialize outbound frame");
                                continue;
                            }
                        };
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                code = &mut close_rx => {
                    if let Ok(code) = code {
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code,
                                reason: "unsupported frame".into(),
                            })))
                            .await;
                    }
                    break;
                }
            }
        }
    });

    // Reader: parse inbound frames and hand them to the bridge.
    let mut close_tx = Some(close_tx);
    while let Some(next) = stream.next().await {
        match next {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<ClientFrame>(text.as_str()) {
                    Ok(frame) => state.core.bridge.on_frame(&client_id, frame).await,
                    Err(e) => {
                        warn!(client_id = %client_id, error = %e, "Framing violation, closing");
                        if let Some(close_tx) = close_tx.take() {
                            let _ = close_tx.send(CLOSE_UNSUPPORTED);
                        }
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(_) => {
                // Binary framing is not negotiated.
                warn!(client_id = %client_id, "Unexpected binary frame, closing");
                if let Some(close_tx) = close_tx.take() {
                    let _ = close_tx.send(CLOSE_UNSUPPORTED);
                }
                break;
            }
            Err(e) => {
                debug!(client_id = %client_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    state.core.bridge.deregister(&client_id).await;
    let _ = writer.await;
    debug!(client_id = %client_id, "WebSocket client disconnected");
}
