// crates/locus-server/src/handlers/coordination.rs
// Client coordination: listings, state snapshots, broadcast notifications

use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::Result;

use super::{HandlerMap, ToolContext, opt_str_arg, str_arg};

pub fn register(map: &mut HandlerMap) {
    map.insert("list_clients", |args, ctx| Box::pin(list_clients(args, ctx)));
    map.insert("get_client_state", |args, ctx| {
        Box::pin(client_state(args, ctx))
    });
    map.insert("notify_clients", |args, ctx| Box::pin(notify(args, ctx)));
}

async fn list_clients(_args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let clients = ctx.bridge.clients_info().await;
    Ok(json!({
        "success": true,
        "count": clients.len(),
        "clients": clients,
    }))
}

async fn client_state(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let client_id = ctx
        .bridge
        .select_target(opt_str_arg(&args, "clientId"))
        .await?;
    let snapshot = ctx.bridge.last_state(&client_id).await.unwrap_or(Value::Null);
    Ok(json!({
        "success": true,
        "clientId": client_id,
        "state": snapshot,
    }))
}

async fn notify(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let event = str_arg(&args, "event")?;
    let payload = args.get("payload").cloned().unwrap_or_else(|| json!({}));
    let count = ctx.bridge.client_count().await;
    ctx.bridge.broadcast(event, payload).await;
    Ok(json!({"success": true, "notified": count}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ClientBridge;
    use crate::config::{BrokerConfig, EnvConfig};
    use crate::http::HttpClient;
    use locus_types::{ClientFrame, ServerFrame};
    use tokio::sync::mpsc;

    fn ctx_for(bridge: Arc<ClientBridge>) -> Arc<ToolContext> {
        Arc::new(ToolContext {
            http: HttpClient::new(),
            config: BrokerConfig::default(),
            env: EnvConfig::default(),
            bridge,
            progress: None,
        })
    }

    #[tokio::test]
    async fn list_and_state() {
        let bridge = Arc::new(ClientBridge::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let client_id = bridge.register(tx).await;
        bridge
            .on_frame(
                &client_id,
                ClientFrame::StateUpdate {
                    snapshot: json!({"chromosome": "chr7"}),
                },
            )
            .await;

        let ctx = ctx_for(bridge);
        let listed = list_clients(json!({}), ctx.clone()).await.unwrap();
        assert_eq!(listed["count"], 1);

        let state = client_state(json!({}), ctx).await.unwrap();
        assert_eq!(state["state"]["chromosome"], "chr7");
    }

    #[tokio::test]
    async fn notify_reaches_all_clients() {
        let bridge = Arc::new(ClientBridge::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        bridge.register(tx).await;

        let ctx = ctx_for(bridge);
        let out = notify(
            json!({"event": "analysis_done", "payload": {"tool": "blast_search"}}),
            ctx,
        )
        .await
        .unwrap();
        assert_eq!(out["notified"], 1);

        match rx.recv().await.unwrap() {
            ServerFrame::Event { event, payload } => {
                assert_eq!(event, "analysis_done");
                assert_eq!(payload["tool"], "blast_search");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
