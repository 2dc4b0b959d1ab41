// crates/locus-server/src/handlers/actions.rs
// Clipboard and staged sequence-edit tools
//
// The broker stages edits in the per-client ledger; `execute_actions`
// commits the pending batch on the owning client in submission order.

use std::sync::Arc;

use serde_json::{Value, json};

use locus_types::{Action, ActionKind, ActionStatus, Clipboard, Provenance, Strand};

use crate::bridge::actions::ActionLedger;
use crate::error::{BrokerError, Result};
use crate::http::CLIENT_CALL_TIMEOUT;

use super::{HandlerMap, ToolContext, int_arg, opt_str_arg, str_arg};

pub fn register(map: &mut HandlerMap) {
    map.insert("copy_sequence", |args, ctx| Box::pin(copy(args, ctx)));
    map.insert("cut_sequence", |args, ctx| Box::pin(cut(args, ctx)));
    map.insert("paste_sequence", |args, ctx| Box::pin(paste(args, ctx)));
    map.insert("delete_region", |args, ctx| Box::pin(delete(args, ctx)));
    map.insert("insert_sequence", |args, ctx| Box::pin(insert(args, ctx)));
    map.insert("replace_region", |args, ctx| Box::pin(replace(args, ctx)));
    map.insert("get_action_list", |args, ctx| Box::pin(action_list(args, ctx)));
    map.insert("execute_actions", |args, ctx| Box::pin(execute(args, ctx)));
    map.insert("clear_actions", |args, ctx| Box::pin(clear(args, ctx)));
    map.insert("undo_last_action", |args, ctx| Box::pin(undo(args, ctx)));
}

async fn target(ctx: &ToolContext, args: &Value) -> Result<String> {
    ctx.bridge
        .select_target(opt_str_arg(args, "clientId"))
        .await
}

fn strand_arg(args: &Value) -> Strand {
    match opt_str_arg(args, "strand") {
        Some("-") => Strand::Reverse,
        _ => Strand::Forward,
    }
}

fn status_arg(args: &Value, name: &str) -> Result<Option<ActionStatus>> {
    match opt_str_arg(args, name) {
        None => Ok(None),
        Some("pending") => Ok(Some(ActionStatus::Pending)),
        Some("committed") => Ok(Some(ActionStatus::Committed)),
        Some("failed") => Ok(Some(ActionStatus::Failed)),
        Some("undone") => Ok(Some(ActionStatus::Undone)),
        Some(other) => Err(BrokerError::InvalidArguments(format!(
            "unknown status `{other}`"
        ))),
    }
}

fn new_action_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Resolve the region's sequence: trust a caller-provided `sequence`
/// argument, otherwise read it from the owning client.
async fn region_sequence(
    ctx: &ToolContext,
    client_id: &str,
    args: &Value,
    chromosome: &str,
    start: i64,
    end: i64,
    strand: Strand,
) -> Result<String> {
    if let Some(provided) = opt_str_arg(args, "sequence") {
        return Ok(provided.to_string());
    }
    let strand_str = match strand {
        Strand::Forward => "+",
        Strand::Reverse => "-",
    };
    let data = ctx
        .bridge
        .invoke(
            client_id,
            "get_sequence_region",
            json!({
                "chromosome": chromosome,
                "start": start,
                "end": end,
                "strand": strand_str,
            }),
            CLIENT_CALL_TIMEOUT,
        )
        .await?;
    data["sequence"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| {
            BrokerError::Internal("client returned no sequence for the region".to_string())
        })
}

async fn copy(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let client_id = target(&ctx, &args).await?;
    let chromosome = str_arg(&args, "chromosome")?.to_string();
    let start = int_arg(&args, "start")?;
    let end = int_arg(&args, "end")?;
    if start > end {
        return Err(BrokerError::InvalidArguments(format!(
            "start {start} is after end {end}"
        )));
    }
    let strand = strand_arg(&args);

    let sequence = region_sequence(&ctx, &client_id, &args, &chromosome, start, end, strand).await?;
    let clipboard = Clipboard {
        sequence: sequence.clone(),
        provenance: Provenance {
            chromosome: chromosome.clone(),
            start,
            end,
            strand,
        },
    };
    ctx.bridge
        .with_ledger(&client_id, |ledger| ledger.set_clipboard(clipboard))
        .await?;

    Ok(json!({
        "success": true,
        "copied": sequence.len(),
        "region": {"chromosome": chromosome, "start": start, "end": end},
    }))
}

async fn cut(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let client_id = target(&ctx, &args).await?;
    let chromosome = str_arg(&args, "chromosome")?.to_string();
    let start = int_arg(&args, "start")?;
    let end = int_arg(&args, "end")?;
    if start > end {
        return Err(BrokerError::InvalidArguments(format!(
            "start {start} is after end {end}"
        )));
    }
    let strand = strand_arg(&args);

    let sequence = region_sequence(&ctx, &client_id, &args, &chromosome, start, end, strand).await?;
    let action = Action {
        action_id: new_action_id(),
        kind: ActionKind::Cut,
        chromosome: chromosome.clone(),
        start: Some(start),
        end: Some(end),
        position: None,
        // Captured so the staged deletion stays undoable.
        sequence: Some(sequence.clone()),
        strand,
        status: ActionStatus::Pending,
        replaced_sequence: None,
    };
    let action_id = action.action_id.clone();
    ctx.bridge
        .with_ledger(&client_id, |ledger| {
            ledger.set_clipboard(Clipboard {
                sequence: sequence.clone(),
                provenance: Provenance {
                    chromosome: chromosome.clone(),
                    start,
                    end,
                    strand,
                },
            });
            ledger.stage(action)
        })
        .await??;

    Ok(json!({
        "success": true,
        "actionId": action_id,
        "staged": "delete",
        "copied": true,
    }))
}

async fn paste(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let client_id = target(&ctx, &args).await?;
    let chromosome = str_arg(&args, "chromosome")?.to_string();
    let position = int_arg(&args, "position")?;

    let clipboard = ctx
        .bridge
        .with_ledger(&client_id, |ledger| ledger.clipboard().cloned())
        .await?
        .ok_or(BrokerError::EmptyClipboard)?;

    let action = Action {
        action_id: new_action_id(),
        kind: ActionKind::Paste,
        chromosome,
        start: None,
        end: None,
        position: Some(position),
        sequence: Some(clipboard.sequence),
        strand: clipboard.provenance.strand,
        status: ActionStatus::Pending,
        replaced_sequence: None,
    };
    let action_id = action.action_id.clone();
    ctx.bridge
        .with_ledger(&client_id, |ledger| ledger.stage(action))
        .await??;

    Ok(json!({"success": true, "actionId": action_id, "staged": "insert"}))
}

async fn delete(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let client_id = target(&ctx, &args).await?;
    let action = Action {
        action_id: new_action_id(),
        kind: ActionKind::Delete,
        chromosome: str_arg(&args, "chromosome")?.to_string(),
        start: Some(int_arg(&args, "start")?),
        end: Some(int_arg(&args, "end")?),
        position: None,
        sequence: opt_str_arg(&args, "sequence").map(|s| s.to_string()),
        strand: strand_arg(&args),
        status: ActionStatus::Pending,
        replaced_sequence: None,
    };
    let action_id = action.action_id.clone();
    ctx.bridge
        .with_ledger(&client_id, |ledger| ledger.stage(action))
        .await??;
    Ok(json!({"success": true, "actionId": action_id, "staged": "delete"}))
}

async fn insert(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let client_id = target(&ctx, &args).await?;
    let action = Action {
        action_id: new_action_id(),
        kind: ActionKind::Insert,
        chromosome: str_arg(&args, "chromosome")?.to_string(),
        start: None,
        end: None,
        position: Some(int_arg(&args, "position")?),
        sequence: Some(str_arg(&args, "sequence")?.to_uppercase()),
        strand: strand_arg(&args),
        status: ActionStatus::Pending,
        replaced_sequence: None,
    };
    let action_id = action.action_id.clone();
    ctx.bridge
        .with_ledger(&client_id, |ledger| ledger.stage(action))
        .await??;
    Ok(json!({"success": true, "actionId": action_id, "staged": "insert"}))
}

async fn replace(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let client_id = target(&ctx, &args).await?;
    let action = Action {
        action_id: new_action_id(),
        kind: ActionKind::Replace,
        chromosome: str_arg(&args, "chromosome")?.to_string(),
        start: Some(int_arg(&args, "start")?),
        end: Some(int_arg(&args, "end")?),
        position: None,
        sequence: Some(str_arg(&args, "sequence")?.to_uppercase()),
        strand: strand_arg(&args),
        status: ActionStatus::Pending,
        replaced_sequence: None,
    };
    let action_id = action.action_id.clone();
    ctx.bridge
        .with_ledger(&client_id, |ledger| ledger.stage(action))
        .await??;
    Ok(json!({"success": true, "actionId": action_id, "staged": "replace"}))
}

async fn action_list(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let client_id = target(&ctx, &args).await?;
    let status = status_arg(&args, "status")?;
    let actions = ctx
        .bridge
        .with_ledger(&client_id, |ledger| ledger.list(status))
        .await?;
    Ok(json!({
        "success": true,
        "count": actions.len(),
        "actions": actions,
    }))
}

async fn clear(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let client_id = target(&ctx, &args).await?;
    let status = status_arg(&args, "status")?.unwrap_or(ActionStatus::Pending);
    let removed = ctx
        .bridge
        .with_ledger(&client_id, |ledger| ledger.clear(status))
        .await?;
    Ok(json!({"success": true, "removed": removed}))
}

/// Commit the pending batch on the client. Committed actions stay committed
/// when a later action fails; the remainder is marked failed. No rollback.
async fn execute(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let client_id = target(&ctx, &args).await?;
    let batch = ctx
        .bridge
        .with_ledger(&client_id, |ledger| ledger.take_pending())
        .await?;
    if batch.is_empty() {
        return Ok(json!({"success": true, "committed": 0, "message": "no pending actions"}));
    }

    let outcome = ctx
        .bridge
        .invoke(
            &client_id,
            "execute_actions",
            json!({"actions": &batch}),
            CLIENT_CALL_TIMEOUT,
        )
        .await;

    match outcome {
        Ok(data) => {
            let failed_ids: Vec<String> = data["failed"]
                .as_array()
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| id.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            let originals = data["originals"].clone();

            let mut committed = 0usize;
            let mut failed = 0usize;
            ctx.bridge
                .with_ledger(&client_id, |ledger| {
                    for action in batch {
                        if failed_ids.contains(&action.action_id) {
                            failed += 1;
                            ledger.fail(action);
                        } else {
                            committed += 1;
                            let original = originals[&action.action_id]
                                .as_str()
                                .map(|s| s.to_string());
                            ledger.commit(action, original);
                        }
                    }
                })
                .await?;

            Ok(json!({
                "success": failed == 0,
                "committed": committed,
                "failed": failed,
            }))
        }
        Err(err) => {
            // The client never acknowledged: nothing committed, all failed.
            ctx.bridge
                .with_ledger(&client_id, |ledger| {
                    for action in batch {
                        ledger.fail(action);
                    }
                })
                .await?;
            Err(err)
        }
    }
}

async fn undo(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let client_id = target(&ctx, &args).await?;
    let candidate = ctx
        .bridge
        .with_ledger(&client_id, |ledger| ledger.undo_candidate().cloned())
        .await?
        .ok_or_else(|| {
            BrokerError::UndoNotSupported("no committed actions to undo".to_string())
        })?;

    let inverse = ActionLedger::build_inverse(&candidate, new_action_id())?;
    ctx.bridge
        .invoke(
            &client_id,
            "execute_actions",
            json!({"actions": [inverse.clone()]}),
            CLIENT_CALL_TIMEOUT,
        )
        .await?;

    ctx.bridge
        .with_ledger(&client_id, |ledger| {
            ledger.mark_undone(&candidate.action_id);
            ledger.commit(inverse.clone(), None);
        })
        .await?;

    Ok(json!({
        "success": true,
        "undone": candidate.action_id,
        "inverse": inverse.action_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ClientBridge;
    use crate::config::{BrokerConfig, EnvConfig};
    use crate::http::HttpClient;
    use locus_types::{ClientFrame, ServerFrame};
    use tokio::sync::mpsc;

    async fn ctx_with_client() -> (
        Arc<ToolContext>,
        String,
        mpsc::UnboundedReceiver<ServerFrame>,
    ) {
        let bridge = Arc::new(ClientBridge::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = bridge.register(tx).await;
        let ctx = Arc::new(ToolContext {
            http: HttpClient::new(),
            config: BrokerConfig::default(),
            env: EnvConfig::default(),
            bridge,
            progress: None,
        });
        (ctx, client_id, rx)
    }

    /// Answer the next `execute_actions` call on the wire with success.
    fn auto_ack(
        ctx: Arc<ToolContext>,
        client_id: String,
        mut rx: mpsc::UnboundedReceiver<ServerFrame>,
        reply: Value,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let ServerFrame::ToolCall { call_id, .. } = frame {
                    ctx.bridge
                        .on_frame(
                            &client_id,
                            ClientFrame::ToolResult {
                                call_id,
                                ok: true,
                                data: Some(reply.clone()),
                                error: None,
                            },
                        )
                        .await;
                }
            }
        })
    }

    #[tokio::test]
    async fn paste_without_clipboard_fails() {
        let (ctx, _client, _rx) = ctx_with_client().await;
        let err = paste(json!({"chromosome": "chr1", "position": 5}), ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::EmptyClipboard));
    }

    #[tokio::test]
    async fn copy_then_paste_stages_insert() {
        let (ctx, _client, _rx) = ctx_with_client().await;

        // Caller provides the sequence, so no client round-trip is needed.
        let copied = copy(
            json!({"chromosome": "chr1", "start": 10, "end": 13, "sequence": "ATCG"}),
            ctx.clone(),
        )
        .await
        .unwrap();
        assert_eq!(copied["copied"], 4);

        let pasted = paste(json!({"chromosome": "chr1", "position": 50}), ctx.clone())
            .await
            .unwrap();
        assert_eq!(pasted["staged"], "insert");

        let listed = action_list(json!({}), ctx).await.unwrap();
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["actions"][0]["kind"], "paste");
    }

    #[tokio::test]
    async fn cut_stages_delete_and_fills_clipboard() {
        let (ctx, _client, _rx) = ctx_with_client().await;
        let out = cut(
            json!({"chromosome": "chr2", "start": 5, "end": 8, "sequence": "GGCC"}),
            ctx.clone(),
        )
        .await
        .unwrap();
        assert_eq!(out["staged"], "delete");

        let pasted = paste(json!({"chromosome": "chr2", "position": 100}), ctx)
            .await
            .unwrap();
        assert_eq!(pasted["success"], true);
    }

    #[tokio::test]
    async fn execute_commits_in_order() {
        let (ctx, client_id, rx) = ctx_with_client().await;
        insert(
            json!({"chromosome": "chr1", "position": 5, "sequence": "AT"}),
            ctx.clone(),
        )
        .await
        .unwrap();
        delete(
            json!({"chromosome": "chr1", "start": 10, "end": 20}),
            ctx.clone(),
        )
        .await
        .unwrap();

        let _ack = auto_ack(ctx.clone(), client_id, rx, json!({}));
        let out = execute(json!({}), ctx.clone()).await.unwrap();
        assert_eq!(out["committed"], 2);
        assert_eq!(out["failed"], 0);

        let history = action_list(json!({"status": "committed"}), ctx).await.unwrap();
        assert_eq!(history["count"], 2);
    }

    #[tokio::test]
    async fn execute_partial_failure_keeps_committed() {
        let (ctx, client_id, rx) = ctx_with_client().await;
        let first = insert(
            json!({"chromosome": "chr1", "position": 5, "sequence": "AT"}),
            ctx.clone(),
        )
        .await
        .unwrap();
        let second = insert(
            json!({"chromosome": "chr1", "position": 9, "sequence": "GC"}),
            ctx.clone(),
        )
        .await
        .unwrap();
        let failing_id = second["actionId"].as_str().unwrap().to_string();
        let _ = first;

        let _ack = auto_ack(
            ctx.clone(),
            client_id,
            rx,
            json!({"failed": [failing_id]}),
        );
        let out = execute(json!({}), ctx.clone()).await.unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["committed"], 1);
        assert_eq!(out["failed"], 1);

        // Committed actions are not rolled back.
        let committed = action_list(json!({"status": "committed"}), ctx.clone())
            .await
            .unwrap();
        assert_eq!(committed["count"], 1);
        let failed = action_list(json!({"status": "failed"}), ctx).await.unwrap();
        assert_eq!(failed["count"], 1);
    }

    #[tokio::test]
    async fn undo_reissues_the_inverse() {
        let (ctx, client_id, rx) = ctx_with_client().await;
        insert(
            json!({"chromosome": "chr1", "position": 5, "sequence": "ATCG"}),
            ctx.clone(),
        )
        .await
        .unwrap();

        let _ack = auto_ack(ctx.clone(), client_id, rx, json!({}));
        execute(json!({}), ctx.clone()).await.unwrap();

        let out = undo(json!({}), ctx.clone()).await.unwrap();
        assert_eq!(out["success"], true);

        let undone = action_list(json!({"status": "undone"}), ctx.clone())
            .await
            .unwrap();
        assert_eq!(undone["count"], 1);
        // The inverse delete is now the newest committed entry.
        let committed = action_list(json!({"status": "committed"}), ctx).await.unwrap();
        assert_eq!(committed["actions"][0]["kind"], "delete");
    }

    #[tokio::test]
    async fn no_client_fails_selection() {
        let bridge = Arc::new(ClientBridge::new());
        let ctx = Arc::new(ToolContext {
            http: HttpClient::new(),
            config: BrokerConfig::default(),
            env: EnvConfig::default(),
            bridge,
            progress: None,
        });
        let err = action_list(json!({}), ctx).await.unwrap_err();
        assert!(matches!(err, BrokerError::NoClientAvailable(_)));
    }
}
