// crates/locus-server/src/dispatch/mod.rs
// Tool dispatcher: schema-validated routing to handlers, clients, or tasks

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use locus_types::TaskState;

use crate::bridge::ClientBridge;
use crate::config::{BrokerConfig, EnvConfig};
use crate::error::{BrokerError, Result};
use crate::handlers::{HandlerMap, ToolContext};
use crate::http::{CLIENT_CALL_TIMEOUT, HttpClient, LOCAL_TIMEOUT};
use crate::registry::schema::validate;
use crate::registry::{ExecutionSide, ToolDescriptor, ToolRegistry};
use crate::tasks::{TaskManager, TaskRunner, TaskSpec, cache_key};

/// Where a call came from. Used for tracing only; reply correlation lives
/// in the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    McpJsonRpc,
    Internal,
}

/// Upstream deadline for non-local server handlers. The shared HTTP client
/// already bounds each request; this caps the handler as a whole.
const SERVER_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadline for the best-effort visualization side-call.
const SIDE_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Server-side tools whose successful completion triggers an
/// `open_visualization` side-call to the connected client.
const VISUALIZATION_TOOLS: [&str; 5] = [
    "analyze_interpro_domains",
    "get_protein_structure",
    "get_alphafold_structure",
    "blast_search",
    "evo2_score_variant",
];

/// Routes validated tool calls to a server-side handler, the task manager,
/// or a connected client.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    handlers: HandlerMap,
    bridge: Arc<ClientBridge>,
    tasks: Arc<TaskManager>,
    http: HttpClient,
    config: BrokerConfig,
    env: EnvConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        handlers: HandlerMap,
        bridge: Arc<ClientBridge>,
        tasks: Arc<TaskManager>,
        http: HttpClient,
        config: BrokerConfig,
        env: EnvConfig,
    ) -> Self {
        Self {
            registry,
            handlers,
            bridge,
            tasks,
            http,
            config,
            env,
        }
    }

    fn context(&self, progress: Option<crate::tasks::ProgressReporter>) -> Arc<ToolContext> {
        Arc::new(ToolContext {
            http: self.http.clone(),
            config: self.config.clone(),
            env: self.env.clone(),
            bridge: self.bridge.clone(),
            progress,
        })
    }

    /// Dispatch one tool invocation to completion. For long-running tools
    /// the reply is deferred until the task reaches a terminal state.
    pub async fn dispatch(&self, tool_name: &str, args: Value, origin: Origin) -> Result<Value> {
        let desc = self
            .registry
            .get(tool_name)
            .ok_or_else(|| BrokerError::ToolNotFound(tool_name.to_string()))?;

        let validated = Value::Object(validate(&desc.schema, &args)?);
        debug!(tool = %tool_name, ?origin, "Dispatching tool call");

        let result = if desc.long_running && desc.side == ExecutionSide::Server {
            self.run_as_task(&desc, validated).await
        } else {
            match desc.side {
                ExecutionSide::Server => self.run_server_side(&desc, validated).await,
                ExecutionSide::Client => self.run_client_side(&desc, validated).await,
            }
        };

        if result.is_ok() {
            self.maybe_open_visualization(&desc, result.as_ref().ok());
        }
        result
    }

    async fn run_server_side(&self, desc: &ToolDescriptor, args: Value) -> Result<Value> {
        let handler = self.handlers.get(&desc.name).ok_or_else(|| {
            BrokerError::Internal(format!("no handler registered for `{}`", desc.name))
        })?;
        let deadline = if desc.local {
            LOCAL_TIMEOUT
        } else {
            SERVER_CALL_TIMEOUT
        };
        let ctx = self.context(None);
        match tokio::time::timeout(deadline, handler(args, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::TimedOut),
        }
    }

    async fn run_client_side(&self, desc: &ToolDescriptor, args: Value) -> Result<Value> {
        let explicit = args.get("clientId").and_then(|v| v.as_str());
        let target = self.bridge.select_target(explicit).await?;
        self.bridge
            .invoke(&target, &desc.name, args, CLIENT_CALL_TIMEOUT)
            .await
    }

    async fn run_as_task(&self, desc: &ToolDescriptor, args: Value) -> Result<Value> {
        let handler = self.handlers.get(&desc.name).ok_or_else(|| {
            BrokerError::Internal(format!("no handler registered for `{}`", desc.name))
        })?;
        let key = if desc.cacheable {
            Some(cache_key(&desc.name, &args))
        } else {
            None
        };

        let runner: TaskRunner = {
            let handler = handler.clone();
            let args = args.clone();
            let http = self.http.clone();
            let config = self.config.clone();
            let env = self.env.clone();
            let bridge = self.bridge.clone();
            Arc::new(move |reporter| {
                let ctx = Arc::new(ToolContext {
                    http: http.clone(),
                    config: config.clone(),
                    env: env.clone(),
                    bridge: bridge.clone(),
                    progress: Some(reporter),
                });
                handler(args.clone(), ctx)
            })
        };

        let submitted = self
            .tasks
            .submit(TaskSpec {
                tool: desc.name.clone(),
                args,
                priority: desc.priority,
                timeout: None,
                cache_key: key,
                runner,
            })
            .await?;

        let record = submitted
            .done
            .await
            .map_err(|_| BrokerError::Internal("task manager dropped the task".to_string()))?;

        match record.state {
            TaskState::Succeeded => record.result.ok_or_else(|| {
                BrokerError::Internal("succeeded task carried no result".to_string())
            }),
            TaskState::Cancelled => Err(BrokerError::Cancelled),
            TaskState::TimedOut => Err(BrokerError::TimedOut),
            _ => {
                let error = record.error.unwrap_or(crate::tasks::TaskError {
                    kind: "Internal".to_string(),
                    message: "task failed without error info".to_string(),
                });
                Err(error_from_kind(&error.kind, error.message))
            }
        }
    }

    /// Best-effort `open_visualization` side-call after eligible analyses.
    /// Never alters the call outcome.
    fn maybe_open_visualization(&self, desc: &ToolDescriptor, result: Option<&Value>) {
        if !self.config.auto_open_visualization
            || !VISUALIZATION_TOOLS.contains(&desc.name.as_str())
        {
            return;
        }
        let Some(result) = result else { return };
        let bridge = self.bridge.clone();
        let payload = json!({"tool": desc.name, "result": result});
        let tool = desc.name.clone();
        tokio::spawn(async move {
            match bridge.select_target(None).await {
                Ok(target) => {
                    if let Err(e) = bridge
                        .invoke(&target, "open_visualization", payload, SIDE_CALL_TIMEOUT)
                        .await
                    {
                        debug!(tool = %tool, error = %e, "Visualization side-call failed");
                    }
                }
                Err(_) => {
                    // No single client to address; fall back to a broadcast.
                    bridge.broadcast("open_visualization", payload).await;
                }
            }
        });
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }
}

/// Rebuild a `BrokerError` from a persisted kind string.
fn error_from_kind(kind: &str, message: String) -> BrokerError {
    match kind {
        "ToolNotFound" => BrokerError::ToolNotFound(message),
        "InvalidArguments" => BrokerError::InvalidArguments(message),
        "NoClientAvailable" => BrokerError::NoClientAvailable(message),
        "ClientDisconnected" => BrokerError::ClientDisconnected(message),
        "ClientTimeout" => BrokerError::ClientTimeout(CLIENT_CALL_TIMEOUT),
        "UpstreamError" => BrokerError::Upstream(message),
        "UpstreamRateLimited" => BrokerError::RateLimited(0),
        "NotConfigured" => BrokerError::NotConfigured(message),
        "Cancelled" => BrokerError::Cancelled,
        "TimedOut" => BrokerError::TimedOut,
        "QueueFull" => BrokerError::QueueFull,
        "EmptyClipboard" => BrokerError::EmptyClipboard,
        "UndoNotSupported" => BrokerError::UndoNotSupported(message),
        "Interrupted" => BrokerError::Interrupted,
        _ => BrokerError::Internal(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerMap;
    use crate::tasks::TaskConfig;
    use locus_types::{ClientFrame, ServerFrame};
    use tokio::sync::mpsc;

    fn dispatcher() -> Dispatcher {
        let registry = Arc::new(ToolRegistry::load_catalog().unwrap());
        let bridge = Arc::new(ClientBridge::new());
        let tasks = TaskManager::spawn(TaskConfig::default(), None, None, Default::default());
        Dispatcher::new(
            registry,
            HandlerMap::with_defaults(),
            bridge,
            tasks,
            HttpClient::new(),
            BrokerConfig::default(),
            EnvConfig::default(),
        )
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let d = dispatcher();
        let err = d
            .dispatch("no_such_tool", json!({}), Origin::Internal)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn local_tool_runs_inline() {
        let d = dispatcher();
        let out = d
            .dispatch(
                "compute_gc",
                json!({"sequence": "ATCGATCG"}),
                Origin::McpJsonRpc,
            )
            .await
            .unwrap();
        assert_eq!(out["gcContent"], json!(50));
    }

    #[tokio::test]
    async fn missing_required_is_invalid_arguments() {
        let d = dispatcher();
        let err = d
            .dispatch("translate_dna", json!({"frame": 0}), Origin::McpJsonRpc)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, BrokerError::InvalidArguments(_)));
        assert!(msg.contains("dna"), "message names the property: {msg}");
    }

    #[tokio::test]
    async fn client_tool_without_client_fails() {
        let d = dispatcher();
        let err = d
            .dispatch(
                "navigate_to_position",
                json!({"chromosome": "chr1", "start": 1, "end": 2}),
                Origin::McpJsonRpc,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NoClientAvailable(_)));
    }

    #[tokio::test]
    async fn client_tool_round_trip() {
        let d = dispatcher();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client_id = d.bridge.register(tx).await;

        let bridge = d.bridge.clone();
        let responder = tokio::spawn(async move {
            if let Some(ServerFrame::ToolCall { call_id, tool, .. }) = rx.recv().await {
                assert_eq!(tool, "navigate_to_position");
                bridge
                    .on_frame(
                        &client_id,
                        ClientFrame::ToolResult {
                            call_id,
                            ok: true,
                            data: Some(json!({"ok": true})),
                            error: None,
                        },
                    )
                    .await;
            }
        });

        let out = d
            .dispatch(
                "navigate_to_position",
                json!({"chromosome": "chr1", "start": 1000, "end": 2000}),
                Origin::McpJsonRpc,
            )
            .await
            .unwrap();
        assert_eq!(out["ok"], true);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn long_running_tool_defers_to_terminal_result() {
        let d = dispatcher();
        let out = d
            .dispatch(
                "analyze_interpro_domains",
                json!({"sequence": "MKALIVLGLVLLSVTVQGKVFERCELAR"}),
                Origin::McpJsonRpc,
            )
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        assert!(out["domainCount"].as_i64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn long_running_results_are_cached_bit_identical() {
        let d = dispatcher();
        let args = json!({"sequence": "MKALIVLGLVLLSVTVQGKVFERCELAR"});
        let first = d
            .dispatch("analyze_interpro_domains", args.clone(), Origin::Internal)
            .await
            .unwrap();
        let second = d
            .dispatch("analyze_interpro_domains", args, Origin::Internal)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn error_kind_round_trip() {
        let err = error_from_kind("Cancelled", "whatever".to_string());
        assert!(matches!(err, BrokerError::Cancelled));
        let err = error_from_kind("UpstreamError", "503".to_string());
        assert!(matches!(err, BrokerError::Upstream(_)));
        let err = error_from_kind("mystery", "m".to_string());
        assert!(matches!(err, BrokerError::Internal(_)));
    }
}
