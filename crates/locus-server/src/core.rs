// crates/locus-server/src/core.rs
// Broker core: every subsystem, created once at startup and passed through

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::bridge::ClientBridge;
use crate::config::{BrokerConfig, EnvConfig};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::handlers::HandlerMap;
use crate::http::HttpClient;
use crate::registry::{ListFilter, ToolRegistry};
use crate::select::{DEFAULT_K, DynamicSelector};
use crate::tasks::persist::{CacheFile, TaskLog};
use crate::tasks::{TaskConfig, TaskManager};

/// The assembled broker. Tests build a fresh `Core` per case; there is no
/// global mutable state.
pub struct Core {
    pub config: BrokerConfig,
    pub env: EnvConfig,
    pub registry: Arc<ToolRegistry>,
    pub bridge: Arc<ClientBridge>,
    pub tasks: Arc<TaskManager>,
    pub dispatcher: Dispatcher,
    pub selector: DynamicSelector,
}

impl Core {
    /// Build every subsystem. Fails (startup error, exit code 1) on an
    /// invalid tool catalogue or unreadable persistence files.
    pub async fn new(config: BrokerConfig, env: EnvConfig) -> Result<Arc<Core>> {
        let registry = Arc::new(ToolRegistry::load_catalog()?);
        info!(tools = registry.len(), "Tool catalogue loaded");

        let bridge = Arc::new(ClientBridge::new());
        let http = HttpClient::new();

        let (task_log, cache_file, preloaded_cache) = if config.enable_persistence {
            let state_dir = BrokerConfig::state_dir();
            let log = TaskLog::new(state_dir.join("tasks.jsonl"));
            match log.mark_interrupted().await {
                Ok(0) => {}
                Ok(count) => warn!(count, "Marked interrupted tasks from previous run"),
                Err(e) => warn!(error = %e, "Could not scan task log"),
            }
            let cache_file = CacheFile::new(state_dir.join("cache.jsonl"));
            let preloaded = if config.enable_cache {
                match cache_file.load_compacted().await {
                    Ok(entries) => {
                        if !entries.is_empty() {
                            info!(entries = entries.len(), "Result cache restored");
                        }
                        entries
                    }
                    Err(e) => {
                        warn!(error = %e, "Could not load cache file");
                        HashMap::new()
                    }
                }
            } else {
                HashMap::new()
            };
            (Some(log), Some(cache_file), preloaded)
        } else {
            (None, None, HashMap::new())
        };

        let tasks = TaskManager::spawn(
            TaskConfig::from(&config),
            task_log,
            cache_file,
            preloaded_cache,
        );

        let dispatcher = Dispatcher::new(
            registry.clone(),
            HandlerMap::with_defaults(),
            bridge.clone(),
            tasks.clone(),
            http,
            config.clone(),
            env.clone(),
        );
        let selector = DynamicSelector::new(registry.clone());

        Ok(Arc::new(Core {
            config,
            env,
            registry,
            bridge,
            tasks,
            dispatcher,
            selector,
        }))
    }

    /// Core with defaults, no persistence. Test/CLI convenience.
    pub async fn with_defaults() -> Result<Arc<Core>> {
        Self::new(BrokerConfig::default(), EnvConfig::default()).await
    }

    /// Effective downstream HTTP port.
    pub fn http_port(&self) -> u16 {
        self.env.http_port.unwrap_or(self.config.http_port)
    }

    /// Dedicated WebSocket port for interactive clients.
    pub fn ws_port(&self) -> u16 {
        self.config.ws_port
    }

    /// The `tools/list` payload. With an intent, the dynamic selector's
    /// top-K is returned instead of the full catalogue.
    pub async fn tools_payload(&self, intent: Option<&str>, filter: Option<&ListFilter>) -> Value {
        let descriptors = match intent {
            Some(intent) => {
                let context = self.bridge.any_state().await.map(|s| json!({"current_state": s}));
                self.selector
                    .select(intent, context.as_ref(), DEFAULT_K)
                    .await
                    .as_ref()
                    .clone()
            }
            None => self.registry.list(filter),
        };
        let tools: Vec<Value> = descriptors
            .iter()
            .map(|desc| {
                json!({
                    "name": desc.name,
                    "description": desc.description,
                    "inputSchema": desc.schema.to_input_schema(),
                })
            })
            .collect();
        json!({"tools": tools})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_core_builds() {
        let core = Core::with_defaults().await.unwrap();
        assert!(core.registry.len() >= 70);
        assert_eq!(core.bridge.client_count().await, 0);
    }

    #[tokio::test]
    async fn tools_payload_full_and_selected() {
        let core = Core::with_defaults().await.unwrap();
        let all = core.tools_payload(None, None).await;
        let count = all["tools"].as_array().unwrap().len();
        assert_eq!(count, core.registry.len());
        // MCP shape
        assert!(all["tools"][0]["inputSchema"]["type"] == "object");

        let selected = core.tools_payload(Some("blast search"), None).await;
        let selected_count = selected["tools"].as_array().unwrap().len();
        assert!(selected_count <= 10);
        assert!(selected_count >= 1);
    }
}
