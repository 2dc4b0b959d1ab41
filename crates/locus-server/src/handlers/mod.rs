// crates/locus-server/src/handlers/mod.rs
// Server-side tool handlers and the data-driven dispatch table

pub mod actions;
pub mod coordination;
pub mod evo2;
pub mod external;
pub mod interpro;
pub mod ncbi;
pub mod pathway;
pub mod protein;
pub mod seq;
pub mod uniprot;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::bridge::ClientBridge;
use crate::config::{BrokerConfig, EnvConfig};
use crate::error::{BrokerError, Result};
use crate::http::HttpClient;
use crate::tasks::ProgressReporter;

/// Everything a handler may need, passed explicitly. Handlers never hold a
/// back-reference to the server.
pub struct ToolContext {
    pub http: HttpClient,
    pub config: BrokerConfig,
    pub env: EnvConfig,
    pub bridge: Arc<ClientBridge>,
    /// Present when the call runs under the task manager.
    pub progress: Option<ProgressReporter>,
}

impl ToolContext {
    /// Report progress when running as a task; a no-op otherwise.
    /// Also a cancellation observation point.
    pub async fn progress(&self, pct: u8, message: &str) -> Result<()> {
        match &self.progress {
            Some(reporter) => reporter.update(pct, message).await,
            None => Ok(()),
        }
    }

    /// Cancellation observation point for I/O boundaries.
    pub fn checkpoint(&self) -> Result<()> {
        match &self.progress {
            Some(reporter) => reporter.checkpoint(),
            None => Ok(()),
        }
    }

    /// Look up an upstream API key: environment first, then config file.
    pub fn upstream_key(&self, service: &str) -> Option<String> {
        let from_env = match service {
            "ncbi" => self.env.api_keys.ncbi.clone(),
            "evo2" => self.env.api_keys.evo2_key.clone(),
            _ => None,
        };
        from_env.or_else(|| {
            self.config
                .upstream
                .get(service)
                .and_then(|u| u.api_key.clone())
        })
    }
}

/// Boxed future every handler returns.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// One registered handler closure.
pub type Handler = Arc<dyn Fn(Value, Arc<ToolContext>) -> HandlerFuture + Send + Sync>;

/// Name -> handler table. Populated once at startup by the family modules;
/// dispatch is a map lookup, never a name match.
#[derive(Default)]
pub struct HandlerMap {
    inner: HashMap<String, Handler>,
}

impl HandlerMap {
    /// Build the table with every server-side handler family registered.
    pub fn with_defaults() -> Self {
        let mut map = Self::default();
        seq::register(&mut map);
        uniprot::register(&mut map);
        interpro::register(&mut map);
        protein::register(&mut map);
        ncbi::register(&mut map);
        evo2::register(&mut map);
        pathway::register(&mut map);
        actions::register(&mut map);
        coordination::register(&mut map);
        external::register(&mut map);
        map
    }

    pub fn insert<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(Value, Arc<ToolContext>) -> HandlerFuture + Send + Sync + 'static,
    {
        self.inner.insert(name.to_string(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.inner.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.keys().map(|k| k.as_str()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

// Argument accessors. Validation has already checked types; these guard the
// extraction anyway so handlers stay total.

pub(crate) fn obj(args: &Value) -> Result<&Map<String, Value>> {
    args.as_object()
        .ok_or_else(|| BrokerError::InvalidArguments("arguments must be an object".to_string()))
}

pub(crate) fn str_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str> {
    obj(args)?
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| BrokerError::InvalidArguments(format!("missing required property `{name}`")))
}

pub(crate) fn opt_str_arg<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name).and_then(|v| v.as_str())
}

pub(crate) fn int_arg(args: &Value, name: &str) -> Result<i64> {
    args.get(name)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .ok_or_else(|| BrokerError::InvalidArguments(format!("missing required property `{name}`")))
}

pub(crate) fn opt_int_arg(args: &Value, name: &str) -> Option<i64> {
    args.get(name)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
}

pub(crate) fn opt_f64_arg(args: &Value, name: &str) -> Option<f64> {
    args.get(name).and_then(|v| v.as_f64())
}

pub(crate) fn bool_arg(args: &Value, name: &str, default: bool) -> bool {
    args.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
}

/// The `limit` pagination argument, clamped to a sane range.
pub(crate) fn limit_arg(args: &Value, default: i64) -> i64 {
    opt_int_arg(args, "limit").unwrap_or(default).clamp(1, 500)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handler_table_covers_every_server_tool() {
        let registry = crate::registry::ToolRegistry::load_catalog().unwrap();
        let map = HandlerMap::with_defaults();
        for desc in registry.list(None) {
            if desc.side == crate::registry::ExecutionSide::Server {
                assert!(
                    map.get(&desc.name).is_some(),
                    "no handler registered for server tool `{}`",
                    desc.name
                );
            }
        }
    }

    #[test]
    fn no_orphan_handlers() {
        let registry = crate::registry::ToolRegistry::load_catalog().unwrap();
        let map = HandlerMap::with_defaults();
        for name in map.names() {
            assert!(
                registry.get(name).is_some(),
                "handler `{name}` has no descriptor"
            );
        }
    }

    #[test]
    fn arg_accessors() {
        let args = json!({"s": "x", "n": 3, "f": 2.5, "b": true});
        assert_eq!(str_arg(&args, "s").unwrap(), "x");
        assert!(str_arg(&args, "missing").is_err());
        assert_eq!(int_arg(&args, "n").unwrap(), 3);
        assert_eq!(int_arg(&args, "f").unwrap(), 2);
        assert_eq!(opt_f64_arg(&args, "f"), Some(2.5));
        assert!(bool_arg(&args, "b", false));
        assert_eq!(limit_arg(&args, 10), 10);
        assert_eq!(limit_arg(&json!({"limit": 9999}), 10), 500);
    }
}
