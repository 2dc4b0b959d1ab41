// crates/locus-server/src/config/file.rs
// File-based configuration from ~/.locus/config.toml

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

/// Top-level config structure. Every field has a default; the file is
/// optional and environment values win over file values.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Task manager worker pool size
    #[serde(default = "BrokerConfig::default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Per-task retry cap
    #[serde(default = "BrokerConfig::default_max_retries")]
    pub max_retries: u32,
    /// Per-task timeout in milliseconds
    #[serde(default = "BrokerConfig::default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Soft queue limit; submissions beyond it fail QueueFull
    #[serde(default = "BrokerConfig::default_queue_limit")]
    pub queue_limit: usize,
    #[serde(default = "BrokerConfig::default_enable_cache")]
    pub enable_cache: bool,
    #[serde(default)]
    pub enable_persistence: bool,
    /// Downstream HTTP port (also carries /ws)
    #[serde(default = "BrokerConfig::default_http_port")]
    pub http_port: u16,
    /// Dedicated WebSocket port for interactive clients
    #[serde(default = "BrokerConfig::default_ws_port")]
    pub ws_port: u16,
    /// Emit open_visualization side-calls after eligible analyses
    #[serde(default = "BrokerConfig::default_auto_open_visualization")]
    pub auto_open_visualization: bool,
    /// Per-service upstream settings, keyed by service name
    #[serde(default)]
    pub upstream: BTreeMap<String, UpstreamConfig>,
}

/// One `[upstream.<service>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpstreamConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 3,
            max_retries: 2,
            default_timeout_ms: 300_000,
            queue_limit: 256,
            enable_cache: true,
            enable_persistence: false,
            http_port: 3002,
            ws_port: 3003,
            auto_open_visualization: true,
            upstream: BTreeMap::new(),
        }
    }
}

impl BrokerConfig {
    fn default_max_concurrent_tasks() -> usize {
        3
    }
    fn default_max_retries() -> u32 {
        2
    }
    fn default_timeout_ms() -> u64 {
        300_000
    }
    fn default_queue_limit() -> usize {
        256
    }
    fn default_enable_cache() -> bool {
        true
    }
    fn default_http_port() -> u16 {
        3002
    }
    fn default_ws_port() -> u16 {
        3003
    }
    fn default_auto_open_visualization() -> bool {
        true
    }

    /// Load config from ~/.locus/config.toml, falling back to defaults.
    pub fn load() -> Self {
        let path = Self::config_path();

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    pub fn default_task_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// State directory for the task log and cache spill (~/.locus).
    pub fn state_dir() -> PathBuf {
        home_dir().join(".locus")
    }

    /// Get the config file path (public for CLI config commands).
    pub fn config_path() -> PathBuf {
        Self::state_dir().join("config.toml")
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("HOME directory not set - using current directory for Locus state");
        PathBuf::from(".")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = BrokerConfig::default();
        assert_eq!(config.max_concurrent_tasks, 3);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.default_timeout_ms, 300_000);
        assert_eq!(config.queue_limit, 256);
        assert!(config.enable_cache);
        assert!(!config.enable_persistence);
        assert_eq!(config.http_port, 3002);
        assert_eq!(config.ws_port, 3003);
        assert!(config.auto_open_visualization);
    }

    #[test]
    fn parses_partial_file() {
        let toml = r#"
max_concurrent_tasks = 5
enable_persistence = true

[upstream.ncbi]
api_key = "k"
"#;
        let config: BrokerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_concurrent_tasks, 5);
        assert!(config.enable_persistence);
        assert_eq!(config.max_retries, 2, "unset fields keep defaults");
        assert_eq!(
            config.upstream.get("ncbi").and_then(|u| u.api_key.as_deref()),
            Some("k")
        );
    }
}
