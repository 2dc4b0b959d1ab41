// crates/locus-server/src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use tracing::{debug, warn};

/// API credentials loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// NCBI E-utilities key (NCBI_API_KEY) - optional, raises rate limits
    pub ncbi: Option<String>,
    /// EVO2 inference endpoint (EVO2_API_URL)
    pub evo2_url: Option<String>,
    /// EVO2 bearer token (EVO2_API_KEY)
    pub evo2_key: Option<String>,
}

impl ApiKeys {
    /// Load API keys from environment variables.
    pub fn from_env() -> Self {
        let keys = Self {
            ncbi: read_var("NCBI_API_KEY"),
            evo2_url: read_var("EVO2_API_URL"),
            evo2_key: read_var("EVO2_API_KEY"),
        };
        keys.log_status();
        keys
    }

    /// Is real EVO2 inference available, or only the simulated fallback?
    pub fn has_evo2(&self) -> bool {
        self.evo2_url.is_some()
    }

    /// Log which credentials are available (without exposing values).
    fn log_status(&self) {
        let mut available = Vec::new();
        if self.ncbi.is_some() {
            available.push("NCBI");
        }
        if self.evo2_url.is_some() {
            available.push("EVO2");
        }
        if available.is_empty() {
            debug!("No upstream credentials configured - EVO2 tools use the simulated fallback");
        } else {
            debug!(keys = ?available, "Upstream credentials loaded");
        }
    }
}

/// Environment configuration snapshot taken once at startup.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub api_keys: ApiKeys,
    /// HTTP/WebSocket port override (LOCUS_HTTP_PORT)
    pub http_port: Option<u16>,
    /// Log level override (LOCUS_LOG)
    pub log_level: Option<String>,
}

impl EnvConfig {
    pub fn load() -> Self {
        let http_port = match read_var("LOCUS_HTTP_PORT") {
            Some(raw) => match raw.parse::<u16>() {
                Ok(port) => Some(port),
                Err(_) => {
                    warn!("Ignoring unparseable LOCUS_HTTP_PORT={raw:?}");
                    None
                }
            },
            None => None,
        };

        Self {
            api_keys: ApiKeys::from_env(),
            http_port,
            log_level: read_var("LOCUS_LOG"),
        }
    }
}

/// Read a single env var, filtering empty values.
fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_values_are_filtered() {
        // SAFETY: test-local env mutation; no other test reads this name.
        unsafe { std::env::set_var("LOCUS_TEST_EMPTY_VAR", "  ") };
        assert_eq!(read_var("LOCUS_TEST_EMPTY_VAR"), None);
        unsafe { std::env::remove_var("LOCUS_TEST_EMPTY_VAR") };
    }

    #[test]
    fn default_has_no_evo2() {
        let keys = ApiKeys::default();
        assert!(!keys.has_evo2());
    }
}
