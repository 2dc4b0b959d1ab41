// crates/locus-server/src/http.rs
// Shared HTTP client for all upstream REST calls

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::error::{BrokerError, Result};

/// Global request timeout for upstream calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for pure-local handlers (no network)
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for calls forwarded to an interactive client
pub const CLIENT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry cap for upstream calls (network errors, 5xx, 429)
const MAX_RETRIES: u32 = 2;

/// Base backoff before the exponential factor
const BACKOFF_BASE_MS: u64 = 500;

/// At most this many in-flight requests per upstream host
const PER_HOST_CONCURRENCY: usize = 4;

/// Create the shared reqwest client with appropriate defaults.
///
/// Created once at startup and passed to all modules that need HTTP access.
pub fn create_shared_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(PER_HOST_CONCURRENCY)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Retrying wrapper over the shared reqwest client.
///
/// Network errors and 5xx responses retry with exponential backoff and
/// jitter; a 429 honours `Retry-After` before retrying and counts against
/// the same retry budget. Error messages carry host + path only, never
/// query strings (credentials ride in query parameters for some upstreams).
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    host_limits: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self::from_client(create_shared_client())
    }

    pub fn from_client(inner: reqwest::Client) -> Self {
        Self {
            inner,
            host_limits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// GET returning parsed JSON.
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let resp = self
            .execute(url, || self.inner.get(url).query(query))
            .await?;
        Ok(resp.json().await?)
    }

    /// GET returning the raw body text (FASTA, GenBank flat files).
    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let resp = self
            .execute(url, || self.inner.get(url).query(query))
            .await?;
        Ok(resp.text().await?)
    }

    /// POST a JSON body, optionally with a bearer token, returning JSON.
    pub async fn post_json(
        &self,
        url: &str,
        body: &Value,
        bearer: Option<&str>,
    ) -> Result<Value> {
        let resp = self
            .execute(url, || {
                let mut req = self.inner.post(url).json(body);
                if let Some(token) = bearer {
                    req = req.bearer_auth(token);
                }
                req
            })
            .await?;
        Ok(resp.json().await?)
    }

    async fn execute(
        &self,
        url: &str,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let _permit = self.host_permit(url).await;
        let location = display_location(url);

        let mut attempt: u32 = 0;
        loop {
            let outcome = build().send().await;
            let wait = match outcome {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let secs = retry_after_secs(resp.headers());
                        if attempt >= MAX_RETRIES {
                            return Err(BrokerError::RateLimited(secs.unwrap_or(1)));
                        }
                        secs.map(Duration::from_secs)
                    } else if status.is_server_error() {
                        if attempt >= MAX_RETRIES {
                            return Err(BrokerError::Upstream(format!(
                                "{location} returned {status}"
                            )));
                        }
                        None
                    } else {
                        // Other 4xx are terminal, no retry
                        return Err(BrokerError::Upstream(format!(
                            "{location} returned {status}"
                        )));
                    }
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(BrokerError::Http(e));
                    }
                    None
                }
            };

            let delay = wait.unwrap_or_else(|| backoff_delay(attempt));
            tracing::debug!(
                url = %location,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying upstream request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn host_permit(&self, url: &str) -> Option<OwnedSemaphorePermit> {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))?;
        let semaphore = {
            let mut limits = self.host_limits.lock().await;
            limits
                .entry(host)
                .or_insert_with(|| Arc::new(Semaphore::new(PER_HOST_CONCURRENCY)))
                .clone()
        };
        // The semaphore is never closed, but don't panic if it somehow is.
        semaphore.acquire_owned().await.ok()
    }
}

/// Exponential backoff with +/-20% jitter: 500ms * 2^attempt.
fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS.saturating_mul(1 << attempt.min(8));
    let jitter = rand::rng().random_range(0.8..=1.2);
    Duration::from_millis((base as f64 * jitter) as u64)
}

/// Parse a Retry-After header given in seconds.
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Host + path of a URL, with query string (and any credentials) stripped.
fn display_location(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => format!(
            "{}{}",
            parsed.host_str().unwrap_or("upstream"),
            parsed.path()
        ),
        Err(_) => "upstream".to_string(),
    }
}
