//! HTTP transport shared by service adapters
//!
//! Wraps a `reqwest::Client` with connect/read timeouts and a bounded retry
//! loop. Transient statuses and connection failures are retried with
//! exponential backoff; anything else fails the call at once.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::query::Params;
use crate::table::cell_text;

/// HTTP statuses worth retrying
pub const RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Errors raised while talking to a service
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, body read)
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success status after retries
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Body received but not in the expected shape
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Adapter-specific failure
    #[error("{0}")]
    Service(String),
}

/// How many times and how long to wait between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub total_retries: u32,
    /// Wait before the first retry; doubled on every further one
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            total_retries: 5,
            backoff_base: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn is_retryable_status(status: u16) -> bool {
        RETRY_STATUSES.contains(&status)
    }
}

/// Shared HTTP client with retries
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Builds a transport from engine settings
    pub fn new(config: &EngineConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            retry: config.retry_policy(),
        })
    }

    /// Uses an existing client
    pub fn with_client(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Sends the request built by `build`, retrying transient failures
    ///
    /// `build` is called once per attempt since a sent request is consumed.
    pub async fn send<F>(&self, build: F) -> Result<Response, FetchError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            match build(&self.client).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let url = response.url().to_string();
                    if RetryPolicy::is_retryable_status(status) && attempt < self.retry.total_retries {
                        let wait = self.retry.delay_for(attempt);
                        warn!(%url, status, attempt, ?wait, "transient HTTP status, retrying");
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Status { url, status });
                }
                Err(err) if (err.is_connect() || err.is_timeout()) && attempt < self.retry.total_retries => {
                    let wait = self.retry.delay_for(attempt);
                    warn!(error = %err, attempt, ?wait, "transport error, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// GET returning decoded JSON
    pub async fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value, FetchError> {
        debug!(url, "GET");
        let response = self.send(|client| client.get(url).query(query)).await?;
        Ok(response.json::<Value>().await?)
    }

    /// GET returning the body as text
    pub async fn get_text(&self, url: &str, query: &[(String, String)]) -> Result<String, FetchError> {
        debug!(url, "GET");
        let response = self.send(|client| client.get(url).query(query)).await?;
        Ok(response.text().await?)
    }

    /// POST with a JSON body, returning decoded JSON; an empty body is `Null`
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value, FetchError> {
        debug!(url, "POST");
        let response = self.send(|client| client.post(url).json(body)).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|err| FetchError::Decode(err.to_string()))
    }
}

/// Flattens wire parameters into query-string pairs
pub fn query_pairs(params: &Params) -> Vec<(String, String)> {
    params
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (name.clone(), cell_text(value)))
        .collect()
}
