//! Resilient HTTP client shared by every outbound DRSHub call.
//!
//! This crate provides a thin wrapper over a configured `reqwest::Client`:
//!
//! - Constructing the client once with sensible defaults
//! - JSON GET/POST helpers that carry an optional Authorization header
//! - Bounded exponential-backoff retry for transient upstream failures
//! - An mTLS POST variant for providers that require a client certificate
//!
//! Retries apply only to transient-server-error statuses (500..=510) and
//! explicit rate limiting (429); every other error status propagates
//! immediately with its original status preserved.

use std::time::Duration;

use reqwest::{Client, Method, header};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure of a single logical call, after any retries.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The upstream answered with an error status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A 2xx response whose body was not the JSON we expected.
    #[error("response body is not valid JSON: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

impl ApiError {
    /// The upstream status, when there was a response at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(error) => error.status().map(|s| s.as_u16()),
            ApiError::InvalidBody(_) => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self.status(), Some(status) if (500..=510).contains(&status) || status == 429)
    }
}

/// Bounded exponential backoff: `initial_delay`, doubled (or whatever the
/// multiplier says) after each failed attempt, up to `max_attempts` total
/// attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay * self.multiplier.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Thin wrapper around a configured `reqwest::Client` with retry.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: Client,
    retry: RetryPolicy,
    user_agent: String,
}

impl HttpClient {
    pub fn new(retry: RetryPolicy) -> Result<Self, ApiError> {
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(HttpClient {
            http,
            retry,
            user_agent: format!("drshub/0.1; {}", std::env::consts::OS),
        })
    }

    /// GET a JSON resource, forwarding `authorization` verbatim when given.
    pub async fn get_json(&self, url: &str, authorization: Option<&str>) -> Result<Value, ApiError> {
        self.execute(&self.http, Method::GET, url, authorization, None).await
    }

    /// POST a JSON body, forwarding `authorization` verbatim when given.
    pub async fn post_json(
        &self,
        url: &str,
        authorization: Option<&str>,
        body: &Value,
    ) -> Result<Value, ApiError> {
        self.execute(&self.http, Method::POST, url, authorization, Some(body)).await
    }

    /// POST a JSON body over a connection carrying the given client
    /// identity (PEM-encoded certificate plus private key). Used for
    /// passport-authorized access-URL requests.
    pub async fn post_json_with_identity(
        &self,
        url: &str,
        body: &Value,
        identity_pem: &[u8],
    ) -> Result<Value, ApiError> {
        let identity = reqwest::Identity::from_pem(identity_pem)?;
        let client = Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        self.execute(&client, Method::POST, url, None, Some(body)).await
    }

    async fn execute(
        &self,
        client: &Client,
        method: Method,
        url: &str,
        authorization: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let mut attempt = 1;
        loop {
            match self.send_once(client, method.clone(), url, authorization, body).await {
                Ok(value) => {
                    debug!(%method, %url, attempt, "request completed");
                    return Ok(value);
                }
                Err(error) if error.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    debug!(
                        %method,
                        %url,
                        attempt,
                        status = ?error.status(),
                        delay_ms = delay.as_millis() as u64,
                        "transient upstream error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    warn!(%method, %url, attempt, status = ?error.status(), %error, "request failed");
                    return Err(error);
                }
            }
        }
    }

    async fn send_once(
        &self,
        client: &Client,
        method: Method,
        url: &str,
        authorization: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let mut builder = client
            .request(method, url)
            .header(header::USER_AGENT, &self.user_agent);
        if let Some(authorization) = authorization {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}
