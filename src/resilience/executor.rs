//! Outbound resilient call executor.
//!
//! Every call the gateway makes to the vehicle API goes through one shared
//! [`OutboundExecutor`]. Per call:
//!
//! ```text
//! acquire concurrency permit (FIFO wait)
//!   └─ for attempt in 1..=N:
//!        take rate-limit token        ── none → RateLimitExceeded (no retry)
//!        send with per-attempt timeout
//!        success status / last attempt → return response
//!        otherwise sleep backoff(attempt) and try again
//! release permit (RAII)
//! ```
//!
//! Cancellation is observed at every suspension point: waiting for the
//! permit, the in-flight attempt, and the backoff sleep.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{BackoffPermit, OutboundConfig, RateLimitConfig};
use crate::observability::metrics;
use crate::resilience::concurrency::{ConcurrencyGate, GatePermit};
use crate::resilience::rate_limit::TokenBucket;
use crate::resilience::retries::RetryPolicy;

/// Failure of one logical outbound call.
#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Upstream timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("Upstream unavailable: {0}")]
    Transport(String),

    #[error("Upstream returned {}: {body}", .status.as_u16())]
    Status { status: StatusCode, body: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Outbound executor is shutting down")]
    Closed,

    #[error("Invalid outbound request: {0}")]
    InvalidRequest(String),
}

/// Error raised by a [`Transport`] for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST with a JSON body and `content-type: application/json`.
    pub fn post_json<T: Serialize + ?Sized>(url: Url, body: &T) -> Result<Self, OutboundError> {
        let bytes = serde_json::to_vec(body).map_err(|e| OutboundError::InvalidRequest(e.to_string()))?;
        let mut request = Self::new(Method::POST, url);
        request.headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        request.body = Some(Bytes::from(bytes));
        Ok(request)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Turn a non-success status into [`OutboundError::Status`].
    pub fn error_for_status(self) -> Result<Self, OutboundError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(OutboundError::Status {
                status: self.status,
                body: self.text(),
            })
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, OutboundError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| OutboundError::Transport(format!("invalid JSON from upstream: {}", e)))
    }
}

/// One network round trip. The executor owns retries, limits and timeouts.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError>;
}

/// [`Transport`] over a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| TransportError(e.to_string()))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| TransportError(e.to_string()))?;

        Ok(OutboundResponse { status, headers, body })
    }
}

/// Construction options for an [`OutboundExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Merged under each request's own headers (request wins).
    pub base_headers: HeaderMap,
    /// Per-attempt deadline.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitConfig,
    pub concurrency: usize,
    pub backoff_permit: BackoffPermit,
}

impl ExecutorOptions {
    pub fn from_config(config: &OutboundConfig) -> Self {
        Self {
            base_headers: HeaderMap::new(),
            timeout: Duration::from_millis(config.timeout_ms),
            retry: RetryPolicy::from_config(config),
            rate_limit: config.rate_limit.clone(),
            concurrency: config.concurrency,
            backoff_permit: config.backoff_permit,
        }
    }

    pub fn with_base_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.base_headers.insert(name, value);
        self
    }
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self::from_config(&OutboundConfig::default())
    }
}

/// Shared executor for outbound calls. Holds the process-wide token bucket
/// and concurrency gate.
pub struct OutboundExecutor {
    transport: Arc<dyn Transport>,
    options: ExecutorOptions,
    limiter: TokenBucket,
    gate: ConcurrencyGate,
}

impl OutboundExecutor {
    /// Executor backed by a fresh `reqwest` client.
    pub fn new(options: ExecutorOptions) -> Self {
        Self::with_transport(options, Arc::new(ReqwestTransport::default()))
    }

    pub fn with_transport(options: ExecutorOptions, transport: Arc<dyn Transport>) -> Self {
        let limiter = TokenBucket::from_config(&options.rate_limit);
        let gate = ConcurrencyGate::new(options.concurrency);
        Self {
            transport,
            options,
            limiter,
            gate,
        }
    }

    pub fn limiter(&self) -> &TokenBucket {
        &self.limiter
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Stop admitting new calls. Calls waiting on the gate fail with `Closed`.
    pub fn close(&self) {
        self.gate.close();
    }

    /// Perform one logical call with retries.
    ///
    /// Returns the response on a success status, or the last attempt's
    /// response whatever its status. Earlier failures are never surfaced.
    pub async fn execute(
        &self,
        mut request: OutboundRequest,
        cancel: &CancellationToken,
    ) -> Result<OutboundResponse, OutboundError> {
        for (name, value) in &self.options.base_headers {
            if !request.headers.contains_key(name) {
                request.headers.insert(name.clone(), value.clone());
            }
        }

        let mut permit = Some(self.acquire_permit(cancel).await?);
        let retry = &self.options.retry;

        for attempt in 1..=retry.attempts {
            if permit.is_none() {
                permit = Some(self.acquire_permit(cancel).await?);
            }

            if !self.limiter.try_take() {
                metrics::record_outbound_rate_limited();
                tracing::warn!(url = %request.url, attempt, "Outbound rate limit exceeded");
                return Err(OutboundError::RateLimitExceeded);
            }

            let is_final = retry.is_final(attempt);
            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(url = %request.url, attempt, "Outbound call cancelled");
                    return Err(OutboundError::Cancelled);
                }
                result = tokio::time::timeout(self.options.timeout, self.transport.send(request.clone())) => result,
            };
            let elapsed = started.elapsed();

            match outcome {
                Ok(Ok(response)) if response.is_success() => {
                    metrics::record_outbound_attempt("success", elapsed);
                    tracing::debug!(url = %request.url, attempt, status = response.status.as_u16(), "Outbound call succeeded");
                    return Ok(response);
                }
                Ok(Ok(response)) if is_final => {
                    metrics::record_outbound_attempt("status", elapsed);
                    tracing::error!(url = %request.url, attempt, status = response.status.as_u16(), "Outbound call failed after all retries");
                    return Ok(response);
                }
                Ok(Ok(response)) => {
                    metrics::record_outbound_attempt("status", elapsed);
                    tracing::warn!(url = %request.url, attempt, status = response.status.as_u16(), "Outbound attempt returned non-success status");
                }
                Ok(Err(e)) if is_final => {
                    metrics::record_outbound_attempt("transport", elapsed);
                    tracing::error!(url = %request.url, attempt, error = %e, "Outbound call failed after all retries");
                    return Err(OutboundError::Transport(e.0));
                }
                Ok(Err(e)) => {
                    metrics::record_outbound_attempt("transport", elapsed);
                    tracing::warn!(url = %request.url, attempt, error = %e, "Outbound attempt failed");
                }
                Err(_) if is_final => {
                    metrics::record_outbound_attempt("timeout", elapsed);
                    tracing::error!(url = %request.url, attempt, timeout = ?self.options.timeout, "Outbound call timed out after all retries");
                    return Err(OutboundError::Timeout {
                        after: self.options.timeout,
                    });
                }
                Err(_) => {
                    metrics::record_outbound_attempt("timeout", elapsed);
                    tracing::warn!(url = %request.url, attempt, timeout = ?self.options.timeout, "Outbound attempt timed out");
                }
            }

            let delay = retry.delay_for(attempt);
            if self.options.backoff_permit == BackoffPermit::Release {
                permit = None;
            }
            tracing::warn!(url = %request.url, attempt, delay = ?delay, "Retrying outbound call");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(url = %request.url, attempt, "Outbound call cancelled during backoff");
                    return Err(OutboundError::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // Unreachable while attempts >= 1: the final attempt always returns.
        drop(permit);
        Err(OutboundError::Transport("retry loop ended without a result".to_string()))
    }

    /// [`OutboundExecutor::execute`], then decode a success body as JSON.
    /// A final non-success status becomes [`OutboundError::Status`].
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: OutboundRequest,
        cancel: &CancellationToken,
    ) -> Result<T, OutboundError> {
        self.execute(request, cancel).await?.error_for_status()?.json()
    }

    async fn acquire_permit(&self, cancel: &CancellationToken) -> Result<GatePermit, OutboundError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OutboundError::Cancelled),
            permit = self.gate.acquire() => permit.map_err(|_| OutboundError::Closed),
        }
    }
}

impl std::fmt::Debug for OutboundExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundExecutor")
            .field("options", &self.options)
            .field("in_flight", &self.gate.in_use())
            .finish()
    }
}
