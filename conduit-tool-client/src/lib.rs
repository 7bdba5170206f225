#![deny(missing_docs)]
//! Uniform call surface for invoking a tool behind a registered provider.
//!
//! [`ToolClient::call`] is the only operation: give it a provider endpoint,
//! a tool name, JSON-shaped arguments, a deadline, and a cancellation token,
//! and it returns a structured result or a tagged error. Transport-level
//! failures are retried with capped exponential backoff, bounded by the
//! deadline; provider-reported errors (the provider responded, but with an
//! error) are not retried, since retrying them would just repeat the same
//! mistake. Cancellation aborts the in-flight request immediately.

use std::time::Duration;

use layer0::ErrorKind;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Errors from a tool call.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ToolClientError {
    /// The request could not reach the provider, or the connection broke
    /// mid-flight. Retried up to the configured limit.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The provider responded with a non-success status. Not retried.
    #[error("provider reported error: {0}")]
    ProviderReportedError(String),

    /// The deadline elapsed before a result was obtained.
    #[error("timeout waiting for {0}")]
    Timeout(String),

    /// Cancellation fired before a result was obtained.
    #[error("cancelled")]
    Cancelled,

    /// The provider's response body did not parse as JSON.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ToolClientError {
    /// Widen to the shared error-kind taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolClientError::TransportFailure(_) => ErrorKind::TransportFailure,
            ToolClientError::ProviderReportedError(_) => ErrorKind::ProviderReportedError,
            ToolClientError::Timeout(_) => ErrorKind::Timeout,
            ToolClientError::Cancelled => ErrorKind::Cancelled,
            ToolClientError::MalformedResponse(_) => ErrorKind::MalformedResponse,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, ToolClientError::TransportFailure(_))
    }
}

/// Capped exponential backoff parameters for transport-failure retries.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base: Duration,
    /// Ceiling no computed delay may exceed.
    pub max: Duration,
    /// Maximum number of retry attempts after the initial try.
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(10),
            max_retries: 4,
        }
    }
}

/// Compute the delay before retry attempt `attempt` (1-indexed), doubling
/// from `base` and never exceeding `max`.
fn next_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

#[derive(Serialize)]
struct CallEnvelope<'a> {
    tool: &'a str,
    arguments: serde_json::Value,
}

/// Invokes tools over HTTP against provider endpoints resolved from the
/// Tool Catalog.
pub struct ToolClient {
    http: reqwest::Client,
    backoff: BackoffConfig,
}

impl ToolClient {
    /// Build a client with the default backoff configuration.
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            backoff: BackoffConfig::default(),
        }
    }

    /// Build a client with custom backoff parameters.
    pub fn with_backoff(backoff: BackoffConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            backoff,
        }
    }

    /// Call `tool_name` on the provider reachable at `endpoint`.
    ///
    /// Retries transport failures with capped exponential backoff until
    /// either a result is obtained, a non-retryable error is returned, the
    /// retry budget is exhausted, `deadline` passes, or `cancel` fires.
    pub async fn call(
        &self,
        endpoint: &str,
        tool_name: &str,
        arguments: serde_json::Value,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ToolClientError> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(ToolClientError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ToolClientError::Timeout(tool_name.to_owned()));
            }

            let attempt_result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ToolClientError::Cancelled),
                res = tokio::time::timeout(remaining, self.send_once(endpoint, tool_name, arguments.clone())) => res,
            };

            let outcome = match attempt_result {
                Err(_elapsed) => return Err(ToolClientError::Timeout(tool_name.to_owned())),
                Ok(result) => result,
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.backoff.max_retries => {
                    attempt += 1;
                    let delay = next_delay(attempt, self.backoff.base, self.backoff.max);
                    let delay = delay.min(deadline.saturating_duration_since(Instant::now()));
                    if delay.is_zero() {
                        return Err(ToolClientError::Timeout(tool_name.to_owned()));
                    }
                    tracing::debug!(tool = tool_name, attempt, ?delay, "retrying tool call after transport failure");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(
        &self,
        endpoint: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolClientError> {
        let envelope = CallEnvelope {
            tool: tool_name,
            arguments,
        };

        let response = self
            .http
            .post(endpoint)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| ToolClientError::TransportFailure(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ToolClientError::ProviderReportedError(format!(
                "{status}: {body}"
            )));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ToolClientError::MalformedResponse(e.to_string()))
    }
}

impl Default for ToolClient {
    fn default() -> Self {
        Self::new()
    }
}
