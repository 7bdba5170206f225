#![deny(missing_docs)]
//! Optional OpenTelemetry instrumentation using GenAI semantic conventions.
//!
//! Wraps [`ModelGateway::send`](conduit_model_gateway::ModelGateway::send) and
//! [`ToolClient::call`](conduit_tool_client::ToolClient::call) behind drop-in
//! replacements that emit `tracing` spans under the `gen_ai.*` namespace.
//! Bring your own `tracing-opentelemetry` subscriber layer to export them —
//! this crate only produces the spans.
//!
//! Nothing in the core crates depends on this one. An execution runs
//! identically, correctness and all, whether or not a caller chooses to
//! route its Model Gateway and Tool Client calls through these wrappers.
//!
//! # Span hierarchy
//!
//! | Span name | OTel convention | Wraps |
//! |-----------|-----------------|-------|
//! | `gen_ai.chat` | `gen_ai.chat` | [`ModelGateway::send`](conduit_model_gateway::ModelGateway::send) |
//! | `gen_ai.execute_tool` | `gen_ai.execute_tool` | [`ToolClient::call`](conduit_tool_client::ToolClient::call) |
//!
//! # Opt-in content capture
//!
//! By default, message and argument bodies are not captured (privacy).
//! Set [`OtelConfig::capture_input`] / [`OtelConfig::capture_output`] to
//! `true` to include them in span fields.
//!
//! [spec]: https://opentelemetry.io/docs/specs/semconv/gen-ai/

use std::sync::Arc;

use conduit_model_gateway::{GatewayError, ModelBinding, ModelGateway, ProviderMessage, ProviderResponse, ToolSchema};
use conduit_tool_client::{ToolClient, ToolClientError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for GenAI span instrumentation.
#[derive(Debug, Clone, Default)]
pub struct OtelConfig {
    /// Whether to capture request/argument content in span fields.
    /// Disabled by default for privacy.
    pub capture_input: bool,
    /// Whether to capture response content in span fields.
    /// Disabled by default for privacy.
    pub capture_output: bool,
}

/// Wraps a [`ModelGateway`] with `gen_ai.chat` tracing spans.
///
/// Exposes the same `send` signature as the inner gateway — a caller that
/// holds an `Arc<ModelGateway>` can swap in an `ObservedModelGateway` at the
/// call site without otherwise changing how it drives the call.
pub struct ObservedModelGateway {
    inner: Arc<ModelGateway>,
    config: OtelConfig,
}

impl ObservedModelGateway {
    /// Wrap `inner` with the given instrumentation configuration.
    pub fn new(inner: Arc<ModelGateway>, config: OtelConfig) -> Self {
        Self { inner, config }
    }

    /// Send a request, emitting a `gen_ai.chat` span around the call.
    pub async fn send(
        &self,
        binding: &ModelBinding,
        messages: Vec<ProviderMessage>,
        tools: Vec<ToolSchema>,
        system: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse, GatewayError> {
        let span = tracing::info_span!(
            "gen_ai.chat",
            gen_ai.system = "conduit",
            gen_ai.request.model = binding.model.as_deref().unwrap_or("default"),
            provider = %binding.provider,
            gen_ai.request.messages = messages.len(),
            gen_ai.request.tools = tools.len(),
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.stop_reason = tracing::field::Empty,
        );
        let _enter = span.enter();

        if self.config.capture_input {
            tracing::debug!(messages = ?messages, "gen_ai.chat request");
        } else {
            tracing::debug!("gen_ai.chat request");
        }

        let result = self.inner.send(binding, messages, tools, system, cancel).await;

        match &result {
            Ok(response) => {
                span.record("gen_ai.usage.input_tokens", response.usage.input_tokens);
                span.record("gen_ai.usage.output_tokens", response.usage.output_tokens);
                span.record("gen_ai.response.stop_reason", format!("{:?}", response.stop_reason));
                if self.config.capture_output {
                    tracing::debug!(content_blocks = response.content.len(), "gen_ai.chat response");
                } else {
                    tracing::debug!("gen_ai.chat response");
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "gen_ai.chat error");
            }
        }

        result
    }
}

/// Wraps a [`ToolClient`] with `gen_ai.execute_tool` tracing spans.
pub struct ObservedToolClient {
    inner: Arc<ToolClient>,
    config: OtelConfig,
}

impl ObservedToolClient {
    /// Wrap `inner` with the given instrumentation configuration.
    pub fn new(inner: Arc<ToolClient>, config: OtelConfig) -> Self {
        Self { inner, config }
    }

    /// Call a tool, emitting a `gen_ai.execute_tool` span around the call.
    pub async fn call(
        &self,
        endpoint: &str,
        tool_name: &str,
        arguments: serde_json::Value,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ToolClientError> {
        let span = tracing::info_span!(
            "gen_ai.execute_tool",
            gen_ai.system = "conduit",
            gen_ai.tool.name = tool_name,
            gen_ai.tool.is_error = tracing::field::Empty,
        );
        let _enter = span.enter();

        if self.config.capture_input {
            tracing::debug!(arguments = %arguments, "gen_ai.execute_tool start");
        } else {
            tracing::debug!("gen_ai.execute_tool start");
        }

        let result = self.inner.call(endpoint, tool_name, arguments, deadline, cancel).await;

        match &result {
            Ok(value) => {
                span.record("gen_ai.tool.is_error", false);
                if self.config.capture_output {
                    tracing::debug!(result = %value, "gen_ai.execute_tool complete");
                } else {
                    tracing::debug!("gen_ai.execute_tool complete");
                }
            }
            Err(error) => {
                span.record("gen_ai.tool.is_error", true);
                tracing::warn!(error = %error, "gen_ai.execute_tool error");
            }
        }

        result
    }
}
