//! The Model Gateway router: a single `send()` across registered providers.
//!
//! Callers never talk to a concrete `Provider` directly — they name a
//! [`ModelBinding`] (which provider, which model) and call
//! [`ModelGateway::send`]. The router resolves the binding to a registered
//! provider, issues the request, and races it against cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use layer0::{ErrorKind, ProviderName};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::provider::{ProviderDyn, ProviderError};
use crate::types::{ProviderMessage, ProviderRequest, ProviderResponse, ToolSchema};

/// Which provider and model a call should use.
#[derive(Debug, Clone)]
pub struct ModelBinding {
    /// Name under which the provider is registered with the gateway.
    pub provider: ProviderName,
    /// Model identifier passed through to the provider. `None` uses the
    /// provider's own default.
    pub model: Option<String>,
}

/// Errors from a gateway `send` call.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No provider is registered under this name.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The underlying provider call failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Cancellation fired before the provider responded.
    #[error("cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Widen to the shared error-kind taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::UnknownProvider(_) => ErrorKind::UnknownProvider,
            GatewayError::Provider(e) if e.is_retryable() => ErrorKind::TransportFailure,
            GatewayError::Provider(_) => ErrorKind::ProviderReportedError,
            GatewayError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Routes `send` calls to registered provider implementations by name.
///
/// Providers are stored behind [`ProviderDyn`] so the router can hold
/// Anthropic, OpenAI, and Ollama implementations — distinct concrete types
/// — in the same map.
pub struct ModelGateway {
    providers: HashMap<ProviderName, Arc<dyn ProviderDyn>>,
}

impl ModelGateway {
    /// Create an empty gateway with no registered providers.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider implementation under a name. Overwrites any
    /// existing registration under the same name.
    pub fn register(&mut self, name: ProviderName, provider: Arc<dyn ProviderDyn>) {
        self.providers.insert(name, provider);
    }

    /// Send a request to the provider named by `binding.provider`.
    ///
    /// Races the provider call against `cancel`; a cancellation that fires
    /// first returns promptly without waiting for the provider to finish.
    pub async fn send(
        &self,
        binding: &ModelBinding,
        messages: Vec<ProviderMessage>,
        tools: Vec<ToolSchema>,
        system: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse, GatewayError> {
        let provider = self
            .providers
            .get(&binding.provider)
            .ok_or_else(|| GatewayError::UnknownProvider(binding.provider.to_string()))?;

        let request = ProviderRequest {
            model: binding.model.clone(),
            messages,
            tools,
            max_tokens: None,
            temperature: None,
            system,
            extra: serde_json::Value::Null,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::Cancelled),
            result = provider.complete_dyn(request) => Ok(result?),
        }
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ModelGateway {
    fn default() -> Self {
        Self::new()
    }
}
