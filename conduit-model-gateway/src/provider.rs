//! Provider trait for LLM backends.
//!
//! The [`Provider`] trait uses RPITIT (return-position `impl Trait` in traits)
//! and is intentionally NOT object-safe. The object-safe boundary is
//! `layer0::Turn` — NeuronTurn<P: Provider> implements Turn.

use crate::types::{ProviderRequest, ProviderResponse};
use std::future::Future;
use thiserror::Error;

/// Errors from LLM providers.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP or network request failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Provider rate-limited the request.
    #[error("rate limited")]
    RateLimited,

    /// Authentication/authorization failed.
    #[error("auth failed: {0}")]
    AuthFailed(String),

    /// Could not parse the provider's response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Whether retrying this request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::RequestFailed(_)
        )
    }
}

/// LLM provider interface.
///
/// Each provider (Anthropic, OpenAI, Ollama) implements this trait.
/// Provider-native features (truncation, caching, thinking blocks)
/// are handled by the provider impl using `ProviderRequest.extra`.
///
/// This trait uses RPITIT and is NOT object-safe. That's intentional —
/// a concrete agent runtime generic over `P: Provider` gets a
/// zero-overhead call; the object-safe boundary for routing between
/// multiple concrete provider types by name is [`ProviderDyn`].
pub trait Provider: Send + Sync {
    /// Send a completion request to the provider.
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> impl Future<Output = Result<ProviderResponse, ProviderError>> + Send;
}

/// Object-safe counterpart of [`Provider`], used by the Model Gateway's
/// router to hold heterogeneous provider implementations behind a single
/// `HashMap`. Any `T: Provider` gets this for free.
#[async_trait::async_trait]
pub trait ProviderDyn: Send + Sync {
    /// Send a completion request to the provider.
    async fn complete_dyn(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}

#[async_trait::async_trait]
impl<T: Provider> ProviderDyn for T {
    async fn complete_dyn(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.complete(request).await
    }
}
