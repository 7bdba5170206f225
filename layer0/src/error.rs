//! Error taxonomy shared across every subsystem.
//!
//! [`ErrorKind`] is the tag vocabulary, not a type hierarchy — each subsystem
//! still defines its own `thiserror` enum for the errors it can actually
//! produce, and exposes [`ErrorKind`] via a `kind()` method so that higher
//! layers can pattern-match or widen without downcasting.

use std::fmt;
use thiserror::Error;

/// The error-kind taxonomy. Carried by every subsystem error as a tag,
/// independent of the `Display` message.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or container-runtime I/O error.
    TransportFailure,
    /// Tool or LLM provider returned a structured error.
    ProviderReportedError,
    /// A deadline expired.
    Timeout,
    /// Cancellation token was set.
    Cancelled,
    /// Response did not parse against the expected shape.
    MalformedResponse,
    /// Agent attempted to use a tool outside its declared capability set.
    PolicyViolation,
    /// Referenced tool name not in the resolved provider's declared tools.
    UnknownTool,
    /// Referenced provider name not in the Tool Catalog.
    UnknownProvider,
    /// Workflow graph is not a DAG, or a parameter/predicate reference is unresolved.
    InvalidWorkflow,
    /// Referenced agent/team/workflow definition not loadable.
    ConfigurationError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::TransportFailure => "transport-failure",
            ErrorKind::ProviderReportedError => "provider-reported-error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::MalformedResponse => "malformed-response",
            ErrorKind::PolicyViolation => "policy-violation",
            ErrorKind::UnknownTool => "unknown-tool",
            ErrorKind::UnknownProvider => "unknown-provider",
            ErrorKind::InvalidWorkflow => "invalid-workflow",
            ErrorKind::ConfigurationError => "configuration-error",
        };
        write!(f, "{s}")
    }
}

/// Operator (Agent ReAct Runtime) execution errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OperatorError {
    /// An error from the model/LLM provider.
    #[error("model error: {0}")]
    Model(String),

    /// An error during tool execution.
    #[error("tool error in {tool}: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Error message.
        message: String,
    },

    /// The agent attempted to use a tool outside its declared capability set.
    #[error("policy violation: tool {tool} requires provider {provider}, not in capability set")]
    PolicyViolation {
        /// The fully-qualified tool name the model attempted to invoke.
        tool: String,
        /// The provider name it resolved to.
        provider: String,
    },

    /// Cancellation fired mid-execution.
    #[error("cancelled")]
    Cancelled,

    /// A deadline expired.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Catch-all. Include context.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl OperatorError {
    /// Widen into the shared error-kind tag.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OperatorError::Model(_) => ErrorKind::ProviderReportedError,
            OperatorError::Tool { .. } => ErrorKind::ProviderReportedError,
            OperatorError::PolicyViolation { .. } => ErrorKind::PolicyViolation,
            OperatorError::Cancelled => ErrorKind::Cancelled,
            OperatorError::Timeout(_) => ErrorKind::Timeout,
            OperatorError::Other(_) => ErrorKind::ProviderReportedError,
        }
    }
}

/// Orchestration (Team Coordinator / dispatch) errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OrchError {
    /// The requested agent was not found.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// Dispatching an operator invocation failed.
    #[error("dispatch failed: {0}")]
    DispatchFailed(String),

    /// An operator error propagated through orchestration.
    #[error("operator error: {0}")]
    Operator(#[from] OperatorError),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl OrchError {
    /// Widen into the shared error-kind tag.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchError::AgentNotFound(_) => ErrorKind::ConfigurationError,
            OrchError::DispatchFailed(_) => ErrorKind::TransportFailure,
            OrchError::Operator(e) => e.kind(),
            OrchError::Other(_) => ErrorKind::TransportFailure,
        }
    }
}

/// State (Session Store) errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StateError {
    /// Key not found in the given scope.
    #[error("not found: {scope}/{key}")]
    NotFound {
        /// The scope that was searched.
        scope: String,
        /// The key that was not found.
        key: String,
    },

    /// A write operation failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StateError {
    /// Widen into the shared error-kind tag.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StateError::NotFound { .. } => ErrorKind::ConfigurationError,
            StateError::WriteFailed(_) => ErrorKind::TransportFailure,
            StateError::Serialization(_) => ErrorKind::MalformedResponse,
            StateError::Other(_) => ErrorKind::TransportFailure,
        }
    }
}
