//! # layer0 — protocol traits for the orchestration engine
//!
//! This crate defines the small set of protocol boundaries that the rest
//! of the workspace composes around: what one agent does per cycle
//! ([`Operator`]), how agent runs compose ([`Orchestrator`]), and how data
//! persists across turns ([`StateStore`]). Everything else in the
//! workspace — the Agent ReAct Runtime, the Team Coordinator, the Session
//! Store backends — is an implementation of one of these traits plus a
//! universal content type and a shared error-kind taxonomy.
//!
//! ## The Protocols
//!
//! | Protocol | Trait | What it does |
//! |----------|-------|-------------|
//! | ① Operator | [`operator::Operator`] | What one agent does per cycle |
//! | ② Orchestration | [`orchestrator::Orchestrator`] | How agent runs compose |
//! | ③ State | [`state::StateStore`] | How data persists across turns |
//!
//! ## Design Principle
//!
//! Every protocol trait is operation-defined, not mechanism-defined.
//! [`operator::Operator::execute`] means "cause this agent to process one
//! cycle" — not "make an API call." This is what makes implementations
//! swappable: a single-process ReAct loop and a future durable-execution
//! backend both implement the same trait.
//!
//! ## Dependency Notes
//!
//! This crate depends on `serde_json::Value` for extension data fields
//! (metadata, tool inputs, custom payloads). JSON is the interchange
//! format tool providers and the model boundary already speak, so this
//! avoids a translation layer at every seam.

#![deny(missing_docs)]

pub mod content;
pub mod duration;
pub mod error;
pub mod id;
pub mod operator;
pub mod orchestrator;
pub mod session;
pub mod state;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-exports for convenience.
pub use content::{Content, ContentBlock, ImageSource};
pub use duration::DurationMs;
pub use error::{ErrorKind, OperatorError, OrchError, StateError};
pub use id::{AgentId, ExecutionId, ProviderName, SessionId, TeamId, TriggerId, WorkflowId};
pub use operator::{
    ExitReason, Operator, OperatorConfig, OperatorInput, OperatorMetadata, OperatorOutput,
    ToolCallRecord, TriggerType,
};
pub use orchestrator::Orchestrator;
pub use session::{AgentStatusKind, ConversationSession, MessageRole, SessionMessage, SessionStore};
pub use state::{Scope, SearchResult, StateReader, StateStore};
