//! Conversation sessions — durable history with authoritative token/cost totals.
//!
//! A [`ConversationSession`] is the unit the Session Store persists: an
//! ordered message list plus cumulative input tokens, output tokens, and
//! cost. Counters only ever grow; clients read them rather than
//! recomputing from the message list.

use crate::error::StateError;
use crate::id::SessionId;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Who or what produced a session message.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// A message supplied by the caller.
    User,
    /// A message produced by the model.
    Assistant,
    /// A terminal error surfaced to the session.
    Error,
    /// A typed progress update; see [`AgentStatusKind`].
    AgentStatus,
}

/// Sub-kind of an [`MessageRole::AgentStatus`] message.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentStatusKind {
    /// A new ReAct iteration began.
    IterationStart,
    /// The model's reasoning/textual content for the current turn.
    AgentReasoning,
    /// A tool call was dispatched.
    ToolExecution,
    /// A tool call returned.
    ToolResult,
    /// The agent produced its final answer.
    AgentAnswer,
    /// The run finished.
    AgentComplete,
}

/// A single entry in a conversation session's message list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Who produced this message.
    pub role: MessageRole,
    /// `Some` only when `role` is [`MessageRole::AgentStatus`].
    pub status_kind: Option<AgentStatusKind>,
    /// The message body, opaque to the store.
    pub content: serde_json::Value,
}

impl SessionMessage {
    /// Build a user message.
    pub fn user(content: impl Into<serde_json::Value>) -> Self {
        Self {
            role: MessageRole::User,
            status_kind: None,
            content: content.into(),
        }
    }

    /// Build an assistant message.
    pub fn assistant(content: impl Into<serde_json::Value>) -> Self {
        Self {
            role: MessageRole::Assistant,
            status_kind: None,
            content: content.into(),
        }
    }

    /// Build an error message.
    pub fn error(content: impl Into<serde_json::Value>) -> Self {
        Self {
            role: MessageRole::Error,
            status_kind: None,
            content: content.into(),
        }
    }

    /// Build an agent-status message of the given sub-kind.
    pub fn agent_status(kind: AgentStatusKind, content: impl Into<serde_json::Value>) -> Self {
        Self {
            role: MessageRole::AgentStatus,
            status_kind: Some(kind),
            content: content.into(),
        }
    }
}

/// A persisted conversation: ordered messages plus running totals.
///
/// Token counters and cost are the sole source of truth for reporting;
/// nothing downstream recomputes them from the message list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    /// This session's identifier.
    pub session_id: SessionId,
    /// Human-readable title, if one was set.
    pub title: Option<String>,
    /// Ordered message history.
    pub messages: Vec<SessionMessage>,
    /// Cumulative input tokens across every model call in this session.
    pub cumulative_input_tokens: u64,
    /// Cumulative output tokens across every model call in this session.
    pub cumulative_output_tokens: u64,
    /// Cumulative cost across every model call in this session.
    pub cumulative_cost: Decimal,
}

impl ConversationSession {
    /// Start a new, empty session.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            title: None,
            messages: Vec::new(),
            cumulative_input_tokens: 0,
            cumulative_output_tokens: 0,
            cumulative_cost: Decimal::ZERO,
        }
    }
}

/// Durable storage for conversation sessions.
///
/// Writes to a single session are serialized by the implementation so
/// token-counter updates are atomic; there is no cross-session locking.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new session, or return the existing one if it already exists.
    async fn create(
        &self,
        session_id: &SessionId,
        title: Option<String>,
    ) -> Result<ConversationSession, StateError>;

    /// Fetch a session by id.
    async fn get(&self, session_id: &SessionId) -> Result<Option<ConversationSession>, StateError>;

    /// Append a message to a session's history. The session must already exist.
    async fn append_message(
        &self,
        session_id: &SessionId,
        message: SessionMessage,
    ) -> Result<(), StateError>;

    /// Add to a session's cumulative token/cost counters. The session must already exist.
    async fn record_usage(
        &self,
        session_id: &SessionId,
        input_tokens: u64,
        output_tokens: u64,
        cost: Decimal,
    ) -> Result<(), StateError>;

    /// List every known session id.
    async fn list_sessions(&self) -> Result<Vec<SessionId>, StateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_at_zero() {
        let session = ConversationSession::new(SessionId::new("s1"));
        assert!(session.messages.is_empty());
        assert_eq!(session.cumulative_input_tokens, 0);
        assert_eq!(session.cumulative_output_tokens, 0);
        assert_eq!(session.cumulative_cost, Decimal::ZERO);
        assert_eq!(session.title, None);
    }

    #[test]
    fn message_constructors_set_role_and_kind() {
        let user = SessionMessage::user(serde_json::json!("hi"));
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.status_kind, None);

        let status = SessionMessage::agent_status(
            AgentStatusKind::ToolExecution,
            serde_json::json!({"tool": "search"}),
        );
        assert_eq!(status.role, MessageRole::AgentStatus);
        assert_eq!(status.status_kind, Some(AgentStatusKind::ToolExecution));
    }

    #[test]
    fn message_roles_serialize_snake_case() {
        let json = serde_json::to_string(&MessageRole::AgentStatus).unwrap();
        assert_eq!(json, "\"agent_status\"");
    }

    #[test]
    fn status_kinds_serialize_kebab_case() {
        let json = serde_json::to_string(&AgentStatusKind::IterationStart).unwrap();
        assert_eq!(json, "\"iteration-start\"");
    }
}
