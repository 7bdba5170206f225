//! The Operator protocol — what one agent does per cycle.

use crate::{content::Content, duration::DurationMs, error::OperatorError, id::*};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What triggers an operator invocation. Informs context assembly — a scheduled trigger
/// means you need to reconstruct everything from state, while a user
/// message carries conversation context naturally.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Human sent a message.
    User,
    /// Another agent or the Team Coordinator assigned a task.
    Task,
    /// A trigger-provider container invoked this run.
    Trigger,
    /// Future trigger types.
    Custom(String),
}

/// Input to an operator. Everything the operator needs to execute.
///
/// Design decision: `OperatorInput` does NOT include conversation history.
/// The operator runtime reads prior turns from the session (via
/// `Option<SessionId>`) during context assembly. `OperatorInput` carries
/// the *new* information that triggered this invocation.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorInput {
    /// The new message/task that triggered this operator invocation.
    pub message: Content,

    /// What caused this operator invocation to start.
    pub trigger: TriggerType,

    /// Session for conversation continuity. If None, the operator is stateless.
    pub session: Option<SessionId>,

    /// Configuration for this specific operator execution.
    /// None means "use the operator runtime's defaults."
    pub config: Option<OperatorConfig>,

    /// Opaque metadata that passes through the operator unchanged
    /// (supplemental context map from the Run-agent request, for example).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Per-operator configuration overrides. Every field is optional —
/// `None` means "use the agent definition's default."
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Maximum iterations of the ReAct loop.
    pub max_iterations: Option<u32>,

    /// Maximum wall-clock time for this operator invocation.
    pub max_duration: Option<DurationMs>,

    /// Model override (implementation-specific string).
    pub model: Option<String>,

    /// Tool-provider restriction for this invocation. `None` = use the
    /// agent's declared capability set. `Some(list)` = restrict further
    /// (used by the Team Coordinator to enforce per-member restrictions).
    pub allowed_providers: Option<Vec<String>>,

    /// Additional system prompt content to append. Does not replace the
    /// persona's base system prompt — it augments it.
    pub system_addendum: Option<String>,
}

/// Terminal status of an operator invocation, per §6's boundary status strings.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    /// Model produced a final text response (`end-turn`).
    Completed,
    /// Partial content returned because the model hit `max-tokens`.
    CompletedTruncated,
    /// Loop exited because `max_iterations` was reached without `end-turn`.
    CompletedMaxIterations,
    /// One or more recoverable errors occurred but the run still produced an answer.
    CompletedWithErrors,
    /// Cancellation fired.
    Cancelled,
    /// Unrecoverable error during execution.
    Error,
    /// Forward-compatible escape hatch.
    Custom(String),
}

impl ExitReason {
    /// The boundary status string for this exit reason (§6 naming conventions).
    pub fn as_status_str(&self) -> &str {
        match self {
            ExitReason::Completed => "completed",
            ExitReason::CompletedTruncated => "completed-truncated",
            ExitReason::CompletedMaxIterations => "completed-max-iterations",
            ExitReason::CompletedWithErrors => "completed-with-errors",
            ExitReason::Cancelled => "cancelled",
            ExitReason::Error => "error",
            ExitReason::Custom(s) => s.as_str(),
        }
    }
}

/// Output from an operator.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorOutput {
    /// The operator's response content (the final answer).
    pub message: Content,

    /// Why the operator invocation ended.
    pub exit_reason: ExitReason,

    /// Execution metadata (cost, tokens, timing, tool calls).
    pub metadata: OperatorMetadata,
}

/// Execution metadata. Every field is concrete (not optional) because
/// every operator produces this data; implementations that can't track
/// a field (e.g. cost for a local model) use zero/default.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorMetadata {
    /// Input tokens consumed.
    pub tokens_in: u64,
    /// Output tokens generated.
    pub tokens_out: u64,
    /// Cost in USD.
    pub cost: Decimal,
    /// Number of ReAct loop iterations used.
    pub iterations_used: u32,
    /// Record of each tool call made.
    pub tools_called: Vec<ToolCallRecord>,
    /// Wall-clock duration of the operator invocation.
    pub duration: DurationMs,
}

/// Record of a single tool invocation within an operator execution.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Fully-qualified `{provider}__{tool}` name that was called.
    pub name: String,
    /// How long the tool call took.
    pub duration: DurationMs,
    /// Whether the call succeeded.
    pub success: bool,
}

impl Default for OperatorMetadata {
    fn default() -> Self {
        Self {
            tokens_in: 0,
            tokens_out: 0,
            cost: Decimal::ZERO,
            iterations_used: 0,
            tools_called: vec![],
            duration: DurationMs::ZERO,
        }
    }
}

impl OperatorInput {
    /// Create a new OperatorInput with required fields.
    pub fn new(message: Content, trigger: TriggerType) -> Self {
        Self {
            message,
            trigger,
            session: None,
            config: None,
            metadata: serde_json::Value::Null,
        }
    }
}

impl OperatorOutput {
    /// Create a new OperatorOutput with required fields.
    pub fn new(message: Content, exit_reason: ExitReason) -> Self {
        Self {
            message,
            exit_reason,
            metadata: OperatorMetadata::default(),
        }
    }
}

impl ToolCallRecord {
    /// Create a new ToolCallRecord.
    pub fn new(name: impl Into<String>, duration: DurationMs, success: bool) -> Self {
        Self {
            name: name.into(),
            duration,
            success,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// THE TRAIT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Protocol ① — The Operator
///
/// What one agent does per cycle. Receives input, assembles context,
/// reasons (model call), acts (tool execution), produces output.
///
/// The trait is intentionally one method. The operator is atomic from the
/// outside — you send input, you get output. Everything that happens
/// inside (how many model calls, how many tool uses) is the
/// implementation's concern.
///
/// Implementations: the Agent ReAct Runtime (full-featured, tools +
/// iteration policy); a test double that echoes input back.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Execute a single operator invocation.
    async fn execute(&self, input: OperatorInput) -> Result<OperatorOutput, OperatorError>;
}
