#![deny(missing_docs)]
//! Per-execution ordered stream of typed progress events.
//!
//! Each execution gets its own broadcast channel. Publishing is
//! best-effort: if nobody is subscribed, the event is simply dropped —
//! the bus never blocks or errors the publisher for a lack of
//! listeners. Subscribers are transient and can disconnect at any time
//! without affecting the execution they were watching.

use layer0::id::{AgentId, ExecutionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

/// How many buffered events a subscriber can lag behind before it starts
/// missing messages. Generous enough that a slow consumer rarely drops
/// anything within one execution's lifetime.
const CHANNEL_CAPACITY: usize = 256;

/// A single tagged event published to an execution's stream.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// The execution was accepted and started.
    ExecutionStarted {
        /// The execution this stream belongs to.
        execution_id: ExecutionId,
        /// What kind of thing is running (agent, team, workflow).
        kind: String,
    },
    /// A human-readable status update.
    Status {
        /// Free-text status message.
        message: String,
        /// Optional machine-readable sub-kind.
        sub_kind: Option<String>,
    },
    /// An agent within the execution has started.
    AgentStart {
        /// The agent that started.
        agent_id: AgentId,
        /// The agent's role within the team/workflow, if any.
        role: Option<String>,
        /// Fraction of overall progress, in `[0.0, 1.0]`.
        progress: f64,
    },
    /// A new ReAct iteration began.
    IterationStart {
        /// Zero-based iteration index.
        iteration: u32,
        /// Configured maximum iteration count.
        max_iterations: u32,
    },
    /// The model's reasoning/textual content for the current turn.
    AgentReasoning {
        /// Free-text reasoning content.
        text: String,
    },
    /// A tool call was dispatched.
    ToolExecution {
        /// Fully-qualified `{provider}__{tool}` name.
        tool_name: String,
        /// A snapshot of the call's input.
        input: serde_json::Value,
        /// The iteration this call happened in.
        iteration: u32,
    },
    /// A tool call returned.
    ToolResult {
        /// Fully-qualified `{provider}__{tool}` name.
        tool_name: String,
        /// A truncated snapshot of the result.
        result: String,
        /// Whether the call succeeded.
        success: bool,
        /// The iteration this result belongs to.
        iteration: u32,
    },
    /// Summary of one completed ReAct iteration.
    AgentIteration {
        /// Iteration index just completed.
        iteration: u32,
        /// Configured maximum iteration count.
        max_iterations: u32,
        /// Input tokens consumed this iteration.
        input_tokens: u64,
        /// Output tokens generated this iteration.
        output_tokens: u64,
        /// Model identifier used.
        model: String,
        /// Tools invoked this iteration.
        used_tools: Vec<String>,
        /// The provider-reported stop reason.
        stop_reason: String,
        /// Truncated preview of the assistant's reasoning text.
        reasoning_preview: String,
    },
    /// The agent produced its final answer.
    AgentAnswer {
        /// The answer text.
        answer: String,
        /// The iteration the answer was produced in.
        iteration: u32,
        /// Terminal status string (§6 boundary naming).
        status: String,
    },
    /// An agent within the execution finished.
    AgentComplete {
        /// The agent that finished.
        agent_id: AgentId,
        /// The agent's role, if any.
        role: Option<String>,
        /// The agent's final answer.
        final_answer: String,
        /// Terminal status string.
        status: String,
    },
    /// The whole execution finished.
    Complete {
        /// Terminal status string.
        status: String,
        /// Opaque final result payload.
        result: serde_json::Value,
    },
    /// An error occurred.
    Error {
        /// Human-readable error message.
        message: String,
    },
    /// Updated cumulative token/cost counters for the execution's session.
    CumulativeTokens {
        /// Cumulative input tokens.
        input_tokens: u64,
        /// Cumulative output tokens.
        output_tokens: u64,
        /// Cumulative cost.
        cost: Decimal,
    },
}

/// Registry of per-execution broadcast channels.
#[derive(Default)]
pub struct EventBus {
    channels: RwLock<HashMap<ExecutionId, broadcast::Sender<ExecutionEvent>>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, execution_id: &ExecutionId) -> broadcast::Sender<ExecutionEvent> {
        if let Some(tx) = self
            .channels
            .read()
            .expect("event bus lock poisoned")
            .get(execution_id)
        {
            return tx.clone();
        }
        let mut channels = self.channels.write().expect("event bus lock poisoned");
        channels
            .entry(execution_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Subscribe to an execution's event stream, creating the channel if
    /// this is the first subscriber.
    pub fn subscribe(&self, execution_id: &ExecutionId) -> broadcast::Receiver<ExecutionEvent> {
        self.sender_for(execution_id).subscribe()
    }

    /// Publish an event. A no-op (not an error) if nobody is subscribed.
    pub fn publish(&self, execution_id: &ExecutionId, event: ExecutionEvent) {
        let _ = self.sender_for(execution_id).send(event);
    }

    /// Drop the channel for a finished execution.
    pub fn unregister(&self, execution_id: &ExecutionId) {
        self.channels
            .write()
            .expect("event bus lock poisoned")
            .remove(execution_id);
    }
}
