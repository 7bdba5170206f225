#![deny(missing_docs)]
//! Agent ReAct Runtime — the reason/act/observe loop for one agent definition.
//!
//! Implements `layer0::operator::Operator` by running the model against the
//! Model Gateway, dispatching any tool-use requests through the Tool Client
//! against providers resolved from the Tool Catalog, and repeating until the
//! model produces a final answer, an iteration ceiling is hit, or
//! cancellation fires. A [`ReactRuntime`] is built fresh per execution by
//! whatever assigns the execution-id and cancellation token (the
//! Orchestrator Facade, in the full system) — the `Operator::execute` seam
//! itself carries no execution identity, so that identity is bound into the
//! runtime instance rather than threaded through the call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use conduit_event_bus::{EventBus, ExecutionEvent};
use conduit_model_gateway::types::{ContentPart, ProviderMessage, Role, StopReason, ToolSchema};
use conduit_model_gateway::{content_to_user_message, parts_to_content, GatewayError, ModelBinding, ModelGateway};
use conduit_tool_catalog::ToolCatalog;
use conduit_tool_client::{ToolClient, ToolClientError};

use layer0::content::Content;
use layer0::duration::DurationMs;
use layer0::error::OperatorError;
use layer0::id::{AgentId, ExecutionId, ProviderName, SessionId};
use layer0::operator::{
    ExitReason, Operator, OperatorInput, OperatorMetadata, OperatorOutput, ToolCallRecord,
};
use layer0::session::{AgentStatusKind, MessageRole, SessionMessage, SessionStore};

/// Tool-call deadline used when the invocation carries no `max_duration`.
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
/// Length a reasoning preview is truncated to in event payloads.
const REASONING_PREVIEW_LEN: usize = 280;
/// Length a tool result is truncated to in its `tool_result` event.
const TOOL_RESULT_SNAPSHOT_LEN: usize = 2000;
/// Delimiter between a provider name and a tool name in a qualified tool name.
const PROVIDER_DELIMITER: &str = "__";

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push('\u{2026}');
    out
}

/// Identity, persona, capability set, iteration policy, and model binding
/// for one agent. Immutable once loaded.
///
/// Invariant: `iteration_policy.max_iterations >= 1`. Declared
/// tool-provider names are resolved against the Tool Catalog at dispatch
/// time, not at load time — a missing provider only shrinks the visible
/// tool set, it never fails construction.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    /// Stable identifier.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Definition version string.
    pub version: String,
    /// Role, system prompt, and behavior guidance.
    pub persona: Persona,
    /// Tool-provider names this agent is allowed to call.
    pub capabilities: Vec<ProviderName>,
    /// Iteration ceiling and approval policy.
    pub iteration_policy: IterationPolicy,
    /// Which provider/model this agent calls, and generation parameters.
    pub model_binding: AgentModelBinding,
}

/// An agent's persona: identity text surfaced to the model and to humans.
#[derive(Debug, Clone, Default)]
pub struct Persona {
    /// Short role description (e.g. "echo assistant").
    pub role: String,
    /// Base system prompt.
    pub system_prompt: String,
    /// Additional behavior guidance appended to the system prompt's intent,
    /// kept separate so it can be edited independently.
    pub behavior_guidance: Option<String>,
    /// Free-text expertise tags, used for routing/selection upstream.
    pub expertise_tags: Vec<String>,
}

/// Iteration ceiling and human-approval policy for one agent.
#[derive(Debug, Clone)]
pub struct IterationPolicy {
    /// Maximum ReAct loop iterations. Must be at least 1.
    pub max_iterations: u32,
    /// Whether the agent may loop at all (an agent with `false` here still
    /// gets exactly one iteration).
    pub allow_loop: bool,
    /// Whether tool invocations require human approval before dispatch.
    /// Not enforced by the runtime itself — surfaced for an approval layer
    /// sitting in front of tool dispatch.
    pub require_approval: bool,
}

impl Default for IterationPolicy {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            allow_loop: true,
            require_approval: false,
        }
    }
}

/// Which provider and model an agent calls, and its generation parameters.
#[derive(Debug, Clone)]
pub struct AgentModelBinding {
    /// Registered Model Gateway provider name.
    pub provider: ProviderName,
    /// Model identifier. `None` uses the provider's own default.
    pub model: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Maximum response tokens per call.
    pub max_tokens: Option<u32>,
}

impl AgentDefinition {
    /// Build an agent definition with default iteration policy.
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        persona: Persona,
        capabilities: Vec<ProviderName>,
        model_binding: AgentModelBinding,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            version: "0.1.0".into(),
            persona,
            capabilities,
            iteration_policy: IterationPolicy::default(),
            model_binding,
        }
    }

    /// Whether this definition satisfies the `max_iterations >= 1` invariant.
    pub fn is_valid(&self) -> bool {
        self.iteration_policy.max_iterations >= 1
    }

    fn effective_capabilities(&self, allowed: Option<&[String]>) -> Vec<ProviderName> {
        match allowed {
            Some(list) => self
                .capabilities
                .iter()
                .filter(|p| list.iter().any(|a| a == p.as_str()))
                .cloned()
                .collect(),
            None => self.capabilities.clone(),
        }
    }
}

/// Resolved per-invocation configuration: agent defaults merged with the
/// caller's `OperatorConfig` overrides.
struct ResolvedConfig {
    binding: ModelBinding,
    system: String,
    max_iterations: u32,
    max_duration: Option<DurationMs>,
    capabilities: Vec<ProviderName>,
}

/// Executes one [`AgentDefinition`]'s reason/act/observe loop for a single
/// `Operator::execute` call.
///
/// Built once per execution: `execution_id` and `cancel` are bound at
/// construction because `Operator::execute` itself carries neither.
pub struct ReactRuntime {
    agent: AgentDefinition,
    execution_id: ExecutionId,
    gateway: Arc<ModelGateway>,
    catalog: Arc<ToolCatalog>,
    tool_client: Arc<ToolClient>,
    events: Arc<EventBus>,
    sessions: Option<Arc<dyn SessionStore>>,
    cancel: CancellationToken,
}

impl ReactRuntime {
    /// Build a runtime for one execution of `agent`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent: AgentDefinition,
        execution_id: ExecutionId,
        gateway: Arc<ModelGateway>,
        catalog: Arc<ToolCatalog>,
        tool_client: Arc<ToolClient>,
        events: Arc<EventBus>,
        sessions: Option<Arc<dyn SessionStore>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            agent,
            execution_id,
            gateway,
            catalog,
            tool_client,
            events,
            sessions,
            cancel,
        }
    }

    fn resolve_config(&self, input: &OperatorInput) -> ResolvedConfig {
        let oc = input.config.as_ref();
        let system = match oc.and_then(|c| c.system_addendum.as_ref()) {
            Some(addendum) => format!("{}\n{}", self.agent.persona.system_prompt, addendum),
            None => self.agent.persona.system_prompt.clone(),
        };
        let model = oc
            .and_then(|c| c.model.clone())
            .or_else(|| self.agent.model_binding.model.clone());
        let allowed: Option<Vec<String>> = oc.and_then(|c| c.allowed_providers.clone());
        let capabilities = self.agent.effective_capabilities(allowed.as_deref());

        ResolvedConfig {
            binding: ModelBinding {
                provider: self.agent.model_binding.provider.clone(),
                model,
            },
            system,
            max_iterations: oc
                .and_then(|c| c.max_iterations)
                .unwrap_or(self.agent.iteration_policy.max_iterations)
                .max(1),
            max_duration: oc.and_then(|c| c.max_duration),
            capabilities,
        }
    }

    /// Build the model-visible tool set: one entry per declared tool of
    /// every resolvable provider in `capabilities`, named
    /// `{provider}__{tool}` with a `[{provider}] {description}` prefix.
    /// Providers that don't resolve in the catalog are skipped, not failed.
    fn build_tool_schemas(&self, capabilities: &[ProviderName]) -> (Vec<ToolSchema>, Vec<String>) {
        let mut schemas = Vec::new();
        let mut warnings = Vec::new();
        for provider in capabilities {
            match self.catalog.resolve(provider) {
                Ok(entry) => {
                    for tool in &entry.tools {
                        schemas.push(ToolSchema {
                            name: format!("{provider}{PROVIDER_DELIMITER}{}", tool.name),
                            description: format!("[{provider}] {}", tool.description),
                            input_schema: tool.input_schema.clone(),
                        });
                    }
                }
                Err(_) => {
                    warnings.push(format!(
                        "provider {provider} not registered in the tool catalog; its tools are not visible this invocation"
                    ));
                }
            }
        }
        (schemas, warnings)
    }

    async fn ensure_session(&self, session_id: &SessionId) {
        if let Some(store) = &self.sessions {
            if let Err(e) = store.create(session_id, None).await {
                tracing::warn!(session = %session_id, error = %e, "failed to ensure session exists");
            }
        }
    }

    async fn assemble_context(
        &self,
        input: &OperatorInput,
    ) -> Result<Vec<ProviderMessage>, OperatorError> {
        let mut messages = Vec::new();

        if let Some(session_id) = &input.session {
            self.ensure_session(session_id).await;
            if let Some(store) = &self.sessions {
                match store.get(session_id).await {
                    Ok(Some(session)) => {
                        for entry in &session.messages {
                            if matches!(entry.role, MessageRole::User | MessageRole::Assistant) {
                                if let Ok(pm) =
                                    serde_json::from_value::<ProviderMessage>(entry.content.clone())
                                {
                                    messages.push(pm);
                                }
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(session = %session_id, error = %e, "session history read failed, starting fresh");
                    }
                }
            }
        }

        let user_message = content_to_user_message(&input.message);
        self.persist_provider_message(&input.session, &user_message)
            .await;
        messages.push(user_message);

        Ok(messages)
    }

    async fn persist_provider_message(&self, session_id: &Option<SessionId>, message: &ProviderMessage) {
        let (Some(session_id), Some(store)) = (session_id, &self.sessions) else {
            return;
        };
        let value = serde_json::to_value(message).unwrap_or(serde_json::Value::Null);
        let entry = match &message.role {
            Role::User => SessionMessage::user(value),
            Role::Assistant => SessionMessage::assistant(value),
            Role::System => return,
        };
        if let Err(e) = store.append_message(session_id, entry).await {
            tracing::warn!(session = %session_id, error = %e, "failed to persist message");
        }
    }

    async fn record_usage(
        &self,
        session_id: &Option<SessionId>,
        input_tokens: u64,
        output_tokens: u64,
        cost: Decimal,
    ) -> Option<(u64, u64, Decimal)> {
        let (Some(session_id), Some(store)) = (session_id, &self.sessions) else {
            return None;
        };
        if let Err(e) = store
            .record_usage(session_id, input_tokens, output_tokens, cost)
            .await
        {
            tracing::warn!(session = %session_id, error = %e, "failed to record token usage");
            return None;
        }
        match store.get(session_id).await {
            Ok(Some(session)) => Some((
                session.cumulative_input_tokens,
                session.cumulative_output_tokens,
                session.cumulative_cost,
            )),
            _ => None,
        }
    }

    fn publish(&self, event: ExecutionEvent) {
        self.events.publish(&self.execution_id, event);
    }

    async fn publish_status(
        &self,
        session_id: &Option<SessionId>,
        kind: AgentStatusKind,
        event: ExecutionEvent,
    ) {
        if let (Some(session_id), Some(store)) = (session_id, &self.sessions) {
            let value = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
            if let Err(e) = store
                .append_message(session_id, SessionMessage::agent_status(kind, value))
                .await
            {
                tracing::warn!(session = %session_id, error = %e, "failed to persist status message");
            }
        }
        self.publish(event);
    }

    fn tool_deadline(&self, start: Instant, max_duration: Option<DurationMs>) -> tokio::time::Instant {
        let remaining = match max_duration {
            Some(d) => d
                .to_std()
                .checked_sub(start.elapsed())
                .unwrap_or(Duration::ZERO),
            None => DEFAULT_TOOL_TIMEOUT,
        };
        tokio::time::Instant::now() + remaining
    }

    fn build_metadata(
        &self,
        tokens_in: u64,
        tokens_out: u64,
        cost: Decimal,
        iterations_used: u32,
        tools_called: Vec<ToolCallRecord>,
        duration: DurationMs,
    ) -> OperatorMetadata {
        OperatorMetadata {
            tokens_in,
            tokens_out,
            cost,
            iterations_used,
            tools_called,
            duration,
        }
    }

    /// Publish the per-agent and per-execution terminal events and build
    /// the final `OperatorOutput`. Every return path in `execute` funnels
    /// through here so the terminal event fires exactly once.
    async fn finish(
        &self,
        session_id: &Option<SessionId>,
        answer: String,
        exit_reason: ExitReason,
        metadata: OperatorMetadata,
    ) -> OperatorOutput {
        let status = exit_reason.as_status_str().to_owned();

        if let (Some(session_id), Some(store)) = (session_id, &self.sessions) {
            if matches!(exit_reason, ExitReason::Error) {
                if let Err(e) = store
                    .append_message(session_id, SessionMessage::error(serde_json::json!({
                        "message": answer.clone(),
                    })))
                    .await
                {
                    tracing::warn!(session = %session_id, error = %e, "failed to persist error message");
                }
            }
        }

        self.publish_status(
            session_id,
            AgentStatusKind::AgentComplete,
            ExecutionEvent::AgentComplete {
                agent_id: self.agent.id.clone(),
                role: Some(self.agent.persona.role.clone()),
                final_answer: answer.clone(),
                status: status.clone(),
            },
        )
        .await;

        self.publish(ExecutionEvent::Complete {
            status,
            result: serde_json::json!({ "answer": answer }),
        });

        OperatorOutput {
            message: Content::text(answer),
            exit_reason,
            metadata,
        }
    }
}

#[async_trait]
impl Operator for ReactRuntime {
    async fn execute(&self, input: OperatorInput) -> Result<OperatorOutput, OperatorError> {
        let start = Instant::now();
        let config = self.resolve_config(&input);
        let (tools, warnings) = self.build_tool_schemas(&config.capabilities);
        for warning in warnings {
            self.publish(ExecutionEvent::Status {
                message: warning,
                sub_kind: Some("missing-provider".into()),
            });
        }

        self.publish(ExecutionEvent::ExecutionStarted {
            execution_id: self.execution_id.clone(),
            kind: "agent".into(),
        });

        let mut messages = self.assemble_context(&input).await?;

        let mut tokens_in: u64 = 0;
        let mut tokens_out: u64 = 0;
        let mut cost = Decimal::ZERO;
        let mut tool_records: Vec<ToolCallRecord> = Vec::new();
        let mut last_text = String::new();

        for iteration in 0..config.max_iterations {
            // 1. Cancellation check.
            if self.cancel.is_cancelled() {
                return Ok(self
                    .finish(
                        &input.session,
                        last_text,
                        ExitReason::Cancelled,
                        self.build_metadata(
                            tokens_in,
                            tokens_out,
                            cost,
                            iteration,
                            tool_records,
                            DurationMs::from(start.elapsed()),
                        ),
                    )
                    .await);
            }

            // 2. iteration_start.
            self.publish_status(
                &input.session,
                AgentStatusKind::IterationStart,
                ExecutionEvent::IterationStart {
                    iteration,
                    max_iterations: config.max_iterations,
                },
            )
            .await;

            // 3. Call the Model Gateway.
            let response = match self
                .gateway
                .send(
                    &config.binding,
                    messages.clone(),
                    tools.clone(),
                    Some(config.system.clone()),
                    &self.cancel,
                )
                .await
            {
                Ok(response) => response,
                Err(GatewayError::Cancelled) => {
                    return Ok(self
                        .finish(
                            &input.session,
                            last_text,
                            ExitReason::Cancelled,
                            self.build_metadata(
                                tokens_in,
                                tokens_out,
                                cost,
                                iteration,
                                tool_records,
                                DurationMs::from(start.elapsed()),
                            ),
                        )
                        .await);
                }
                Err(e) => {
                    let message = e.to_string();
                    self.publish(ExecutionEvent::Error {
                        message: message.clone(),
                    });
                    return Ok(self
                        .finish(
                            &input.session,
                            message,
                            ExitReason::Error,
                            self.build_metadata(
                                tokens_in,
                                tokens_out,
                                cost,
                                iteration,
                                tool_records,
                                DurationMs::from(start.elapsed()),
                            ),
                        )
                        .await);
                }
            };

            // 4. Token accounting.
            tokens_in += response.usage.input_tokens;
            tokens_out += response.usage.output_tokens;
            let call_cost = response.cost.unwrap_or(Decimal::ZERO);
            cost += call_cost;

            let cumulative = self
                .record_usage(
                    &input.session,
                    response.usage.input_tokens,
                    response.usage.output_tokens,
                    call_cost,
                )
                .await
                .unwrap_or((tokens_in, tokens_out, cost));
            self.publish(ExecutionEvent::CumulativeTokens {
                input_tokens: cumulative.0,
                output_tokens: cumulative.1,
                cost: cumulative.2,
            });

            let assistant_message = ProviderMessage {
                role: Role::Assistant,
                content: response.content.clone(),
            };
            self.persist_provider_message(&input.session, &assistant_message)
                .await;

            let reasoning_text = parts_to_content(&response.content)
                .as_text()
                .unwrap_or_default()
                .to_owned();
            if !reasoning_text.is_empty() {
                self.publish_status(
                    &input.session,
                    AgentStatusKind::AgentReasoning,
                    ExecutionEvent::AgentReasoning {
                        text: reasoning_text.clone(),
                    },
                )
                .await;
            }

            let metadata_now = || {
                self.build_metadata(
                    tokens_in,
                    tokens_out,
                    cost,
                    iteration + 1,
                    tool_records.clone(),
                    DurationMs::from(start.elapsed()),
                )
            };

            match response.stop_reason {
                // 5. end-turn.
                StopReason::EndTurn => {
                    let answer = reasoning_text;
                    self.publish_status(
                        &input.session,
                        AgentStatusKind::AgentAnswer,
                        ExecutionEvent::AgentAnswer {
                            answer: answer.clone(),
                            iteration,
                            status: ExitReason::Completed.as_status_str().to_owned(),
                        },
                    )
                    .await;
                    return Ok(self
                        .finish(&input.session, answer, ExitReason::Completed, metadata_now())
                        .await);
                }

                // 7. max-tokens.
                StopReason::MaxTokens => {
                    let answer = reasoning_text;
                    return Ok(self
                        .finish(
                            &input.session,
                            answer,
                            ExitReason::CompletedTruncated,
                            metadata_now(),
                        )
                        .await);
                }

                // 8. error.
                StopReason::Error => {
                    let message = if reasoning_text.is_empty() {
                        "provider reported an error".to_owned()
                    } else {
                        reasoning_text
                    };
                    self.publish(ExecutionEvent::Error {
                        message: message.clone(),
                    });
                    return Ok(self
                        .finish(&input.session, message, ExitReason::Error, metadata_now())
                        .await);
                }

                // 6. tool-use.
                StopReason::ToolUse => {
                    messages.push(assistant_message);
                    last_text = reasoning_text;

                    let requests = response.tool_use_requests();
                    let mut tool_result_parts = Vec::with_capacity(requests.len());
                    let mut cancelled_mid_tool = false;

                    for request in requests {
                        self.publish_status(
                            &input.session,
                            AgentStatusKind::ToolExecution,
                            ExecutionEvent::ToolExecution {
                                tool_name: request.name.clone(),
                                input: request.input.clone(),
                                iteration,
                            },
                        )
                        .await;

                        let Some((provider_str, tool_str)) =
                            request.name.split_once(PROVIDER_DELIMITER)
                        else {
                            let message = format!("malformed tool name: {}", request.name);
                            self.publish_status(
                                &input.session,
                                AgentStatusKind::ToolResult,
                                ExecutionEvent::ToolResult {
                                    tool_name: request.name.clone(),
                                    result: message.clone(),
                                    success: false,
                                    iteration,
                                },
                            )
                            .await;
                            tool_records.push(ToolCallRecord::new(
                                &request.name,
                                DurationMs::ZERO,
                                false,
                            ));
                            tool_result_parts.push(ContentPart::ToolResult {
                                tool_use_id: request.id,
                                content: message,
                                is_error: true,
                            });
                            continue;
                        };

                        let provider = ProviderName::from(provider_str);
                        if !config.capabilities.iter().any(|p| p == &provider) {
                            let message = format!(
                                "policy violation: tool {} requires provider {provider_str}, not in this agent's declared capability set",
                                request.name
                            );
                            self.publish_status(
                                &input.session,
                                AgentStatusKind::ToolResult,
                                ExecutionEvent::ToolResult {
                                    tool_name: request.name.clone(),
                                    result: message.clone(),
                                    success: false,
                                    iteration,
                                },
                            )
                            .await;
                            tool_records.push(ToolCallRecord::new(
                                &request.name,
                                DurationMs::ZERO,
                                false,
                            ));
                            tool_result_parts.push(ContentPart::ToolResult {
                                tool_use_id: request.id,
                                content: message,
                                is_error: true,
                            });
                            continue;
                        }

                        let endpoint = match self.catalog.resolve(&provider) {
                            Ok(entry) => entry.endpoint,
                            Err(e) => {
                                let message = e.to_string();
                                self.publish_status(
                                    &input.session,
                                    AgentStatusKind::ToolResult,
                                    ExecutionEvent::ToolResult {
                                        tool_name: request.name.clone(),
                                        result: message.clone(),
                                        success: false,
                                        iteration,
                                    },
                                )
                                .await;
                                tool_records.push(ToolCallRecord::new(
                                    &request.name,
                                    DurationMs::ZERO,
                                    false,
                                ));
                                tool_result_parts.push(ContentPart::ToolResult {
                                    tool_use_id: request.id,
                                    content: message,
                                    is_error: true,
                                });
                                continue;
                            }
                        };

                        let deadline = self.tool_deadline(start, config.max_duration);
                        let call_start = Instant::now();
                        let call_result = self
                            .tool_client
                            .call(&endpoint, tool_str, request.input.clone(), deadline, &self.cancel)
                            .await;
                        let call_duration = DurationMs::from(call_start.elapsed());

                        match call_result {
                            Ok(value) => {
                                let rendered = serde_json::to_string(&value).unwrap_or_default();
                                self.publish_status(
                                    &input.session,
                                    AgentStatusKind::ToolResult,
                                    ExecutionEvent::ToolResult {
                                        tool_name: request.name.clone(),
                                        result: truncate(&rendered, TOOL_RESULT_SNAPSHOT_LEN),
                                        success: true,
                                        iteration,
                                    },
                                )
                                .await;
                                tool_records.push(ToolCallRecord::new(
                                    &request.name,
                                    call_duration,
                                    true,
                                ));
                                tool_result_parts.push(ContentPart::ToolResult {
                                    tool_use_id: request.id,
                                    content: rendered,
                                    is_error: false,
                                });
                            }
                            Err(ToolClientError::Cancelled) => {
                                self.publish_status(
                                    &input.session,
                                    AgentStatusKind::ToolResult,
                                    ExecutionEvent::ToolResult {
                                        tool_name: request.name.clone(),
                                        result: "cancelled".into(),
                                        success: false,
                                        iteration,
                                    },
                                )
                                .await;
                                tool_records.push(ToolCallRecord::new(
                                    &request.name,
                                    call_duration,
                                    false,
                                ));
                                cancelled_mid_tool = true;
                                break;
                            }
                            Err(e) => {
                                let message = e.to_string();
                                self.publish_status(
                                    &input.session,
                                    AgentStatusKind::ToolResult,
                                    ExecutionEvent::ToolResult {
                                        tool_name: request.name.clone(),
                                        result: message.clone(),
                                        success: false,
                                        iteration,
                                    },
                                )
                                .await;
                                tool_records.push(ToolCallRecord::new(
                                    &request.name,
                                    call_duration,
                                    false,
                                ));
                                tool_result_parts.push(ContentPart::ToolResult {
                                    tool_use_id: request.id,
                                    content: message,
                                    is_error: true,
                                });
                            }
                        }
                    }

                    if cancelled_mid_tool {
                        return Ok(self
                            .finish(
                                &input.session,
                                last_text,
                                ExitReason::Cancelled,
                                metadata_now(),
                            )
                            .await);
                    }

                    let observation = ProviderMessage {
                        role: Role::User,
                        content: tool_result_parts,
                    };
                    self.persist_provider_message(&input.session, &observation)
                        .await;
                    messages.push(observation);
                }
            }

            // 9. agent_iteration summary.
            self.publish(ExecutionEvent::AgentIteration {
                iteration,
                max_iterations: config.max_iterations,
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
                model: response.model.clone(),
                used_tools: tool_records.iter().map(|r| r.name.clone()).collect(),
                stop_reason: format!("{:?}", response.stop_reason),
                reasoning_preview: truncate(&last_text, REASONING_PREVIEW_LEN),
            });
        }

        // Loop exited without end-turn: max iterations reached.
        Ok(self
            .finish(
                &input.session,
                last_text,
                ExitReason::CompletedMaxIterations,
                self.build_metadata(
                    tokens_in,
                    tokens_out,
                    cost,
                    config.max_iterations,
                    tool_records,
                    DurationMs::from(start.elapsed()),
                ),
            )
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as async_trait_attr;
    use conduit_model_gateway::provider::{Provider, ProviderError};
    use conduit_model_gateway::types::{
        ProviderRequest, ProviderResponse, TokenUsage,
    };
    use conduit_tool_catalog::{ProviderEntry, ProviderHealth, ToolDeclaration};
    use layer0::operator::TriggerType;
    use std::sync::Mutex;

    struct ScriptedProvider {
        responses: Mutex<Vec<ProviderResponse>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
            }
        }
    }

    #[async_trait_attr]
    impl Provider for ScriptedProvider {
        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ProviderError::Other("script exhausted".into()))
        }
    }

    fn text_response(text: &str) -> ProviderResponse {
        ProviderResponse {
            content: vec![ContentPart::Text { text: text.into() }],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                ..Default::default()
            },
            model: "scripted-1".into(),
            cost: Some(Decimal::new(1, 4)),
            truncated: None,
        }
    }

    fn tool_use_response(id: &str, name: &str, input: serde_json::Value) -> ProviderResponse {
        ProviderResponse {
            content: vec![ContentPart::ToolUse {
                id: id.into(),
                name: name.into(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage {
                input_tokens: 8,
                output_tokens: 4,
                ..Default::default()
            },
            model: "scripted-1".into(),
            cost: Some(Decimal::new(1, 4)),
            truncated: None,
        }
    }

    fn test_agent(capabilities: Vec<ProviderName>) -> AgentDefinition {
        AgentDefinition::new(
            AgentId::new("echo-assistant"),
            "Echo Assistant",
            Persona {
                role: "echo assistant".into(),
                system_prompt: "You echo what you're told.".into(),
                behavior_guidance: None,
                expertise_tags: vec![],
            },
            capabilities,
            AgentModelBinding {
                provider: ProviderName::from("scripted"),
                model: None,
                temperature: None,
                max_tokens: Some(512),
            },
        )
    }

    fn make_runtime(
        agent: AgentDefinition,
        provider: ScriptedProvider,
        catalog: Arc<ToolCatalog>,
    ) -> ReactRuntime {
        let mut gateway = ModelGateway::new();
        gateway.register(ProviderName::from("scripted"), Arc::new(provider));
        ReactRuntime::new(
            agent,
            ExecutionId::new("exec-1"),
            Arc::new(gateway),
            catalog,
            Arc::new(ToolClient::new()),
            Arc::new(EventBus::new()),
            None,
            CancellationToken::new(),
        )
    }

    fn simple_input(text: &str) -> OperatorInput {
        OperatorInput::new(Content::text(text), TriggerType::User)
    }

    #[tokio::test]
    async fn single_agent_one_shot() {
        let agent = test_agent(vec![]);
        let runtime = make_runtime(
            agent,
            ScriptedProvider::new(vec![text_response("hello there")]),
            Arc::new(ToolCatalog::new()),
        );

        let output = runtime.execute(simple_input("say 'hello'")).await.unwrap();

        assert_eq!(output.exit_reason, ExitReason::Completed);
        assert_eq!(output.metadata.iterations_used, 1);
        assert!(output.message.as_text().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn qualifies_tool_names_with_provider_prefix() {
        let catalog = Arc::new(ToolCatalog::new());
        catalog
            .register(
                ProviderName::from("file-provider"),
                ProviderEntry {
                    endpoint: "http://127.0.0.1:9/".into(),
                    tools: vec![ToolDeclaration {
                        name: "read".into(),
                        description: "read a file".into(),
                        input_schema: serde_json::json!({"type": "object"}),
                    }],
                    health: ProviderHealth::Healthy,
                    version: "1.0.0".into(),
                },
            )
            .unwrap();

        let agent = test_agent(vec![ProviderName::from("file-provider")]);
        let runtime = make_runtime(
            agent,
            ScriptedProvider::new(vec![text_response("no tools called")]),
            catalog,
        );
        let (schemas, warnings) = runtime.build_tool_schemas(&runtime.agent.capabilities);
        assert!(warnings.is_empty());
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "file-provider__read");
        assert!(schemas[0].description.starts_with("[file-provider] "));
    }

    #[tokio::test]
    async fn missing_provider_is_skipped_with_warning() {
        let agent = test_agent(vec![ProviderName::from("ghost-provider")]);
        let runtime = make_runtime(
            agent,
            ScriptedProvider::new(vec![text_response("ok")]),
            Arc::new(ToolCatalog::new()),
        );
        let (schemas, warnings) = runtime.build_tool_schemas(&runtime.agent.capabilities);
        assert!(schemas.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn policy_violation_on_undeclared_provider_does_not_abort() {
        let catalog = Arc::new(ToolCatalog::new());
        let agent = test_agent(vec![ProviderName::from("file-provider")]);
        let runtime = make_runtime(
            agent,
            ScriptedProvider::new(vec![
                tool_use_response("tu_1", "net-provider__scan", serde_json::json!({})),
                text_response("responding to the policy violation"),
            ]),
            catalog,
        );

        let output = runtime.execute(simple_input("scan the network")).await.unwrap();

        assert_eq!(output.exit_reason, ExitReason::Completed);
        assert_eq!(output.metadata.iterations_used, 2);
        assert_eq!(output.metadata.tools_called.len(), 1);
        assert!(!output.metadata.tools_called[0].success);
    }

    #[tokio::test]
    async fn max_iterations_reached_without_end_turn() {
        let catalog = Arc::new(ToolCatalog::new());
        catalog
            .register(
                ProviderName::from("file-provider"),
                ProviderEntry {
                    endpoint: "http://127.0.0.1:9/".into(),
                    tools: vec![ToolDeclaration {
                        name: "read".into(),
                        description: "read a file".into(),
                        input_schema: serde_json::json!({"type": "object"}),
                    }],
                    health: ProviderHealth::Healthy,
                    version: "1.0.0".into(),
                },
            )
            .unwrap();
        let mut agent = test_agent(vec![ProviderName::from("file-provider")]);
        agent.iteration_policy.max_iterations = 2;

        let runtime = make_runtime(
            agent,
            ScriptedProvider::new(vec![
                tool_use_response("tu_1", "file-provider__read", serde_json::json!({"path": "x"})),
                tool_use_response("tu_2", "file-provider__read", serde_json::json!({"path": "x"})),
                text_response("never reached"),
            ]),
            catalog,
        );

        let output = runtime.execute(simple_input("loop forever")).await.unwrap();
        assert_eq!(output.exit_reason, ExitReason::CompletedMaxIterations);
        assert_eq!(output.metadata.iterations_used, 2);
    }

    #[tokio::test]
    async fn cancellation_before_first_iteration_returns_cancelled() {
        let agent = test_agent(vec![]);
        let mut gateway = ModelGateway::new();
        gateway.register(
            ProviderName::from("scripted"),
            Arc::new(ScriptedProvider::new(vec![text_response("unused")])),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runtime = ReactRuntime::new(
            agent,
            ExecutionId::new("exec-2"),
            Arc::new(gateway),
            Arc::new(ToolCatalog::new()),
            Arc::new(ToolClient::new()),
            Arc::new(EventBus::new()),
            None,
            cancel,
        );

        let output = runtime.execute(simple_input("hi")).await.unwrap();
        assert_eq!(output.exit_reason, ExitReason::Cancelled);
        assert_eq!(output.metadata.iterations_used, 0);
    }

    #[tokio::test]
    async fn empty_capability_set_runs_on_textual_reasoning_only() {
        let agent = test_agent(vec![]);
        let runtime = make_runtime(
            agent,
            ScriptedProvider::new(vec![text_response("just reasoning, no tools")]),
            Arc::new(ToolCatalog::new()),
        );
        let output = runtime.execute(simple_input("think about it")).await.unwrap();
        assert_eq!(output.exit_reason, ExitReason::Completed);
        assert!(output.metadata.tools_called.is_empty());
    }

    #[test]
    fn agent_definition_validity() {
        let mut agent = test_agent(vec![]);
        assert!(agent.is_valid());
        agent.iteration_policy.max_iterations = 0;
        assert!(!agent.is_valid());
    }

    #[test]
    fn truncate_adds_ellipsis_only_when_needed() {
        assert_eq!(truncate("short", 10), "short");
        let long = "a".repeat(20);
        let truncated = truncate(&long, 5);
        assert_eq!(truncated.chars().count(), 6);
        assert!(truncated.ends_with('\u{2026}'));
    }
}
