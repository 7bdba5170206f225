#![deny(missing_docs)]
//! Team Coordinator: runs a [`TeamDefinition`] over one task by dispatching
//! to per-member operators.
//!
//! Members are addressed through `Arc<dyn Operator>` exactly like
//! [`layer0::orchestrator::Orchestrator`]'s in-process implementation
//! dispatches agents — the coordinator doesn't know or care whether a
//! member is an Agent ReAct Runtime, a nested team, or a test double. Each
//! member is expected to already be bound to its own sub-execution (own
//! `ExecutionId`, sharing the team's `EventBus` registry) so that a
//! member's own terminal event never collides with the team's.

use std::collections::HashMap;
use std::sync::Arc;

use conduit_event_bus::{EventBus, ExecutionEvent};
use layer0::content::Content;
use layer0::error::{OperatorError, OrchError};
use layer0::id::{AgentId, ExecutionId, SessionId, TeamId};
use layer0::operator::{ExitReason, Operator, OperatorConfig, OperatorInput, TriggerType};
use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How a team coordinates its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamMode {
    /// Run members one after another in declaration order.
    Sequential,
    /// Launch all members concurrently against the same launch-time snapshot.
    Parallel,
    /// Like sequential, but each member sees every prior member's answer and
    /// is instructed to critique and extend it.
    Collaborative,
}

/// One member of a team definition.
#[derive(Debug, Clone)]
pub struct TeamMember {
    /// The agent this member runs as.
    pub agent_id: AgentId,
    /// Optional role label surfaced in events and outcomes.
    pub role: Option<String>,
    /// Capability restriction substituted in place of the agent's full
    /// declared set. `None` leaves the agent's own capabilities intact.
    pub allowed_providers: Option<Vec<String>>,
}

impl TeamMember {
    /// Create a member with no role or capability restriction.
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            role: None,
            allowed_providers: None,
        }
    }

    /// Attach a role label.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Restrict this member's visible tool set.
    pub fn with_allowed_providers(mut self, providers: Vec<String>) -> Self {
        self.allowed_providers = Some(providers);
        self
    }
}

/// A team definition: members plus coordination mode and failure policy.
#[derive(Debug, Clone)]
pub struct TeamDefinition {
    /// Unique identifier for this team definition.
    pub id: TeamId,
    /// Human-readable name.
    pub name: String,
    /// Coordination mode.
    pub mode: TeamMode,
    /// Members in declaration order.
    pub members: Vec<TeamMember>,
    /// Whether prior members' answers are shared as context with
    /// subsequent members in sequential mode. Collaborative mode always
    /// shares prior answers regardless of this flag — sharing is
    /// intrinsic to what "collaborative" means.
    pub context_sharing: bool,
    /// In sequential mode, abort the rest of the team on the first member
    /// failure instead of recording the error and continuing.
    pub strict_mode: bool,
    /// Bounds how many parallel-mode members run at once. `None` means
    /// unbounded (up to the member count).
    pub max_concurrent_agents: Option<usize>,
}

impl TeamDefinition {
    /// Create a team definition with the common defaults: context sharing
    /// on, strict mode off, no concurrency cap.
    pub fn new(id: TeamId, name: impl Into<String>, mode: TeamMode, members: Vec<TeamMember>) -> Self {
        Self {
            id,
            name: name.into(),
            mode,
            members,
            context_sharing: true,
            strict_mode: false,
            max_concurrent_agents: None,
        }
    }
}

/// Per-member outcome of a team run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemberOutcome {
    /// The member's agent id.
    pub agent_id: AgentId,
    /// The member's role, if any.
    pub role: Option<String>,
    /// Boundary status string (`completed`, `error`, `cancelled`, ...).
    pub status: String,
    /// ReAct iterations the member used (0 for a member that never dispatched).
    pub iterations_used: u32,
    /// Input tokens the member consumed.
    pub tokens_in: u64,
    /// Output tokens the member generated.
    pub tokens_out: u64,
    /// Cost the member incurred.
    pub cost: Decimal,
    /// The member's final answer, or an error message if it failed.
    pub answer: String,
}

/// Overall outcome of a team run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TeamRunOutput {
    /// Boundary status string for the whole team run.
    pub status: String,
    /// The team's combined answer.
    pub answer: String,
    /// Per-member sub-records, in completion order.
    pub members: Vec<MemberOutcome>,
    /// Sum of every member's input tokens.
    pub tokens_in: u64,
    /// Sum of every member's output tokens.
    pub tokens_out: u64,
    /// Sum of every member's cost.
    pub cost: Decimal,
}

impl TeamRunOutput {
    fn cancelled() -> Self {
        Self {
            status: "cancelled".into(),
            answer: String::new(),
            members: Vec::new(),
            tokens_in: 0,
            tokens_out: 0,
            cost: Decimal::ZERO,
        }
    }
}

/// Runs a [`TeamDefinition`] over a task by dispatching to per-member
/// operators resolved from a static registry.
pub struct TeamCoordinator {
    agents: HashMap<AgentId, Arc<dyn Operator>>,
    execution_id: ExecutionId,
    events: Arc<EventBus>,
    cancel: CancellationToken,
}

impl TeamCoordinator {
    /// Create a coordinator for one team run. `agents` must already contain
    /// an operator for every agent id the team's members reference.
    pub fn new(
        agents: HashMap<AgentId, Arc<dyn Operator>>,
        execution_id: ExecutionId,
        events: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            agents,
            execution_id,
            events,
            cancel,
        }
    }

    fn publish(&self, event: ExecutionEvent) {
        self.events.publish(&self.execution_id, event);
    }

    fn resolve(&self, agent_id: &AgentId) -> Result<Arc<dyn Operator>, OrchError> {
        self.agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| OrchError::AgentNotFound(agent_id.to_string()))
    }

    /// Run the team over `task`, returning once every member has finished
    /// (or the team aborted under strict mode / cancellation).
    pub async fn run(
        &self,
        team: &TeamDefinition,
        task: Content,
        session: Option<SessionId>,
    ) -> Result<TeamRunOutput, OrchError> {
        if self.cancel.is_cancelled() {
            return Ok(TeamRunOutput::cancelled());
        }
        match team.mode {
            TeamMode::Sequential => self.run_sequential(team, task, session, false).await,
            TeamMode::Collaborative => self.run_sequential(team, task, session, true).await,
            TeamMode::Parallel => self.run_parallel(team, task, session).await,
        }
    }

    async fn run_sequential(
        &self,
        team: &TeamDefinition,
        task: Content,
        session: Option<SessionId>,
        collaborative: bool,
    ) -> Result<TeamRunOutput, OrchError> {
        let mut outcomes = Vec::with_capacity(team.members.len());
        let mut shared_context: Vec<serde_json::Value> = Vec::new();
        let mut tokens_in = 0u64;
        let mut tokens_out = 0u64;
        let mut cost = Decimal::ZERO;
        let mut any_error = false;
        let total = team.members.len().max(1) as f64;

        for (idx, member) in team.members.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(TeamRunOutput {
                    status: "cancelled".into(),
                    answer: outcomes.last().map(|o: &MemberOutcome| o.answer.clone()).unwrap_or_default(),
                    members: outcomes,
                    tokens_in,
                    tokens_out,
                    cost,
                });
            }

            self.publish(ExecutionEvent::AgentStart {
                agent_id: member.agent_id.clone(),
                role: member.role.clone(),
                progress: idx as f64 / total,
            });

            let op = match self.resolve(&member.agent_id) {
                Ok(op) => op,
                Err(e) => {
                    any_error = true;
                    let message = e.to_string();
                    outcomes.push(error_outcome(member, &message));
                    shared_context.push(serde_json::json!({"agent_id": member.agent_id.as_str(), "error": message}));
                    if team.strict_mode {
                        return Ok(TeamRunOutput {
                            status: "error".into(),
                            answer: e.to_string(),
                            members: outcomes,
                            tokens_in,
                            tokens_out,
                            cost,
                        });
                    }
                    continue;
                }
            };

            let mut config = OperatorConfig {
                allowed_providers: member.allowed_providers.clone(),
                ..Default::default()
            };
            if collaborative && !shared_context.is_empty() {
                config.system_addendum = Some(
                    "Critique and extend the prior team members' answers rather than starting fresh.".into(),
                );
            }
            let mut input = OperatorInput::new(task.clone(), TriggerType::Task);
            input.session = session.clone();
            input.config = Some(config);
            if (team.context_sharing || collaborative) && !shared_context.is_empty() {
                input.metadata = serde_json::json!({ "shared_context": shared_context });
            }

            match op.execute(input).await {
                Ok(output) => {
                    let answer = output.message.as_text().unwrap_or_default().to_string();
                    tokens_in += output.metadata.tokens_in;
                    tokens_out += output.metadata.tokens_out;
                    cost += output.metadata.cost;
                    let status = output.exit_reason.as_status_str().to_string();
                    if matches!(output.exit_reason, ExitReason::Error) {
                        any_error = true;
                    }
                    self.publish(ExecutionEvent::AgentComplete {
                        agent_id: member.agent_id.clone(),
                        role: member.role.clone(),
                        final_answer: answer.clone(),
                        status: status.clone(),
                    });
                    shared_context.push(serde_json::json!({"agent_id": member.agent_id.as_str(), "answer": answer}));
                    outcomes.push(MemberOutcome {
                        agent_id: member.agent_id.clone(),
                        role: member.role.clone(),
                        status,
                        iterations_used: output.metadata.iterations_used,
                        tokens_in: output.metadata.tokens_in,
                        tokens_out: output.metadata.tokens_out,
                        cost: output.metadata.cost,
                        answer,
                    });
                }
                Err(e) => {
                    any_error = true;
                    let message = e.to_string();
                    self.publish(ExecutionEvent::AgentComplete {
                        agent_id: member.agent_id.clone(),
                        role: member.role.clone(),
                        final_answer: String::new(),
                        status: "error".into(),
                    });
                    shared_context.push(serde_json::json!({"agent_id": member.agent_id.as_str(), "error": message}));
                    outcomes.push(error_outcome(member, &message));
                    if team.strict_mode {
                        return Ok(TeamRunOutput {
                            status: "error".into(),
                            answer: message,
                            members: outcomes,
                            tokens_in,
                            tokens_out,
                            cost,
                        });
                    }
                }
            }
        }

        let status = if any_error { "completed-with-errors" } else { "completed" };
        let answer = outcomes.last().map(|o| o.answer.clone()).unwrap_or_default();
        Ok(TeamRunOutput {
            status: status.into(),
            answer,
            members: outcomes,
            tokens_in,
            tokens_out,
            cost,
        })
    }

    async fn run_parallel(
        &self,
        team: &TeamDefinition,
        task: Content,
        session: Option<SessionId>,
    ) -> Result<TeamRunOutput, OrchError> {
        let limit = team.max_concurrent_agents.unwrap_or_else(|| team.members.len().max(1));
        let semaphore = Arc::new(Semaphore::new(limit.max(1)));
        let total = team.members.len().max(1) as f64;

        let mut join_set: JoinSet<(TeamMember, Result<layer0::operator::OperatorOutput, OrchError>)> =
            JoinSet::new();

        for (idx, member) in team.members.iter().cloned().enumerate() {
            self.publish(ExecutionEvent::AgentStart {
                agent_id: member.agent_id.clone(),
                role: member.role.clone(),
                progress: idx as f64 / total,
            });

            let op = match self.resolve(&member.agent_id) {
                Ok(op) => op,
                Err(e) => {
                    join_set.spawn(async move { (member, Err(e)) });
                    continue;
                }
            };

            let config = OperatorConfig {
                allowed_providers: member.allowed_providers.clone(),
                ..Default::default()
            };
            let mut input = OperatorInput::new(task.clone(), TriggerType::Task);
            input.session = session.clone();
            input.config = Some(config);

            let permit_sem = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            join_set.spawn(async move {
                let _permit = permit_sem.acquire_owned().await;
                if cancel.is_cancelled() {
                    return (member, Err(OrchError::Operator(OperatorError::Cancelled)));
                }
                let result = op.execute(input).await.map_err(OrchError::Operator);
                (member, result)
            });
        }

        let mut outcomes = Vec::with_capacity(team.members.len());
        let mut tokens_in = 0u64;
        let mut tokens_out = 0u64;
        let mut cost = Decimal::ZERO;
        let mut any_error = false;

        while let Some(joined) = join_set.join_next().await {
            let (member, result) = joined.map_err(|e| OrchError::DispatchFailed(e.to_string()))?;
            match result {
                Ok(output) => {
                    let answer = output.message.as_text().unwrap_or_default().to_string();
                    tokens_in += output.metadata.tokens_in;
                    tokens_out += output.metadata.tokens_out;
                    cost += output.metadata.cost;
                    let status = output.exit_reason.as_status_str().to_string();
                    if matches!(output.exit_reason, ExitReason::Error) {
                        any_error = true;
                    }
                    self.publish(ExecutionEvent::AgentComplete {
                        agent_id: member.agent_id.clone(),
                        role: member.role.clone(),
                        final_answer: answer.clone(),
                        status: status.clone(),
                    });
                    outcomes.push(MemberOutcome {
                        agent_id: member.agent_id,
                        role: member.role,
                        status,
                        iterations_used: output.metadata.iterations_used,
                        tokens_in: output.metadata.tokens_in,
                        tokens_out: output.metadata.tokens_out,
                        cost: output.metadata.cost,
                        answer,
                    });
                }
                Err(e) => {
                    any_error = true;
                    let status = if matches!(e, OrchError::Operator(OperatorError::Cancelled)) {
                        "cancelled"
                    } else {
                        "error"
                    };
                    self.publish(ExecutionEvent::AgentComplete {
                        agent_id: member.agent_id.clone(),
                        role: member.role.clone(),
                        final_answer: String::new(),
                        status: status.into(),
                    });
                    outcomes.push(error_outcome_owned(member, status, e.to_string()));
                }
            }
        }

        let status = if self.cancel.is_cancelled() {
            "cancelled"
        } else if any_error {
            "completed-with-errors"
        } else {
            "completed"
        };
        let answer = outcomes
            .iter()
            .map(|o| o.answer.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(TeamRunOutput {
            status: status.into(),
            answer,
            members: outcomes,
            tokens_in,
            tokens_out,
            cost,
        })
    }
}

fn error_outcome(member: &TeamMember, message: &str) -> MemberOutcome {
    MemberOutcome {
        agent_id: member.agent_id.clone(),
        role: member.role.clone(),
        status: "error".into(),
        iterations_used: 0,
        tokens_in: 0,
        tokens_out: 0,
        cost: Decimal::ZERO,
        answer: message.to_string(),
    }
}

fn error_outcome_owned(member: TeamMember, status: &str, message: String) -> MemberOutcome {
    MemberOutcome {
        agent_id: member.agent_id,
        role: member.role,
        status: status.into(),
        iterations_used: 0,
        tokens_in: 0,
        tokens_out: 0,
        cost: Decimal::ZERO,
        answer: message,
    }
}
