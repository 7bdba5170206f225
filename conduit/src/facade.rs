//! The Orchestrator Facade: the single entry point a caller (an HTTP
//! transport, a CLI, a trigger container's callback) drives instead of
//! reaching into the component crates directly.
//!
//! Thin by design: it assigns execution-ids, registers and tears down
//! cancellation tokens, builds the right runtime for the request
//! (`ReactRuntime` for an agent, `TeamCoordinator` for a team,
//! `WorkflowEngine` for a workflow), publishes `ExecutionStarted` and a
//! terminal `Complete`/`Error` event around team and workflow runs (the
//! Agent ReAct Runtime already publishes its own), persists the
//! execution record, and releases the cancellation registration on the
//! way out.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use conduit_cancellation::CancellationRegistry;
use conduit_event_bus::{EventBus, ExecutionEvent};
use conduit_model_gateway::ModelGateway;
use conduit_tool_catalog::ToolCatalog;
use conduit_tool_client::ToolClient;
use layer0::content::Content;
use layer0::error::{OperatorError, OrchError};
use layer0::id::{AgentId, ExecutionId, SessionId};
use layer0::operator::{Operator, OperatorInput, TriggerType};
use layer0::session::SessionStore;
use layer0::state::{Scope, StateStore};
use tokio_util::sync::CancellationToken;

use conduit_agent_react::{AgentDefinition, ReactRuntime};

#[cfg(feature = "team")]
use conduit_team::{MemberOutcome, TeamCoordinator, TeamDefinition};
#[cfg(feature = "team")]
use layer0::id::TeamId;

#[cfg(feature = "workflow")]
use conduit_workflow::{NodeId, NodeResult, WorkflowDefinition, WorkflowEngine};
#[cfg(feature = "workflow")]
use layer0::id::WorkflowId;

#[cfg(feature = "lifecycle")]
use conduit_provider_lifecycle::ProviderLifecycleManager;
#[cfg(feature = "lifecycle")]
use conduit_tool_catalog::ProviderHealth;
#[cfg(feature = "lifecycle")]
use conduit_trigger_lifecycle::{TriggerHealth, TriggerInstallRequest, TriggerLifecycleManager, TriggerRegistry};
#[cfg(feature = "lifecycle")]
use layer0::id::{ProviderName, TriggerId};

/// Errors the facade can return. Wraps the component crates' own error
/// types rather than re-deriving them, widening via their own `kind()`.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    /// No agent is registered under this id.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// No team is registered under this id.
    #[cfg(feature = "team")]
    #[error("unknown team: {0}")]
    UnknownTeam(String),

    /// No workflow is registered under this id.
    #[cfg(feature = "workflow")]
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),

    /// An agent invocation failed.
    #[error(transparent)]
    Operator(#[from] OperatorError),

    /// Team dispatch failed.
    #[error(transparent)]
    Orchestration(#[from] OrchError),

    /// A workflow run failed outright (the graph itself was invalid — a
    /// failed node is reported in the response, not as this error).
    #[cfg(feature = "workflow")]
    #[error(transparent)]
    Workflow(#[from] conduit_workflow::WorkflowError),

    /// Provider install/uninstall/update failed.
    #[cfg(feature = "lifecycle")]
    #[error(transparent)]
    ProviderLifecycle(#[from] conduit_provider_lifecycle::LifecycleError),

    /// Trigger install/uninstall/update failed.
    #[cfg(feature = "lifecycle")]
    #[error(transparent)]
    TriggerLifecycle(#[from] conduit_trigger_lifecycle::TriggerLifecycleError),

    /// A session-store operation failed.
    #[error(transparent)]
    Session(#[from] layer0::error::StateError),
}

impl FacadeError {
    /// Widen to the shared error-kind taxonomy.
    pub fn kind(&self) -> layer0::ErrorKind {
        match self {
            FacadeError::UnknownAgent(_) => layer0::ErrorKind::ConfigurationError,
            #[cfg(feature = "team")]
            FacadeError::UnknownTeam(_) => layer0::ErrorKind::ConfigurationError,
            #[cfg(feature = "workflow")]
            FacadeError::UnknownWorkflow(_) => layer0::ErrorKind::ConfigurationError,
            FacadeError::Operator(e) => e.kind(),
            FacadeError::Orchestration(e) => e.kind(),
            #[cfg(feature = "workflow")]
            FacadeError::Workflow(e) => e.kind(),
            #[cfg(feature = "lifecycle")]
            FacadeError::ProviderLifecycle(e) => e.kind(),
            #[cfg(feature = "lifecycle")]
            FacadeError::TriggerLifecycle(e) => e.kind(),
            FacadeError::Session(e) => e.kind(),
        }
    }
}

/// A new, sortable, chronologically-ordered execution id. UUIDv7 embeds a
/// millisecond timestamp in its high bits, so lexicographic string order
/// on the canonical hex form matches creation order — the property §6
/// requires of execution-ids.
fn new_execution_id() -> ExecutionId {
    ExecutionId::new(uuid::Uuid::now_v7().to_string())
}

/// Input to a run-agent request.
#[derive(Debug, Clone)]
pub struct RunAgentRequest {
    /// Which registered agent definition to run.
    pub agent_id: AgentId,
    /// The task text.
    pub task: String,
    /// Session to read/append conversation history from, if any.
    pub session_id: Option<SessionId>,
    /// Supplemental context passed through to the operator unchanged.
    pub context: Option<serde_json::Value>,
    /// What caused this run. Defaults to `TriggerType::User`; a caller
    /// fronting a trigger container's callback should set `Trigger`.
    pub trigger: TriggerType,
}

impl RunAgentRequest {
    /// Start building a request for `agent_id` with the given task text.
    pub fn new(agent_id: AgentId, task: impl Into<String>) -> Self {
        Self {
            agent_id,
            task: task.into(),
            session_id: None,
            context: None,
            trigger: TriggerType::User,
        }
    }

    /// Attach a session for conversation continuity.
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attach supplemental context.
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Override the default `TriggerType::User`.
    pub fn with_trigger(mut self, trigger: TriggerType) -> Self {
        self.trigger = trigger;
        self
    }
}

/// Output of a run-agent request, per §6's boundary shape.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunAgentResponse {
    /// The execution id assigned to this run.
    pub execution_id: ExecutionId,
    /// The agent's final answer text.
    pub answer: String,
    /// Boundary status string.
    pub status: String,
    /// ReAct iterations used.
    pub iterations: u32,
    /// The model's reasoning content, in the order it was produced.
    pub reasoning: Vec<String>,
    /// One-line summaries of each tool call, in the order they returned.
    pub tool_calls: Vec<String>,
}

/// Accumulates the reasoning/tool-call trail of one execution by draining
/// its event stream in the background while the runtime executes.
#[derive(Default)]
struct CollectedTrail {
    reasoning: Vec<String>,
    tool_calls: Vec<String>,
}

fn record_event(trail: &mut CollectedTrail, event: ExecutionEvent) {
    match event {
        ExecutionEvent::AgentReasoning { text } => trail.reasoning.push(text),
        ExecutionEvent::ToolResult { tool_name, success, result, .. } => {
            let outcome = if success { "ok" } else { "failed" };
            trail.tool_calls.push(format!("{tool_name}: {outcome} ({result})"));
        }
        _ => {}
    }
}

/// Subscribe to `execution_id`'s event stream and drain
/// `AgentReasoning`/`ToolResult` events until `stop_rx` fires, then do a
/// final non-blocking drain for anything published in the gap between the
/// runtime finishing and the stop signal being observed.
async fn collect_trail(
    mut rx: tokio::sync::broadcast::Receiver<ExecutionEvent>,
    mut stop_rx: tokio::sync::oneshot::Receiver<()>,
) -> CollectedTrail {
    let mut trail = CollectedTrail::default();
    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            event = rx.recv() => match event {
                Ok(event) => record_event(&mut trail, event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    while let Ok(event) = rx.try_recv() {
        record_event(&mut trail, event);
    }
    trail
}

/// Input to a run-team request.
#[cfg(feature = "team")]
#[derive(Debug, Clone)]
pub struct RunTeamRequest {
    /// Which registered team definition to run.
    pub team_id: TeamId,
    /// The task text every member is dispatched with.
    pub task: String,
    /// Session for conversation continuity, if any.
    pub session_id: Option<SessionId>,
}

#[cfg(feature = "team")]
impl RunTeamRequest {
    /// Start building a request for `team_id` with the given task text.
    pub fn new(team_id: TeamId, task: impl Into<String>) -> Self {
        Self { team_id, task: task.into(), session_id: None }
    }

    /// Attach a session for conversation continuity.
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// Output of a run-team request, per §6's boundary shape.
#[cfg(feature = "team")]
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunTeamResponse {
    /// The execution id assigned to this run.
    pub execution_id: ExecutionId,
    /// Team-level boundary status string.
    pub status: String,
    /// The team's combined answer.
    pub answer: String,
    /// Per-member sub-records, in completion order.
    pub members: Vec<MemberOutcome>,
}

/// Input to a run-workflow request.
#[cfg(feature = "workflow")]
#[derive(Debug, Clone)]
pub struct RunWorkflowRequest {
    /// Which registered workflow definition to run.
    pub workflow_id: WorkflowId,
    /// Caller-supplied parameters. [`conduit_workflow::ParamValue::Param`]
    /// references in the workflow's node templates resolve against this.
    pub params: HashMap<String, serde_json::Value>,
}

#[cfg(feature = "workflow")]
impl RunWorkflowRequest {
    /// Start building a request for `workflow_id` with no parameters set.
    pub fn new(workflow_id: WorkflowId) -> Self {
        Self { workflow_id, params: HashMap::new() }
    }

    /// Supply the request parameter map.
    pub fn with_params(mut self, params: HashMap<String, serde_json::Value>) -> Self {
        self.params = params;
        self
    }
}

/// Output of a run-workflow request, per §6's boundary shape.
#[cfg(feature = "workflow")]
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunWorkflowResponse {
    /// The execution id assigned to this run.
    pub execution_id: ExecutionId,
    /// Boundary status string (`completed`, `completed-with-errors`, `cancelled`).
    pub status: String,
    /// Per-node results keyed by node id.
    pub node_outputs: HashMap<NodeId, NodeResult>,
}

/// Response to an install-provider or install-trigger request, per §6's
/// boundary shape.
#[cfg(feature = "lifecycle")]
#[derive(Debug, Clone, serde::Serialize)]
pub struct InstallResponse {
    /// The installed provider/trigger name.
    pub name: String,
    /// Version string reported by the installed package.
    pub version: String,
    /// The container name the runtime started it under — the
    /// provider/trigger name itself, by convention.
    pub container_name: String,
    /// Health immediately after install (post health-wait).
    pub health: String,
}

/// Ties the component crates together behind one entry point: run an
/// agent, run a team, run a workflow, install a provider or trigger,
/// cancel an execution.
///
/// Definitions (agents, teams, workflows) are registered explicitly after
/// construction — this crate does not parse on-disk configuration itself
/// (that's `conduit_config`'s job); a caller loads definitions however it
/// likes and hands them to `register_*`.
pub struct OrchestratorFacade {
    gateway: Arc<ModelGateway>,
    catalog: Arc<ToolCatalog>,
    tool_client: Arc<ToolClient>,
    events: Arc<EventBus>,
    cancellation: Arc<CancellationRegistry>,
    sessions: Option<Arc<dyn SessionStore>>,
    records: Option<Arc<dyn StateStore>>,
    agents: RwLock<HashMap<AgentId, AgentDefinition>>,
    #[cfg(feature = "team")]
    teams: RwLock<HashMap<TeamId, TeamDefinition>>,
    #[cfg(feature = "workflow")]
    workflows: RwLock<HashMap<WorkflowId, WorkflowDefinition>>,
    #[cfg(feature = "workflow")]
    workflow_engine: WorkflowEngine,
    #[cfg(feature = "lifecycle")]
    providers: Option<Arc<ProviderLifecycleManager>>,
    #[cfg(feature = "lifecycle")]
    triggers: Option<(Arc<TriggerLifecycleManager>, Arc<TriggerRegistry>)>,
}

impl OrchestratorFacade {
    /// Build a facade over the shared subsystems every run needs. Session
    /// persistence, the execution record store, and the lifecycle
    /// managers are attached afterward with the `with_*` methods, since
    /// not every deployment wants all of them.
    pub fn new(
        gateway: Arc<ModelGateway>,
        catalog: Arc<ToolCatalog>,
        tool_client: Arc<ToolClient>,
        events: Arc<EventBus>,
        cancellation: Arc<CancellationRegistry>,
    ) -> Self {
        #[cfg(feature = "workflow")]
        let workflow_engine = WorkflowEngine::new(catalog.clone(), tool_client.clone(), events.clone());
        Self {
            gateway,
            catalog,
            tool_client,
            events,
            cancellation,
            sessions: None,
            records: None,
            agents: RwLock::new(HashMap::new()),
            #[cfg(feature = "team")]
            teams: RwLock::new(HashMap::new()),
            #[cfg(feature = "workflow")]
            workflows: RwLock::new(HashMap::new()),
            #[cfg(feature = "workflow")]
            workflow_engine,
            #[cfg(feature = "lifecycle")]
            providers: None,
            #[cfg(feature = "lifecycle")]
            triggers: None,
        }
    }

    /// Attach a Session Store backend, enabling conversation continuity.
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Attach a State Store used to persist finished execution records
    /// under `Scope::Global`, keyed `execution/{execution-id}`.
    pub fn with_execution_records(mut self, records: Arc<dyn StateStore>) -> Self {
        self.records = Some(records);
        self
    }

    /// Attach a Provider Lifecycle Manager, enabling install-provider requests.
    #[cfg(feature = "lifecycle")]
    pub fn with_provider_lifecycle(mut self, providers: Arc<ProviderLifecycleManager>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Attach a Trigger Lifecycle Manager and its backing registry,
    /// enabling install-trigger requests.
    #[cfg(feature = "lifecycle")]
    pub fn with_trigger_lifecycle(
        mut self,
        triggers: Arc<TriggerLifecycleManager>,
        registry: Arc<TriggerRegistry>,
    ) -> Self {
        self.triggers = Some((triggers, registry));
        self
    }

    /// Register (or replace) an agent definition, addressable by its id
    /// from run-agent and team-member requests.
    pub fn register_agent(&self, agent: AgentDefinition) {
        self.agents.write().expect("facade lock poisoned").insert(agent.id.clone(), agent);
    }

    /// Register (or replace) a team definition.
    #[cfg(feature = "team")]
    pub fn register_team(&self, team: TeamDefinition) {
        self.teams.write().expect("facade lock poisoned").insert(team.id.clone(), team);
    }

    /// Register (or replace) a workflow definition.
    #[cfg(feature = "workflow")]
    pub fn register_workflow(&self, workflow: WorkflowDefinition) {
        self.workflows.write().expect("facade lock poisoned").insert(workflow.id.clone(), workflow);
    }

    fn build_operator(&self, agent: AgentDefinition, execution_id: ExecutionId, cancel: CancellationToken) -> Arc<dyn Operator> {
        Arc::new(ReactRuntime::new(
            agent,
            execution_id,
            self.gateway.clone(),
            self.catalog.clone(),
            self.tool_client.clone(),
            self.events.clone(),
            self.sessions.clone(),
            cancel,
        ))
    }

    async fn persist_record(&self, execution_id: &ExecutionId, record: serde_json::Value) {
        if let Some(records) = &self.records {
            let key = format!("execution/{execution_id}");
            if let Err(e) = records.write(&Scope::Global, &key, record).await {
                tracing::warn!(error = %e, %execution_id, "failed to persist execution record");
            }
        }
    }

    /// Mark `execution_id`'s cancellation token. Cooperative: in-flight
    /// work observes the token at its next suspension point.
    pub fn cancel(&self, execution_id: &ExecutionId) {
        self.cancellation.cancel(execution_id);
    }

    /// Run a single agent to completion.
    ///
    /// The Agent ReAct Runtime already publishes its own
    /// `ExecutionStarted`/`Complete`/`Error` events, so the facade does
    /// not duplicate them here — it only wraps the run with event
    /// collection, cancellation bookkeeping, and record persistence.
    pub async fn run_agent(&self, request: RunAgentRequest) -> Result<RunAgentResponse, FacadeError> {
        let agent = {
            let agents = self.agents.read().expect("facade lock poisoned");
            agents.get(&request.agent_id).cloned().ok_or_else(|| FacadeError::UnknownAgent(request.agent_id.to_string()))?
        };

        let execution_id = new_execution_id();
        let cancel = self.cancellation.register(execution_id.clone());
        let rx = self.events.subscribe(&execution_id);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
        let collector = tokio::spawn(collect_trail(rx, stop_rx));

        let operator = self.build_operator(agent, execution_id.clone(), cancel);
        let mut input = OperatorInput::new(Content::text(request.task), request.trigger);
        input.session = request.session_id;
        if let Some(context) = request.context {
            input.metadata = context;
        }

        let result = operator.execute(input).await;
        let _ = stop_tx.send(());
        let trail = collector.await.unwrap_or_default();
        self.cancellation.unregister(&execution_id);

        let output = result?;
        let status = output.exit_reason.as_status_str().to_string();
        let answer = output.message.as_text().unwrap_or_default().to_string();
        let response = RunAgentResponse {
            execution_id: execution_id.clone(),
            answer,
            status,
            iterations: output.metadata.iterations_used,
            reasoning: trail.reasoning,
            tool_calls: trail.tool_calls,
        };
        self.persist_record(&execution_id, serde_json::to_value(&response).unwrap_or(serde_json::Value::Null)).await;
        Ok(response)
    }

    /// Run a team to completion.
    ///
    /// Builds one `ReactRuntime` per distinct member agent-id, each on its
    /// own sub-execution-id (so a member's own terminal event never
    /// collides with the team's) and its own child cancellation token
    /// (so cancelling the team cancels every in-flight member). A member
    /// whose agent-id isn't registered is simply omitted from the
    /// operator map — `TeamCoordinator::resolve` turns that into a
    /// per-member `AgentNotFound` outcome rather than a hard failure.
    #[cfg(feature = "team")]
    pub async fn run_team(&self, request: RunTeamRequest) -> Result<RunTeamResponse, FacadeError> {
        let team = {
            let teams = self.teams.read().expect("facade lock poisoned");
            teams.get(&request.team_id).cloned().ok_or_else(|| FacadeError::UnknownTeam(request.team_id.to_string()))?
        };

        let execution_id = new_execution_id();
        let cancel = self.cancellation.register(execution_id.clone());
        self.events.publish(&execution_id, ExecutionEvent::ExecutionStarted { execution_id: execution_id.clone(), kind: "team".into() });

        let mut operators: HashMap<AgentId, Arc<dyn Operator>> = HashMap::new();
        for member in &team.members {
            if operators.contains_key(&member.agent_id) {
                continue;
            }
            let agent = {
                let agents = self.agents.read().expect("facade lock poisoned");
                agents.get(&member.agent_id).cloned()
            };
            let Some(agent) = agent else { continue };
            let member_execution_id = new_execution_id();
            let member_cancel = cancel.child_token();
            operators.insert(member.agent_id.clone(), self.build_operator(agent, member_execution_id, member_cancel));
        }

        let coordinator = TeamCoordinator::new(operators, execution_id.clone(), self.events.clone(), cancel);
        let result = coordinator.run(&team, Content::text(request.task), request.session_id).await;

        match &result {
            Ok(output) => {
                let payload = serde_json::to_value(output).unwrap_or(serde_json::Value::Null);
                self.events.publish(&execution_id, ExecutionEvent::Complete { status: output.status.clone(), result: payload });
            }
            Err(e) => {
                self.events.publish(&execution_id, ExecutionEvent::Error { message: e.to_string() });
            }
        }
        self.cancellation.unregister(&execution_id);

        let output = result?;
        let response = RunTeamResponse {
            execution_id: execution_id.clone(),
            status: output.status,
            answer: output.answer,
            members: output.members,
        };
        self.persist_record(&execution_id, serde_json::to_value(&response).unwrap_or(serde_json::Value::Null)).await;
        Ok(response)
    }

    /// Run a workflow to completion.
    #[cfg(feature = "workflow")]
    pub async fn run_workflow(&self, request: RunWorkflowRequest) -> Result<RunWorkflowResponse, FacadeError> {
        let workflow = {
            let workflows = self.workflows.read().expect("facade lock poisoned");
            workflows.get(&request.workflow_id).cloned().ok_or_else(|| FacadeError::UnknownWorkflow(request.workflow_id.to_string()))?
        };

        let execution_id = new_execution_id();
        let cancel = self.cancellation.register(execution_id.clone());
        self.events.publish(&execution_id, ExecutionEvent::ExecutionStarted { execution_id: execution_id.clone(), kind: "workflow".into() });

        let result = self.workflow_engine.execute(&workflow, execution_id.clone(), cancel, &request.params).await;

        match &result {
            Ok(output) => {
                let payload = serde_json::to_value(&output.node_outputs).unwrap_or(serde_json::Value::Null);
                self.events.publish(&execution_id, ExecutionEvent::Complete { status: output.status.clone(), result: payload });
            }
            Err(e) => {
                self.events.publish(&execution_id, ExecutionEvent::Error { message: e.to_string() });
            }
        }
        self.cancellation.unregister(&execution_id);

        let output = result?;
        let response = RunWorkflowResponse {
            execution_id: execution_id.clone(),
            status: output.status,
            node_outputs: output.node_outputs,
        };
        self.persist_record(&execution_id, serde_json::to_value(&response).unwrap_or(serde_json::Value::Null)).await;
        Ok(response)
    }

    /// Install a tool provider and read back its installed name, version,
    /// container name, and health from the shared Tool Catalog.
    #[cfg(feature = "lifecycle")]
    pub async fn install_provider(&self, name: &ProviderName) -> Result<InstallResponse, FacadeError> {
        let providers = self.providers.as_ref().expect("provider lifecycle not configured");
        providers.install(name).await?;
        let entry = self.catalog.resolve(name).map_err(conduit_provider_lifecycle::LifecycleError::from)?;
        Ok(InstallResponse {
            name: name.to_string(),
            version: entry.version,
            container_name: name.to_string(),
            health: provider_health_str(entry.health),
        })
    }

    /// Install a trigger provider and read back its installed name,
    /// version, container name, and health.
    #[cfg(feature = "lifecycle")]
    pub async fn install_trigger(&self, request: TriggerInstallRequest) -> Result<InstallResponse, FacadeError> {
        let trigger_id = request.trigger.clone();
        let (triggers, registry) = self.triggers.as_ref().expect("trigger lifecycle not configured");
        triggers.install(&request).await?;
        let manifest = triggers
            .installed(&trigger_id)
            .await?
            .expect("install just recorded a manifest entry for this trigger");
        let entry = registry.resolve(&trigger_id)?;
        Ok(InstallResponse {
            name: trigger_id.to_string(),
            version: manifest.version,
            container_name: trigger_id.to_string(),
            health: trigger_health_str(entry.health),
        })
    }
}

#[cfg(feature = "lifecycle")]
fn provider_health_str(health: ProviderHealth) -> String {
    match health {
        ProviderHealth::Healthy => "healthy",
        ProviderHealth::Unhealthy => "unhealthy",
        ProviderHealth::Unknown => "unknown",
    }
    .to_string()
}

#[cfg(feature = "lifecycle")]
fn trigger_health_str(health: TriggerHealth) -> String {
    match health {
        TriggerHealth::Healthy => "healthy",
        TriggerHealth::Unhealthy => "unhealthy",
        TriggerHealth::Unknown => "unknown",
    }
    .to_string()
}

#[async_trait]
impl layer0::orchestrator::Orchestrator for OrchestratorFacade {
    async fn dispatch(&self, agent: &AgentId, input: OperatorInput) -> Result<layer0::operator::OperatorOutput, OrchError> {
        let definition = {
            let agents = self.agents.read().expect("facade lock poisoned");
            agents.get(agent).cloned().ok_or_else(|| OrchError::AgentNotFound(agent.to_string()))?
        };
        let execution_id = new_execution_id();
        let cancel = self.cancellation.register(execution_id.clone());
        let operator = self.build_operator(definition, execution_id.clone(), cancel);
        let result = operator.execute(input).await.map_err(OrchError::Operator);
        self.cancellation.unregister(&execution_id);
        result
    }

    async fn dispatch_many(
        &self,
        tasks: Vec<(AgentId, OperatorInput)>,
    ) -> Vec<Result<layer0::operator::OperatorOutput, OrchError>> {
        let mut set = tokio::task::JoinSet::new();
        for (idx, (agent, input)) in tasks.into_iter().enumerate() {
            let definition = {
                let agents = self.agents.read().expect("facade lock poisoned");
                agents.get(&agent).cloned()
            };
            let events = self.events.clone();
            let gateway = self.gateway.clone();
            let catalog = self.catalog.clone();
            let tool_client = self.tool_client.clone();
            let sessions = self.sessions.clone();
            let cancellation = self.cancellation.clone();
            set.spawn(async move {
                let result = match definition {
                    Some(definition) => {
                        let execution_id = new_execution_id();
                        let cancel = cancellation.register(execution_id.clone());
                        let operator = ReactRuntime::new(definition, execution_id.clone(), gateway, catalog, tool_client, events, sessions, cancel);
                        let result = operator.execute(input).await.map_err(OrchError::Operator);
                        cancellation.unregister(&execution_id);
                        result
                    }
                    None => Err(OrchError::AgentNotFound(agent.to_string())),
                };
                (idx, result)
            });
        }
        let mut results: Vec<Option<Result<layer0::operator::OperatorOutput, OrchError>>> = (0..set.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => tracing::error!(error = %e, "dispatch_many task panicked"),
            }
        }
        results.into_iter().map(|r| r.unwrap_or_else(|| Err(OrchError::DispatchFailed("task did not complete".into())))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_agent_react::{AgentModelBinding, Persona};
    use layer0::id::ProviderName as Pn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_agent(id: &str) -> AgentDefinition {
        AgentDefinition::new(
            AgentId::new(id),
            id,
            Persona { role: "tester".into(), system_prompt: "reply".into(), behavior_guidance: None, expertise_tags: vec![] },
            vec![],
            AgentModelBinding { provider: Pn::from("stub"), model: None, temperature: None, max_tokens: None },
        )
    }

    struct StubProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl conduit_model_gateway::Provider for StubProvider {
        async fn complete(
            &self,
            _request: conduit_model_gateway::ProviderRequest,
        ) -> Result<conduit_model_gateway::ProviderResponse, conduit_model_gateway::ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(conduit_model_gateway::ProviderResponse {
                content: vec![conduit_model_gateway::ContentPart::Text { text: "done".into() }],
                stop_reason: conduit_model_gateway::StopReason::EndTurn,
                usage: conduit_model_gateway::TokenUsage { input_tokens: 3, output_tokens: 2, cache_read_tokens: None, cache_creation_tokens: None },
                model: "stub-1".into(),
                cost: None,
                truncated: None,
            })
        }
    }

    fn test_facade() -> OrchestratorFacade {
        let mut gateway = ModelGateway::new();
        gateway.register(Pn::from("stub"), Arc::new(StubProvider { calls: AtomicUsize::new(0) }));
        OrchestratorFacade::new(
            Arc::new(gateway),
            Arc::new(ToolCatalog::new()),
            Arc::new(ToolClient::new()),
            Arc::new(EventBus::new()),
            Arc::new(CancellationRegistry::new()),
        )
    }

    #[tokio::test]
    async fn run_agent_returns_the_final_answer_and_trail() {
        let facade = test_facade();
        facade.register_agent(test_agent("echo"));

        let response = facade.run_agent(RunAgentRequest::new(AgentId::new("echo"), "hello")).await.unwrap();

        assert_eq!(response.answer, "done");
        assert_eq!(response.status, "completed");
        assert_eq!(response.iterations, 1);
    }

    #[tokio::test]
    async fn run_agent_rejects_an_unregistered_agent() {
        let facade = test_facade();
        let err = facade.run_agent(RunAgentRequest::new(AgentId::new("ghost"), "hi")).await.unwrap_err();
        assert!(matches!(err, FacadeError::UnknownAgent(_)));
    }

    #[cfg(feature = "team")]
    #[tokio::test]
    async fn run_team_rejects_an_unregistered_team() {
        let facade = test_facade();
        let err = facade
            .run_team(RunTeamRequest::new(TeamId::new("ghost"), "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, FacadeError::UnknownTeam(_)));
    }

    #[cfg(feature = "team")]
    #[tokio::test]
    async fn run_team_dispatches_to_each_registered_member() {
        let facade = test_facade();
        facade.register_agent(test_agent("a"));
        facade.register_agent(test_agent("b"));
        let team = TeamDefinition::new(
            TeamId::new("duo"),
            "duo",
            conduit_team::TeamMode::Sequential,
            vec![conduit_team::TeamMember::new(AgentId::new("a")), conduit_team::TeamMember::new(AgentId::new("b"))],
        );
        facade.register_team(team);

        let response = facade.run_team(RunTeamRequest::new(TeamId::new("duo"), "hi")).await.unwrap();

        assert_eq!(response.status, "completed");
        assert_eq!(response.members.len(), 2);
    }

    #[cfg(feature = "workflow")]
    #[tokio::test]
    async fn run_workflow_rejects_an_unregistered_workflow() {
        let facade = test_facade();
        let err = facade
            .run_workflow(RunWorkflowRequest::new(WorkflowId::new("ghost")))
            .await
            .unwrap_err();
        assert!(matches!(err, FacadeError::UnknownWorkflow(_)));
    }

    #[tokio::test]
    async fn dispatch_reports_agent_not_found_through_the_orchestrator_trait() {
        use layer0::orchestrator::Orchestrator;
        let facade = test_facade();
        let err = facade
            .dispatch(&AgentId::new("ghost"), OperatorInput::new(Content::text("hi"), TriggerType::Task))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn cancel_marks_the_registered_token() {
        let facade = test_facade();
        let execution_id = ExecutionId::new("e1");
        let token = facade.cancellation.register(execution_id.clone());
        facade.cancel(&execution_id);
        assert!(token.is_cancelled());
    }
}
