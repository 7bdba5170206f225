#![deny(missing_docs)]
//! # conduit — umbrella crate and orchestrator facade
//!
//! Provides a single import surface for the workspace's component
//! crates, re-exported behind feature flags, plus a `prelude` for the
//! happy path and an [`OrchestratorFacade`] that ties them into one
//! entry point: run an agent, run a team, run a workflow, install a
//! provider or trigger, cancel an execution.

#[cfg(feature = "core")]
pub use conduit_agent_react;
#[cfg(feature = "core")]
pub use conduit_cancellation;
#[cfg(feature = "config")]
pub use conduit_config;
#[cfg(feature = "core")]
pub use conduit_event_bus;
#[cfg(feature = "core")]
pub use conduit_model_gateway;
#[cfg(feature = "otel")]
pub use conduit_otel;
#[cfg(feature = "provider-anthropic")]
pub use conduit_provider_anthropic;
#[cfg(feature = "lifecycle")]
pub use conduit_provider_lifecycle;
#[cfg(feature = "provider-ollama")]
pub use conduit_provider_ollama;
#[cfg(feature = "provider-openai")]
pub use conduit_provider_openai;
#[cfg(feature = "state-fs")]
pub use conduit_session_fs;
#[cfg(feature = "state-memory")]
pub use conduit_session_memory;
#[cfg(feature = "team")]
pub use conduit_team;
#[cfg(feature = "core")]
pub use conduit_tool_catalog;
#[cfg(feature = "core")]
pub use conduit_tool_client;
#[cfg(feature = "lifecycle")]
pub use conduit_trigger_lifecycle;
#[cfg(feature = "workflow")]
pub use conduit_workflow;
#[cfg(feature = "core")]
pub use layer0;

#[cfg(feature = "core")]
mod facade;
#[cfg(feature = "core")]
pub use facade::*;

/// Happy-path imports for composing and driving a conduit system.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use layer0::{
        AgentId, Content, ContentBlock, ExitReason, Operator, OperatorConfig, OperatorInput,
        OperatorOutput, Orchestrator, Scope, SessionId, StateStore, TeamId, WorkflowId,
    };

    #[cfg(feature = "core")]
    pub use conduit_agent_react::{AgentDefinition, IterationPolicy, Persona, ReactRuntime};

    #[cfg(feature = "core")]
    pub use conduit_event_bus::{EventBus, ExecutionEvent};

    #[cfg(feature = "core")]
    pub use conduit_model_gateway::ModelGateway;

    #[cfg(feature = "core")]
    pub use conduit_tool_catalog::ToolCatalog;

    #[cfg(feature = "core")]
    pub use conduit_tool_client::ToolClient;

    #[cfg(feature = "core")]
    pub use conduit_cancellation::CancellationRegistry;

    #[cfg(feature = "core")]
    pub use crate::facade::{
        FacadeError, OrchestratorFacade, RunAgentRequest, RunAgentResponse, RunTeamRequest,
        RunTeamResponse, RunWorkflowRequest, RunWorkflowResponse,
    };

    #[cfg(feature = "team")]
    pub use conduit_team::{TeamDefinition, TeamMember, TeamMode};

    #[cfg(feature = "workflow")]
    pub use conduit_workflow::{WorkflowDefinition, WorkflowEngine};

    #[cfg(feature = "state-memory")]
    pub use conduit_session_memory::MemoryStore;

    #[cfg(feature = "state-fs")]
    pub use conduit_session_fs::FsStore;
}
