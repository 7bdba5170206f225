//! The Orchestrator protocol — how operators from different agents compose.

use crate::{error::OrchError, id::AgentId, operator::OperatorInput, operator::OperatorOutput};
use async_trait::async_trait;

/// Protocol ② — Orchestration
///
/// How operators from different agents compose. Calling code doesn't know
/// which implementation is behind the trait — `dispatch()` might be a
/// function call or a network hop. The Team Coordinator is the primary
/// consumer: sequential mode calls `dispatch` once per member in order,
/// parallel mode calls `dispatch_many` once for the whole cohort.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Dispatch a single operator invocation to an agent.
    async fn dispatch(&self, agent: &AgentId, input: OperatorInput) -> Result<OperatorOutput, OrchError>;

    /// Dispatch multiple operator invocations concurrently.
    ///
    /// Returns results in the same order as the input tasks. Individual
    /// tasks may fail independently — a failure of one does not cancel
    /// the others.
    async fn dispatch_many(
        &self,
        tasks: Vec<(AgentId, OperatorInput)>,
    ) -> Vec<Result<OperatorOutput, OrchError>>;
}
