//! The State protocol — how data persists and is retrieved across turns.

use crate::error::StateError;
use crate::id::{AgentId, SessionId, WorkflowId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Isolation scope for a state read/write. Every key lives in exactly one
/// scope; scopes never leak into each other.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scope {
    /// Per-conversation-session.
    Session(SessionId),
    /// Per-workflow-execution.
    Workflow(WorkflowId),
    /// Per-agent within a workflow (e.g. a team member's own scratch state).
    Agent {
        /// The workflow this agent belongs to.
        workflow: WorkflowId,
        /// The agent within the workflow.
        agent: AgentId,
    },
    /// Shared across all executions.
    Global,
    /// Forward-compatible escape hatch.
    Custom(String),
}

/// How data persists and is retrieved across turns and sessions.
///
/// Implementations: `MemoryStore` (testing, ephemeral), `FsStore`
/// (filesystem-backed, durable across process restarts).
///
/// The trait is deliberately minimal — CRUD + search + list.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a value by key within a scope. Returns `None` if the key doesn't exist.
    async fn read(&self, scope: &Scope, key: &str) -> Result<Option<serde_json::Value>, StateError>;

    /// Write a value. Creates or overwrites.
    async fn write(&self, scope: &Scope, key: &str, value: serde_json::Value) -> Result<(), StateError>;

    /// Delete a value. No-op if key doesn't exist.
    async fn delete(&self, scope: &Scope, key: &str) -> Result<(), StateError>;

    /// List keys under a prefix within a scope.
    async fn list(&self, scope: &Scope, prefix: &str) -> Result<Vec<String>, StateError>;

    /// Search within a scope. Implementations that don't support search
    /// return an empty vec (not an error).
    async fn search(&self, scope: &Scope, query: &str, limit: usize) -> Result<Vec<SearchResult>, StateError>;
}

/// A search result from a state store query.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The key that matched.
    pub key: String,
    /// Relevance score (higher is more relevant).
    pub score: f64,
    /// Preview/snippet of the matched content.
    pub snippet: Option<String>,
}

impl SearchResult {
    /// Create a new search result.
    pub fn new(key: impl Into<String>, score: f64) -> Self {
        Self {
            key: key.into(),
            score,
            snippet: None,
        }
    }
}

/// Read-only view of state. A caller that should only ever read (never
/// write) state takes `&dyn StateReader`, not `&dyn StateStore`.
#[async_trait]
pub trait StateReader: Send + Sync {
    /// Read a value by key within a scope.
    async fn read(&self, scope: &Scope, key: &str) -> Result<Option<serde_json::Value>, StateError>;

    /// List keys under a prefix within a scope.
    async fn list(&self, scope: &Scope, prefix: &str) -> Result<Vec<String>, StateError>;

    /// Search within a scope.
    async fn search(&self, scope: &Scope, query: &str, limit: usize) -> Result<Vec<SearchResult>, StateError>;
}

/// Blanket implementation: every StateStore is a StateReader.
#[async_trait]
impl<T: StateStore> StateReader for T {
    async fn read(&self, scope: &Scope, key: &str) -> Result<Option<serde_json::Value>, StateError> {
        StateStore::read(self, scope, key).await
    }

    async fn list(&self, scope: &Scope, prefix: &str) -> Result<Vec<String>, StateError> {
        StateStore::list(self, scope, prefix).await
    }

    async fn search(&self, scope: &Scope, query: &str, limit: usize) -> Result<Vec<SearchResult>, StateError> {
        StateStore::search(self, scope, query, limit).await
    }
}
