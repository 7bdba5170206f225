#![deny(missing_docs)]
//! Execution-id keyed cancellation token registry.
//!
//! Every execution the Orchestrator Facade starts registers one
//! `CancellationToken` here. Runtimes hold only the token, never the
//! registry — cancelling an execution is a single `cancel(id)` call
//! from wherever the cancel request originates (an API handler, a
//! timeout, a parent workflow aborting).

use std::collections::HashMap;
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;

use layer0::id::ExecutionId;

/// Registry mapping execution ids to their cancellation tokens.
///
/// Registration replaces any prior token for the same id. Entries are
/// never removed automatically — call [`CancellationRegistry::unregister`]
/// once an execution reaches a terminal state to bound memory growth.
#[derive(Default)]
pub struct CancellationRegistry {
    tokens: RwLock<HashMap<ExecutionId, CancellationToken>>,
}

impl CancellationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new execution, returning its cancellation token.
    pub fn register(&self, id: ExecutionId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens
            .write()
            .expect("cancellation registry lock poisoned")
            .insert(id, token.clone());
        token
    }

    /// Signal cancellation for an execution. No-op if the id is unknown
    /// or was already cancelled.
    pub fn cancel(&self, id: &ExecutionId) {
        if let Some(token) = self
            .tokens
            .read()
            .expect("cancellation registry lock poisoned")
            .get(id)
        {
            token.cancel();
        }
    }

    /// Look up whether an execution has been cancelled. Returns `false`
    /// for an unknown id (nothing to cancel means nothing is cancelled).
    pub fn is_cancelled(&self, id: &ExecutionId) -> bool {
        self.tokens
            .read()
            .expect("cancellation registry lock poisoned")
            .get(id)
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }

    /// Fetch the token for an execution, if registered.
    pub fn token(&self, id: &ExecutionId) -> Option<CancellationToken> {
        self.tokens
            .read()
            .expect("cancellation registry lock poisoned")
            .get(id)
            .cloned()
    }

    /// Drop the entry for a finished execution.
    pub fn unregister(&self, id: &ExecutionId) {
        self.tokens
            .write()
            .expect("cancellation registry lock poisoned")
            .remove(id);
    }
}
