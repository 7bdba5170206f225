#![deny(missing_docs)]
//! Process-wide catalog of registered tool providers.
//!
//! A provider is anything that exposes one or more callable tools behind a
//! single endpoint — an MCP server, an HTTP microservice, a local process.
//! The catalog tracks, per provider name: its endpoint, the tools it
//! declares, and its last-known health. The Provider Lifecycle Manager
//! registers and deregisters entries; the Agent ReAct Runtime and the
//! Workflow Engine resolve entries by name to find where to send a call.
//!
//! Resolution is O(1) — a single map lookup. A periodic health probe may
//! mark an entry unhealthy, but probes never remove entries: removal
//! happens only through explicit deregistration, so a caller that wants to
//! react to degraded health can, and a caller that doesn't is never
//! surprised by a disappearing entry.

use std::collections::HashMap;
use std::sync::RwLock;

use layer0::{ErrorKind, ProviderName};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from catalog operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No entry is registered under this provider name.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The catalog's internal lock was poisoned by a panicking holder.
    #[error("catalog lock poisoned: {0}")]
    LockPoisoned(String),
}

impl CatalogError {
    /// Widen to the shared error-kind taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::UnknownProvider(_) => ErrorKind::UnknownProvider,
            CatalogError::LockPoisoned(_) => ErrorKind::ConfigurationError,
        }
    }
}

/// A single tool a provider declares it can execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// The tool's name, unique within its provider.
    pub name: String,
    /// Human-readable description surfaced to the model.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: serde_json::Value,
}

/// Health of a registered provider, as last observed by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderHealth {
    /// The provider's health endpoint last responded successfully.
    Healthy,
    /// The provider's health endpoint last failed or timed out.
    Unhealthy,
    /// No probe has completed yet; this is the state right after registration.
    Unknown,
}

/// A registered provider: where to reach it, what it declares, and its health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Network or process endpoint used by the Tool Client to reach this provider.
    pub endpoint: String,
    /// Tools this provider declares at registration time.
    pub tools: Vec<ToolDeclaration>,
    /// Last-known health, updated asynchronously by a probe.
    pub health: ProviderHealth,
    /// Provider version string, compared by the Lifecycle Manager during update.
    pub version: String,
}

/// Process-wide mapping from provider name to its catalog entry.
///
/// Backed by a single `RwLock<HashMap>`: registration and deregistration are
/// infrequent (lifecycle events), while `resolve` is on the hot path of
/// every tool call and every workflow step, so reads should never block on
/// writes any longer than necessary.
pub struct ToolCatalog {
    entries: RwLock<HashMap<ProviderName, ProviderEntry>>,
}

impl ToolCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a provider, overwriting any existing entry under the same name.
    pub fn register(&self, name: ProviderName, entry: ProviderEntry) -> Result<(), CatalogError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CatalogError::LockPoisoned(e.to_string()))?;
        entries.insert(name, entry);
        Ok(())
    }

    /// Remove a provider's entry entirely. This is the only way an entry disappears.
    pub fn deregister(&self, name: &ProviderName) -> Result<Option<ProviderEntry>, CatalogError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CatalogError::LockPoisoned(e.to_string()))?;
        Ok(entries.remove(name))
    }

    /// Resolve a provider by name. O(1).
    pub fn resolve(&self, name: &ProviderName) -> Result<ProviderEntry, CatalogError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| CatalogError::LockPoisoned(e.to_string()))?;
        entries
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownProvider(name.to_string()))
    }

    /// Update a provider's health in place without touching its other fields.
    /// A health probe calls this; it never removes entries.
    pub fn mark_health(&self, name: &ProviderName, health: ProviderHealth) -> Result<(), CatalogError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CatalogError::LockPoisoned(e.to_string()))?;
        match entries.get_mut(name) {
            Some(entry) => {
                entry.health = health;
                Ok(())
            }
            None => Err(CatalogError::UnknownProvider(name.to_string())),
        }
    }

    /// List all registered provider names.
    pub fn list(&self) -> Result<Vec<ProviderName>, CatalogError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| CatalogError::LockPoisoned(e.to_string()))?;
        Ok(entries.keys().cloned().collect())
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the catalog has no registered providers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}
