//! Process-wide registry of active triggers, mirroring the Tool
//! Catalog's shape: O(1) resolution, entries removed only through
//! explicit deregistration, health updated in place by probes.

use layer0::id::{TeamId, TriggerId, WorkflowId};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::TriggerLifecycleError;

/// What a trigger launches when it fires.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum RunTarget {
    /// Launch a workflow run.
    Workflow(WorkflowId),
    /// Launch a team run.
    Team(TeamId),
}

/// How a trigger maps the outside world onto a task.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub enum TriggerConfig {
    /// Fires on an inbound webhook call. `payload_template` maps the
    /// webhook's JSON payload onto a task string (e.g. a dotted-path
    /// reference the trigger container substitutes at call time).
    Webhook {
        /// Template the trigger container applies to the inbound payload.
        payload_template: String,
    },
    /// Fires on a schedule, always with the same fixed task description.
    Schedule {
        /// The task description every scheduled firing carries.
        task_description: String,
        /// Cron-style schedule expression.
        cron_expression: String,
    },
}

/// Health of a registered trigger, as last observed by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerHealth {
    /// Last probe succeeded.
    Healthy,
    /// Last probe failed or timed out.
    Unhealthy,
    /// No probe has completed yet.
    Unknown,
}

/// A registered trigger: where it's reachable, what it launches, and its health.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct TriggerEntry {
    /// What this trigger launches when it fires.
    pub target: RunTarget,
    /// How this trigger maps the outside world onto a task.
    pub config: TriggerConfig,
    /// Last-known health.
    pub health: TriggerHealth,
}

/// Process-wide mapping from trigger id to its registry entry.
pub struct TriggerRegistry {
    entries: RwLock<HashMap<TriggerId, TriggerEntry>>,
}

impl TriggerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Register a trigger, overwriting any existing entry under the same id.
    pub fn register(&self, id: TriggerId, entry: TriggerEntry) -> Result<(), TriggerLifecycleError> {
        let mut entries = self.entries.write().map_err(|e| TriggerLifecycleError::LockPoisoned(e.to_string()))?;
        entries.insert(id, entry);
        Ok(())
    }

    /// Remove a trigger's entry entirely. This is the only way an entry disappears.
    pub fn deregister(&self, id: &TriggerId) -> Result<Option<TriggerEntry>, TriggerLifecycleError> {
        let mut entries = self.entries.write().map_err(|e| TriggerLifecycleError::LockPoisoned(e.to_string()))?;
        Ok(entries.remove(id))
    }

    /// Resolve a trigger by id.
    pub fn resolve(&self, id: &TriggerId) -> Result<TriggerEntry, TriggerLifecycleError> {
        let entries = self.entries.read().map_err(|e| TriggerLifecycleError::LockPoisoned(e.to_string()))?;
        entries.get(id).cloned().ok_or_else(|| TriggerLifecycleError::UnknownTrigger(id.to_string()))
    }

    /// Update a trigger's health in place.
    pub fn mark_health(&self, id: &TriggerId, health: TriggerHealth) -> Result<(), TriggerLifecycleError> {
        let mut entries = self.entries.write().map_err(|e| TriggerLifecycleError::LockPoisoned(e.to_string()))?;
        match entries.get_mut(id) {
            Some(entry) => {
                entry.health = health;
                Ok(())
            }
            None => Err(TriggerLifecycleError::UnknownTrigger(id.to_string())),
        }
    }
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
