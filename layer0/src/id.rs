//! Typed ID wrappers for agent, session, workflow, team, and execution identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed ID wrappers prevent mixing up agent IDs, session IDs, etc.
/// These are just strings underneath — no UUID enforcement, no format
/// requirement. The protocol doesn't care what your IDs look like.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to String.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(AgentId, "Unique identifier for an agent definition.");
typed_id!(TeamId, "Unique identifier for a team definition.");
typed_id!(WorkflowId, "Unique identifier for a workflow definition.");
typed_id!(SessionId, "Unique identifier for a conversation session.");
typed_id!(
    ExecutionId,
    "Unique, sortable identifier for a single run of an agent, team, or workflow. Lexicographic sort order is chronological."
);
typed_id!(
    ProviderName,
    "Name of a registered tool-provider or trigger-provider. Must not contain `__` (reserved as the model-boundary namespace delimiter)."
);
typed_id!(TriggerId, "Unique identifier for an installed trigger-provider instance.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_id_display_and_as_str() {
        let id = AgentId::new("recon-bot");
        assert_eq!(id.as_str(), "recon-bot");
        assert_eq!(id.to_string(), "recon-bot");
    }

    #[test]
    fn typed_id_from_conversions() {
        let a: AgentId = "a1".into();
        let b: AgentId = String::from("a1").into();
        assert_eq!(a, b);
    }

    #[test]
    fn execution_id_sorts_lexicographically() {
        let mut ids = vec![
            ExecutionId::new("01H9ZZZZ"),
            ExecutionId::new("01H9AAAA"),
            ExecutionId::new("01H9MMMM"),
        ];
        ids.sort();
        assert_eq!(ids[0].as_str(), "01H9AAAA");
        assert_eq!(ids[2].as_str(), "01H9ZZZZ");
    }
}
