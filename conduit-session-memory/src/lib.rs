#![deny(missing_docs)]
//! In-memory implementations of layer0's `StateStore` and `SessionStore` traits.
//!
//! Uses a `HashMap` behind a `RwLock` for concurrent access. Scopes are
//! serialized to strings for use as key prefixes, providing full scope
//! isolation. Search always returns empty (no semantic search support in
//! the in-memory backend). Sessions are kept in a separate map, keyed by
//! session id, so session writes never contend with generic scope state.

use async_trait::async_trait;
use layer0::error::StateError;
use layer0::id::SessionId;
use layer0::session::{ConversationSession, SessionMessage, SessionStore};
use layer0::state::{Scope, SearchResult, StateStore};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory state store backed by a `HashMap` behind a `RwLock`.
///
/// Suitable for testing, prototyping, and single-process use cases
/// where persistence across restarts is not required.
pub struct MemoryStore {
    data: RwLock<HashMap<String, serde_json::Value>>,
    sessions: RwLock<HashMap<SessionId, ConversationSession>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a composite key from scope + key to ensure isolation.
fn composite_key(scope: &Scope, key: &str) -> String {
    let scope_str = serde_json::to_string(scope).unwrap_or_else(|_| "unknown".to_string());
    format!("{scope_str}\0{key}")
}

/// Extract the user-facing key from a composite key, if it belongs to the given scope.
fn extract_key<'a>(composite: &'a str, scope_prefix: &str) -> Option<&'a str> {
    composite
        .strip_prefix(scope_prefix)
        .and_then(|rest| rest.strip_prefix('\0'))
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn read(
        &self,
        scope: &Scope,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StateError> {
        let ck = composite_key(scope, key);
        let data = self.data.read().await;
        Ok(data.get(&ck).cloned())
    }

    async fn write(
        &self,
        scope: &Scope,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StateError> {
        let ck = composite_key(scope, key);
        let mut data = self.data.write().await;
        data.insert(ck, value);
        Ok(())
    }

    async fn delete(&self, scope: &Scope, key: &str) -> Result<(), StateError> {
        let ck = composite_key(scope, key);
        let mut data = self.data.write().await;
        data.remove(&ck);
        Ok(())
    }

    async fn list(&self, scope: &Scope, prefix: &str) -> Result<Vec<String>, StateError> {
        let scope_prefix =
            serde_json::to_string(scope).unwrap_or_else(|_| "unknown".to_string());
        let data = self.data.read().await;
        let keys: Vec<String> = data
            .keys()
            .filter_map(|ck| {
                extract_key(ck, &scope_prefix).and_then(|k| {
                    if k.starts_with(prefix) {
                        Some(k.to_string())
                    } else {
                        None
                    }
                })
            })
            .collect();
        Ok(keys)
    }

    async fn search(
        &self,
        _scope: &Scope,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<SearchResult>, StateError> {
        // In-memory store does not support semantic search.
        Ok(vec![])
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(
        &self,
        session_id: &SessionId,
        title: Option<String>,
    ) -> Result<ConversationSession, StateError> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(session_id) {
            return Ok(existing.clone());
        }
        let mut session = ConversationSession::new(session_id.clone());
        session.title = title;
        sessions.insert(session_id.clone(), session.clone());
        Ok(session)
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<ConversationSession>, StateError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn append_message(
        &self,
        session_id: &SessionId,
        message: SessionMessage,
    ) -> Result<(), StateError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StateError::NotFound {
                scope: "session".to_string(),
                key: session_id.to_string(),
            })?;
        session.messages.push(message);
        Ok(())
    }

    async fn record_usage(
        &self,
        session_id: &SessionId,
        input_tokens: u64,
        output_tokens: u64,
        cost: Decimal,
    ) -> Result<(), StateError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StateError::NotFound {
                scope: "session".to_string(),
                key: session_id.to_string(),
            })?;
        session.cumulative_input_tokens += input_tokens;
        session.cumulative_output_tokens += output_tokens;
        session.cumulative_cost += cost;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionId>, StateError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layer0::session::MessageRole;

    #[tokio::test]
    async fn state_store_roundtrip() {
        let store = MemoryStore::new();
        let scope = Scope::Global;
        store
            .write(&scope, "key", serde_json::json!("value"))
            .await
            .unwrap();
        let got = store.read(&scope, "key").await.unwrap();
        assert_eq!(got, Some(serde_json::json!("value")));
    }

    #[tokio::test]
    async fn state_store_scope_isolation() {
        let store = MemoryStore::new();
        let a = Scope::Session(SessionId::new("a"));
        let b = Scope::Session(SessionId::new("b"));
        store.write(&a, "k", serde_json::json!(1)).await.unwrap();
        assert_eq!(store.read(&b, "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn session_create_is_idempotent() {
        let store = MemoryStore::new();
        let id = SessionId::new("s1");
        let first = store.create(&id, Some("Title".to_string())).await.unwrap();
        let second = store.create(&id, Some("Other".to_string())).await.unwrap();
        assert_eq!(first.title, second.title);
        assert_eq!(second.title, Some("Title".to_string()));
    }

    #[tokio::test]
    async fn append_message_requires_existing_session() {
        let store = MemoryStore::new();
        let id = SessionId::new("missing");
        let err = store
            .append_message(&id, SessionMessage::user(serde_json::json!("hi")))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound { .. }));
    }

    #[tokio::test]
    async fn messages_stay_ordered() {
        let store = MemoryStore::new();
        let id = SessionId::new("s2");
        store.create(&id, None).await.unwrap();
        store
            .append_message(&id, SessionMessage::user(serde_json::json!("first")))
            .await
            .unwrap();
        store
            .append_message(&id, SessionMessage::assistant(serde_json::json!("second")))
            .await
            .unwrap();
        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, MessageRole::User);
        assert_eq!(session.messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn usage_counters_accumulate() {
        let store = MemoryStore::new();
        let id = SessionId::new("s3");
        store.create(&id, None).await.unwrap();
        store
            .record_usage(&id, 10, 20, Decimal::new(5, 2))
            .await
            .unwrap();
        store
            .record_usage(&id, 3, 4, Decimal::new(2, 2))
            .await
            .unwrap();
        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.cumulative_input_tokens, 13);
        assert_eq!(session.cumulative_output_tokens, 24);
        assert_eq!(session.cumulative_cost, Decimal::new(7, 2));
    }

    #[tokio::test]
    async fn list_sessions_reports_all_created() {
        let store = MemoryStore::new();
        store.create(&SessionId::new("x"), None).await.unwrap();
        store.create(&SessionId::new("y"), None).await.unwrap();
        let mut ids: Vec<String> = store
            .list_sessions()
            .await
            .unwrap()
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["x".to_string(), "y".to_string()]);
    }
}
