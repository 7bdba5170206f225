#![deny(missing_docs)]
//! Filesystem-backed implementations of layer0's `StateStore` and
//! `SessionStore` traits.
//!
//! Each scope maps to a subdirectory under the root. Keys are
//! URL-encoded and stored as `.json` files within the scope directory.
//! Sessions live under a separate `sessions/` subdirectory, one JSON
//! file per session id, so the two stores never share a filesystem
//! namespace. Provides true persistence across process restarts.

use async_trait::async_trait;
use layer0::error::StateError;
use layer0::id::SessionId;
use layer0::session::{ConversationSession, SessionMessage, SessionStore};
use layer0::state::{Scope, SearchResult, StateStore};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Filesystem-backed state store.
///
/// Directory layout:
/// ```text
/// root/
///   <scope-hash>/
///     <url-encoded-key>.json
///   sessions/
///     <url-encoded-session-id>.json
/// ```
///
/// Suitable for development, single-machine deployments, and cases
/// where data must survive process restarts without a database.
pub struct FsStore {
    root: PathBuf,
    // Session writes (read-modify-write of a whole session file) are
    // serialized through this lock so concurrent appends never race.
    session_lock: Mutex<()>,
}

impl FsStore {
    /// Create a new filesystem store rooted at the given directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            session_lock: Mutex::new(()),
        }
    }

    fn session_path(&self, session_id: &SessionId) -> PathBuf {
        self.root
            .join("sessions")
            .join(key_to_filename(session_id.as_str()))
    }

    async fn read_session_file(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ConversationSession>, StateError> {
        let path = self.session_path(session_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let session: ConversationSession = serde_json::from_str(&contents)
                    .map_err(|e| StateError::Serialization(e.to_string()))?;
                Ok(Some(session))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::WriteFailed(e.to_string())),
        }
    }

    async fn write_session_file(&self, session: &ConversationSession) -> Result<(), StateError> {
        let dir = self.root.join("sessions");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StateError::WriteFailed(e.to_string()))?;
        let path = self.session_path(&session.session_id);
        let contents = serde_json::to_string_pretty(session)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| StateError::WriteFailed(e.to_string()))?;
        Ok(())
    }
}

/// Derive a safe directory name from a scope.
fn scope_dir_name(scope: &Scope) -> String {
    // Use a deterministic, filesystem-safe representation.
    // We hash the JSON serialization of the scope.
    let json = serde_json::to_string(scope).unwrap_or_else(|_| "unknown".into());
    // Simple hash to avoid overly long directory names
    let mut hash: u64 = 5381;
    for byte in json.as_bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(*byte as u64);
    }
    format!("scope-{hash:016x}")
}

/// Encode a key into a safe filename.
fn key_to_filename(key: &str) -> String {
    let mut encoded = String::new();
    for ch in key.chars() {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => encoded.push(ch),
            _ => {
                for byte in ch.to_string().as_bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    format!("{encoded}.json")
}

/// Decode a filename back to a key.
fn filename_to_key(filename: &str) -> Option<String> {
    let name = filename.strip_suffix(".json")?;
    let mut result = Vec::new();
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok()?;
            let byte = u8::from_str_radix(hex, 16).ok()?;
            result.push(byte);
            i += 3;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(result).ok()
}

#[async_trait]
impl StateStore for FsStore {
    async fn read(
        &self,
        scope: &Scope,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StateError> {
        let path = self
            .root
            .join(scope_dir_name(scope))
            .join(key_to_filename(key));
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let value: serde_json::Value = serde_json::from_str(&contents)
                    .map_err(|e| StateError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::WriteFailed(e.to_string())),
        }
    }

    async fn write(
        &self,
        scope: &Scope,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StateError> {
        let dir = self.root.join(scope_dir_name(scope));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StateError::WriteFailed(e.to_string()))?;

        let path = dir.join(key_to_filename(key));
        let contents = serde_json::to_string_pretty(&value)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| StateError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, scope: &Scope, key: &str) -> Result<(), StateError> {
        let path = self
            .root
            .join(scope_dir_name(scope))
            .join(key_to_filename(key));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::WriteFailed(e.to_string())),
        }
    }

    async fn list(&self, scope: &Scope, prefix: &str) -> Result<Vec<String>, StateError> {
        let dir = self.root.join(scope_dir_name(scope));
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(StateError::WriteFailed(e.to_string())),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StateError::WriteFailed(e.to_string()))?
        {
            if let Some(filename) = entry.file_name().to_str() {
                if let Some(key) = filename_to_key(filename) {
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        Ok(keys)
    }

    async fn search(
        &self,
        _scope: &Scope,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<SearchResult>, StateError> {
        // Filesystem store does not support semantic search.
        Ok(vec![])
    }
}

#[async_trait]
impl SessionStore for FsStore {
    async fn create(
        &self,
        session_id: &SessionId,
        title: Option<String>,
    ) -> Result<ConversationSession, StateError> {
        let _guard = self.session_lock.lock().await;
        if let Some(existing) = self.read_session_file(session_id).await? {
            return Ok(existing);
        }
        let mut session = ConversationSession::new(session_id.clone());
        session.title = title;
        self.write_session_file(&session).await?;
        Ok(session)
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<ConversationSession>, StateError> {
        self.read_session_file(session_id).await
    }

    async fn append_message(
        &self,
        session_id: &SessionId,
        message: SessionMessage,
    ) -> Result<(), StateError> {
        let _guard = self.session_lock.lock().await;
        let mut session =
            self.read_session_file(session_id)
                .await?
                .ok_or_else(|| StateError::NotFound {
                    scope: "session".to_string(),
                    key: session_id.to_string(),
                })?;
        session.messages.push(message);
        self.write_session_file(&session).await
    }

    async fn record_usage(
        &self,
        session_id: &SessionId,
        input_tokens: u64,
        output_tokens: u64,
        cost: Decimal,
    ) -> Result<(), StateError> {
        let _guard = self.session_lock.lock().await;
        let mut session =
            self.read_session_file(session_id)
                .await?
                .ok_or_else(|| StateError::NotFound {
                    scope: "session".to_string(),
                    key: session_id.to_string(),
                })?;
        session.cumulative_input_tokens += input_tokens;
        session.cumulative_output_tokens += output_tokens;
        session.cumulative_cost += cost;
        self.write_session_file(&session).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionId>, StateError> {
        let dir = self.root.join("sessions");
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(StateError::WriteFailed(e.to_string())),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StateError::WriteFailed(e.to_string()))?
        {
            if let Some(filename) = entry.file_name().to_str() {
                if let Some(id) = filename_to_key(filename) {
                    ids.push(SessionId::new(id));
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layer0::session::MessageRole;
    use serde_json::json;

    #[test]
    fn key_encoding_roundtrip() {
        let keys = [
            "simple",
            "user:name",
            "path/to/key",
            "has spaces",
            "emoji🎉",
        ];
        for key in &keys {
            let filename = key_to_filename(key);
            let decoded = filename_to_key(&filename).unwrap();
            assert_eq!(*key, decoded, "roundtrip failed for {key}");
        }
    }

    #[test]
    fn scope_dir_name_is_deterministic() {
        let scope = Scope::Global;
        let dir1 = scope_dir_name(&scope);
        let dir2 = scope_dir_name(&scope);
        assert_eq!(dir1, dir2);
    }

    #[test]
    fn different_scopes_get_different_dirs() {
        let global = scope_dir_name(&Scope::Global);
        let session = scope_dir_name(&Scope::Session(layer0::SessionId::new("s1")));
        assert_ne!(global, session);
    }

    #[test]
    fn key_to_filename_produces_json_extension() {
        let filename = key_to_filename("test");
        assert!(filename.ends_with(".json"));
    }

    #[test]
    fn filename_to_key_rejects_non_json() {
        let result = filename_to_key("test.txt");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let scope = Scope::Global;

        store.write(&scope, "key1", json!("hello")).await.unwrap();
        let val = store.read(&scope, "key1").await.unwrap();
        assert_eq!(val, Some(json!("hello")));
    }

    #[tokio::test]
    async fn read_nonexistent_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let scope = Scope::Global;

        let val = store.read(&scope, "missing").await.unwrap();
        assert_eq!(val, None);
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let scope = Scope::Global;

        store.write(&scope, "key1", json!("hello")).await.unwrap();
        store.delete(&scope, "key1").await.unwrap();
        let val = store.read(&scope, "key1").await.unwrap();
        assert_eq!(val, None);
    }

    #[tokio::test]
    async fn delete_nonexistent_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let scope = Scope::Global;

        let result = store.delete(&scope, "missing").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn list_keys_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let scope = Scope::Global;

        store
            .write(&scope, "user:name", json!("Alice"))
            .await
            .unwrap();
        store.write(&scope, "user:age", json!(30)).await.unwrap();
        store
            .write(&scope, "system:version", json!("1.0"))
            .await
            .unwrap();

        let mut keys = store.list(&scope, "user:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["user:age", "user:name"]);
    }

    #[tokio::test]
    async fn list_nonexistent_dir_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let scope = Scope::Global;

        let keys = store.list(&scope, "").await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let global = Scope::Global;
        let session = Scope::Session(layer0::SessionId::new("s1"));

        store
            .write(&global, "key", json!("global_val"))
            .await
            .unwrap();
        store
            .write(&session, "key", json!("session_val"))
            .await
            .unwrap();

        let global_val = store.read(&global, "key").await.unwrap();
        let session_val = store.read(&session, "key").await.unwrap();

        assert_eq!(global_val, Some(json!("global_val")));
        assert_eq!(session_val, Some(json!("session_val")));
    }

    #[tokio::test]
    async fn search_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let scope = Scope::Global;

        let results = store.search(&scope, "query", 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn fs_store_implements_state_store() {
        fn _assert_state_store<T: StateStore>() {}
        _assert_state_store::<FsStore>();
    }

    #[test]
    fn fs_store_implements_session_store() {
        fn _assert_session_store<T: SessionStore>() {}
        _assert_session_store::<FsStore>();
    }

    #[tokio::test]
    async fn session_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let id = SessionId::new("persist");
        {
            let store = FsStore::new(dir.path());
            store.create(&id, Some("Title".to_string())).await.unwrap();
            store
                .append_message(&id, SessionMessage::user(json!("hi")))
                .await
                .unwrap();
        }
        let store = FsStore::new(dir.path());
        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.title, Some("Title".to_string()));
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn session_usage_accumulates_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let id = SessionId::new("usage");
        store.create(&id, None).await.unwrap();
        store
            .record_usage(&id, 100, 50, Decimal::new(10, 2))
            .await
            .unwrap();
        store
            .record_usage(&id, 20, 5, Decimal::new(1, 2))
            .await
            .unwrap();
        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.cumulative_input_tokens, 120);
        assert_eq!(session.cumulative_output_tokens, 55);
        assert_eq!(session.cumulative_cost, Decimal::new(11, 2));
    }

    #[tokio::test]
    async fn list_sessions_reflects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.create(&SessionId::new("a"), None).await.unwrap();
        store.create(&SessionId::new("b"), None).await.unwrap();
        let mut ids: Vec<String> = store
            .list_sessions()
            .await
            .unwrap()
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn append_message_to_missing_session_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let err = store
            .append_message(&SessionId::new("ghost"), SessionMessage::user(json!("x")))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound { .. }));
    }
}
