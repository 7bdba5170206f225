//! Filesystem-backed trigger installation manifest, one JSON file per
//! installed trigger. Same directory-of-JSON-files shape used for
//! provider installations and for session persistence.

use layer0::id::TriggerId;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::registry::{RunTarget, TriggerConfig};
use crate::TriggerLifecycleError;

/// One trigger's recorded installation state.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct TriggerManifestEntry {
    /// The trigger this entry describes.
    pub trigger: TriggerId,
    /// Image reference last installed.
    pub image: String,
    /// Package version last installed.
    pub version: String,
    /// Runtime container id backing this trigger.
    pub container_id: String,
    /// Endpoint the registry should resolve this trigger to.
    pub endpoint: String,
    /// Path probed to determine health.
    pub health_path: String,
    /// What this trigger launches when it fires.
    pub target: RunTarget,
    /// How this trigger maps the outside world onto a task.
    pub config: TriggerConfig,
}

/// Persists [`TriggerManifestEntry`] records under a root directory.
pub struct TriggerManifestStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl TriggerManifestStore {
    /// Root a manifest store at `root`, creating it lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), write_lock: Mutex::new(()) }
    }

    fn path_for(&self, id: &TriggerId) -> PathBuf {
        self.root.join(format!("{}.json", sanitize(id.as_str())))
    }

    /// Write (or overwrite) an entry.
    pub async fn put(&self, entry: &TriggerManifestEntry) -> Result<(), TriggerLifecycleError> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| TriggerLifecycleError::ManifestIo(e.to_string()))?;
        let contents =
            serde_json::to_string_pretty(entry).map_err(|e| TriggerLifecycleError::ManifestIo(e.to_string()))?;
        tokio::fs::write(self.path_for(&entry.trigger), contents)
            .await
            .map_err(|e| TriggerLifecycleError::ManifestIo(e.to_string()))
    }

    /// Read a single entry, if installed.
    pub async fn get(&self, id: &TriggerId) -> Result<Option<TriggerManifestEntry>, TriggerLifecycleError> {
        match tokio::fs::read_to_string(self.path_for(id)).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|e| TriggerLifecycleError::ManifestIo(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TriggerLifecycleError::ManifestIo(e.to_string())),
        }
    }

    /// Remove an entry entirely. A no-op if it was never installed.
    pub async fn remove(&self, id: &TriggerId) -> Result<(), TriggerLifecycleError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TriggerLifecycleError::ManifestIo(e.to_string())),
        }
    }

    /// List every installed trigger's entry.
    pub async fn list(&self) -> Result<HashMap<TriggerId, TriggerManifestEntry>, TriggerLifecycleError> {
        let mut out = HashMap::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(TriggerLifecycleError::ManifestIo(e.to_string())),
        };
        while let Some(entry) =
            dir.next_entry().await.map_err(|e| TriggerLifecycleError::ManifestIo(e.to_string()))?
        {
            let contents = tokio::fs::read_to_string(entry.path())
                .await
                .map_err(|e| TriggerLifecycleError::ManifestIo(e.to_string()))?;
            let parsed: TriggerManifestEntry =
                serde_json::from_str(&contents).map_err(|e| TriggerLifecycleError::ManifestIo(e.to_string()))?;
            out.insert(parsed.trigger.clone(), parsed);
        }
        Ok(out)
    }
}

fn sanitize(name: &str) -> String {
    name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}
