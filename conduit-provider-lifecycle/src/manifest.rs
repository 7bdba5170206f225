//! Filesystem-backed installation manifest: one JSON file per installed
//! provider, so the lifecycle manager survives process restarts. Mirrors
//! the directory-of-JSON-files shape used for session persistence
//! elsewhere in this workspace.

use layer0::id::ProviderName;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::LifecycleError;

/// One provider's recorded installation state.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct ManifestEntry {
    /// The provider this entry describes.
    pub provider: ProviderName,
    /// Image reference last installed.
    pub image: String,
    /// Package version last installed.
    pub version: String,
    /// Runtime container id backing this provider.
    pub container_id: String,
    /// Endpoint the Tool Catalog should resolve this provider to.
    pub endpoint: String,
    /// Path probed to determine health.
    pub health_path: String,
}

/// Persists [`ManifestEntry`] records under a root directory.
pub struct ManifestStore {
    root: PathBuf,
    // Read-modify-write of an entry is rare but must not race with itself.
    write_lock: Mutex<()>,
}

impl ManifestStore {
    /// Root a manifest store at `root`, creating it lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), write_lock: Mutex::new(()) }
    }

    fn path_for(&self, provider: &ProviderName) -> PathBuf {
        self.root.join(format!("{}.json", sanitize(provider.as_str())))
    }

    /// Write (or overwrite) an entry.
    pub async fn put(&self, entry: &ManifestEntry) -> Result<(), LifecycleError> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| LifecycleError::ManifestIo(e.to_string()))?;
        let contents =
            serde_json::to_string_pretty(entry).map_err(|e| LifecycleError::ManifestIo(e.to_string()))?;
        tokio::fs::write(self.path_for(&entry.provider), contents)
            .await
            .map_err(|e| LifecycleError::ManifestIo(e.to_string()))
    }

    /// Read a single entry, if installed.
    pub async fn get(&self, provider: &ProviderName) -> Result<Option<ManifestEntry>, LifecycleError> {
        match tokio::fs::read_to_string(self.path_for(provider)).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|e| LifecycleError::ManifestIo(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LifecycleError::ManifestIo(e.to_string())),
        }
    }

    /// Remove an entry entirely. A no-op if it was never installed.
    pub async fn remove(&self, provider: &ProviderName) -> Result<(), LifecycleError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(provider)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LifecycleError::ManifestIo(e.to_string())),
        }
    }

    /// List every installed provider's entry.
    pub async fn list(&self) -> Result<HashMap<ProviderName, ManifestEntry>, LifecycleError> {
        let mut out = HashMap::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(LifecycleError::ManifestIo(e.to_string())),
        };
        while let Some(entry) = dir.next_entry().await.map_err(|e| LifecycleError::ManifestIo(e.to_string()))? {
            let contents = tokio::fs::read_to_string(entry.path())
                .await
                .map_err(|e| LifecycleError::ManifestIo(e.to_string()))?;
            let parsed: ManifestEntry =
                serde_json::from_str(&contents).map_err(|e| LifecycleError::ManifestIo(e.to_string()))?;
            out.insert(parsed.provider.clone(), parsed);
        }
        Ok(out)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
