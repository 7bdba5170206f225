#![deny(missing_docs)]
//! Installs, starts, stops, updates, and reconciles tool-provider
//! containers, keeping the Tool Catalog in lockstep with the actual
//! container fleet.
//!
//! Two ordering guarantees hold across every operation here: a provider
//! is registered in the Tool Catalog only *after* its health endpoint has
//! responded at least once, and it is deregistered *before* its container
//! is stopped — so no in-flight caller ever sees a resolve succeed against
//! a container that's already gone, or fail against one that's still
//! healthy.

mod manifest;
mod package;
mod runtime;

pub use manifest::{ManifestEntry, ManifestStore};
pub use package::{HttpCatalogClient, PackageCatalogClient, PackageDescriptor};
pub use runtime::{BollardRuntime, ContainerHandle, ContainerRuntime, ContainerSpec};

use conduit_tool_catalog::{CatalogError, ProviderEntry, ProviderHealth, ToolCatalog};
use layer0::id::ProviderName;
use layer0::ErrorKind;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from lifecycle operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The package catalog has no descriptor under this name.
    #[error("package not found: {0}")]
    PackageNotFound(String),

    /// The package catalog could not be reached or returned malformed data.
    #[error("package catalog error: {0}")]
    CatalogClient(String),

    /// The container runtime reported a failure.
    #[error("container runtime error: {0}")]
    ContainerRuntime(String),

    /// The provider's health endpoint never responded within the allotted
    /// number of attempts.
    #[error("health check failed for {0}")]
    HealthCheckFailed(String),

    /// Reading or writing the installation manifest failed.
    #[error("manifest I/O error: {0}")]
    ManifestIo(String),

    /// The provider is not in the installation manifest.
    #[error("provider not installed: {0}")]
    NotInstalled(String),

    /// The Tool Catalog rejected a register/deregister call.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl LifecycleError {
    /// Widen to the shared error-kind taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::PackageNotFound(_) => ErrorKind::UnknownProvider,
            LifecycleError::CatalogClient(_) => ErrorKind::TransportFailure,
            LifecycleError::ContainerRuntime(_) => ErrorKind::TransportFailure,
            LifecycleError::HealthCheckFailed(_) => ErrorKind::Timeout,
            LifecycleError::ManifestIo(_) => ErrorKind::ConfigurationError,
            LifecycleError::NotInstalled(_) => ErrorKind::ConfigurationError,
            LifecycleError::Catalog(e) => e.kind(),
        }
    }
}

/// How many times (and how far apart) to probe a freshly-started
/// container's health endpoint before giving up.
#[derive(Debug, Clone, Copy)]
pub struct HealthWaitConfig {
    /// Number of probe attempts.
    pub attempts: u32,
    /// Delay between attempts.
    pub interval: Duration,
}

impl Default for HealthWaitConfig {
    fn default() -> Self {
        Self { attempts: 10, interval: Duration::from_millis(500) }
    }
}

/// Result of a `reconcile_on_boot` pass: per-provider outcome, so one
/// provider's install failure never hides another's.
pub struct ReconcileReport {
    /// Providers that were newly installed, or failed to install.
    pub installed: Vec<(ProviderName, Result<(), LifecycleError>)>,
    /// Providers that were already installed but not running, and were started.
    pub started: Vec<(ProviderName, Result<(), LifecycleError>)>,
}

/// Owns the installation manifest and drives containers through install,
/// start, stop, restart, update, uninstall, and boot-time reconciliation.
pub struct ProviderLifecycleManager {
    manifest: ManifestStore,
    runtime: Arc<dyn ContainerRuntime>,
    catalog_client: Arc<dyn PackageCatalogClient>,
    catalog: Arc<ToolCatalog>,
    health_wait: HealthWaitConfig,
}

impl ProviderLifecycleManager {
    /// Build a manager over its manifest root, container runtime, package
    /// catalog client, and the Tool Catalog it keeps in sync.
    pub fn new(
        manifest_root: impl Into<std::path::PathBuf>,
        runtime: Arc<dyn ContainerRuntime>,
        catalog_client: Arc<dyn PackageCatalogClient>,
        catalog: Arc<ToolCatalog>,
    ) -> Self {
        Self {
            manifest: ManifestStore::new(manifest_root),
            runtime,
            catalog_client,
            catalog,
            health_wait: HealthWaitConfig::default(),
        }
    }

    /// Override the default health-probe attempt count/interval.
    pub fn with_health_wait(mut self, health_wait: HealthWaitConfig) -> Self {
        self.health_wait = health_wait;
        self
    }

    /// Fetch the descriptor, pull and start a container, wait for its
    /// health endpoint, record the manifest entry, then register it in
    /// the Tool Catalog.
    pub async fn install(&self, name: &ProviderName) -> Result<(), LifecycleError> {
        let descriptor = self.catalog_client.fetch_descriptor(name).await?;
        let spec = ContainerSpec {
            image: descriptor.image.clone(),
            env: descriptor.env.clone(),
            labels: HashMap::from([("conduit.provider".to_string(), name.to_string())]),
        };

        self.runtime.pull(&descriptor.image).await?;
        let handle = self.runtime.start(name.as_str(), &spec).await?;
        let endpoint = format!("http://{}:{}", name.as_str(), descriptor.endpoint_port);

        self.wait_for_health(&endpoint, &descriptor.health_path).await.map_err(|e| {
            tracing::warn!(provider = %name, error = %e, "provider never became healthy after install");
            e
        })?;

        self.manifest
            .put(&ManifestEntry {
                provider: name.clone(),
                image: descriptor.image.clone(),
                version: descriptor.version.clone(),
                container_id: handle.id,
                endpoint: endpoint.clone(),
                health_path: descriptor.health_path.clone(),
            })
            .await?;

        self.catalog.register(
            name.clone(),
            ProviderEntry {
                endpoint,
                tools: descriptor.tools,
                health: ProviderHealth::Healthy,
                version: descriptor.version,
            },
        )?;

        tracing::info!(provider = %name, "provider installed");
        Ok(())
    }

    async fn wait_for_health(&self, endpoint: &str, health_path: &str) -> Result<(), LifecycleError> {
        for attempt in 0..self.health_wait.attempts {
            if self.runtime.probe_health(endpoint, health_path).await? {
                return Ok(());
            }
            if attempt + 1 < self.health_wait.attempts {
                tokio::time::sleep(self.health_wait.interval).await;
            }
        }
        Err(LifecycleError::HealthCheckFailed(endpoint.to_string()))
    }

    /// Start an already-installed provider's container and refresh its
    /// catalog health asynchronously.
    pub async fn start(&self, name: &ProviderName) -> Result<(), LifecycleError> {
        let entry = self.require_entry(name).await?;
        let handle = ContainerHandle { id: entry.container_id.clone() };
        if !self.runtime.is_running(&handle).await? {
            let spec = ContainerSpec { image: entry.image.clone(), env: HashMap::new(), labels: HashMap::new() };
            let restarted = self.runtime.start(name.as_str(), &spec).await?;
            self.manifest
                .put(&ManifestEntry { container_id: restarted.id, ..entry.clone() })
                .await?;
        }
        self.refresh_health(name, &entry.endpoint, &entry.health_path).await;
        Ok(())
    }

    /// Stop an installed provider's container. The Tool Catalog entry is
    /// left in place with its health marked unhealthy; only `uninstall`
    /// removes the catalog entry.
    pub async fn stop(&self, name: &ProviderName) -> Result<(), LifecycleError> {
        let entry = self.require_entry(name).await?;
        self.runtime.stop(&ContainerHandle { id: entry.container_id }).await?;
        let _ = self.catalog.mark_health(name, ProviderHealth::Unhealthy);
        Ok(())
    }

    /// Stop then start a provider's container.
    pub async fn restart(&self, name: &ProviderName) -> Result<(), LifecycleError> {
        self.stop(name).await?;
        self.start(name).await
    }

    /// If the catalog's published version is newer than the manifest's,
    /// perform a stop-install-start sequence. On failure, best-effort
    /// restart the previous container so the provider doesn't end up
    /// dark. Returns whether an update was actually performed.
    pub async fn update(&self, name: &ProviderName) -> Result<bool, LifecycleError> {
        let previous = self.require_entry(name).await?;
        let descriptor = self.catalog_client.fetch_descriptor(name).await?;
        if descriptor.version == previous.version {
            return Ok(false);
        }

        self.runtime.stop(&ContainerHandle { id: previous.container_id.clone() }).await?;

        match self.install(name).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(provider = %name, error = %e, "update failed, restoring previous container");
                let restore_spec =
                    ContainerSpec { image: previous.image.clone(), env: HashMap::new(), labels: HashMap::new() };
                if let Ok(handle) = self.runtime.start(name.as_str(), &restore_spec).await {
                    let _ = self
                        .manifest
                        .put(&ManifestEntry { container_id: handle.id, ..previous })
                        .await;
                }
                Err(e)
            }
        }
    }

    /// Deregister from the Tool Catalog first (so in-flight callers see
    /// the tool disappear cleanly), then stop and remove the container,
    /// then remove the manifest entry.
    pub async fn uninstall(&self, name: &ProviderName) -> Result<(), LifecycleError> {
        let entry = self.require_entry(name).await?;
        self.catalog.deregister(name)?;
        let handle = ContainerHandle { id: entry.container_id };
        self.runtime.stop(&handle).await?;
        self.runtime.remove(&handle).await?;
        self.manifest.remove(name).await?;
        tracing::info!(provider = %name, "provider uninstalled");
        Ok(())
    }

    /// For each provider declared in `auto_install` but not yet in the
    /// manifest, install it; for each manifest entry whose container is
    /// not running, start it. One provider's failure never blocks the rest.
    pub async fn reconcile_on_boot(&self, auto_install: &[ProviderName]) -> Result<ReconcileReport, LifecycleError> {
        let installed = self.manifest.list().await?;

        let mut install_results = Vec::new();
        for name in auto_install {
            if !installed.contains_key(name) {
                let result = self.install(name).await;
                if let Err(e) = &result {
                    tracing::warn!(provider = %name, error = %e, "auto-install failed, continuing with others");
                }
                install_results.push((name.clone(), result));
            }
        }

        let mut start_results = Vec::new();
        for (name, entry) in &installed {
            let running = self
                .runtime
                .is_running(&ContainerHandle { id: entry.container_id.clone() })
                .await
                .unwrap_or(false);
            if !running {
                let result = self.start(name).await;
                if let Err(e) = &result {
                    tracing::warn!(provider = %name, error = %e, "reconcile start failed, continuing with others");
                }
                start_results.push((name.clone(), result));
            }
        }

        Ok(ReconcileReport { installed: install_results, started: start_results })
    }

    async fn refresh_health(&self, name: &ProviderName, endpoint: &str, health_path: &str) {
        let healthy = self.runtime_probe_ok(endpoint, health_path).await;
        let health = if healthy { ProviderHealth::Healthy } else { ProviderHealth::Unhealthy };
        let _ = self.catalog.mark_health(name, health);
    }

    async fn runtime_probe_ok(&self, endpoint: &str, health_path: &str) -> bool {
        self.runtime.probe_health(endpoint, health_path).await.unwrap_or(false)
    }

    async fn require_entry(&self, name: &ProviderName) -> Result<ManifestEntry, LifecycleError> {
        self.manifest
            .get(name)
            .await?
            .ok_or_else(|| LifecycleError::NotInstalled(name.to_string()))
    }
}
