#![deny(missing_docs)]
//! Installs, starts, stops, updates, and reconciles trigger containers.
//!
//! Identical lifecycle shape to the Provider Lifecycle Manager — same
//! install/start/stop/restart/update/uninstall/reconcile-on-boot
//! operations, same manifest-then-registry ordering guarantees — plus
//! two additions specific to triggers: at install time the caller
//! supplies a [`RunTarget`] (the workflow or team the trigger launches),
//! which is injected into the container environment alongside a callback
//! URL; and the trigger's [`TriggerConfig`] (webhook payload-to-task
//! mapping, or a fixed schedule task description) is injected the same
//! way. The trigger container is responsible for actually calling back
//! into the Orchestrator Facade's run endpoint when it fires — this crate
//! only ever configures it to be able to, it never calls the Facade itself.

mod manifest;
mod package;
mod registry;

pub use manifest::{TriggerManifestEntry, TriggerManifestStore};
pub use package::{HttpTriggerCatalogClient, TriggerCatalogClient, TriggerDescriptor};
pub use registry::{RunTarget, TriggerConfig, TriggerEntry, TriggerHealth, TriggerRegistry};

use conduit_provider_lifecycle::{ContainerHandle, ContainerRuntime, ContainerSpec};
use layer0::id::TriggerId;
use layer0::ErrorKind;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from trigger lifecycle operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TriggerLifecycleError {
    /// The trigger package catalog has no descriptor under this id.
    #[error("trigger package not found: {0}")]
    PackageNotFound(String),

    /// The trigger package catalog could not be reached or returned malformed data.
    #[error("trigger catalog error: {0}")]
    CatalogClient(String),

    /// The container runtime reported a failure.
    #[error("container runtime error: {0}")]
    ContainerRuntime(String),

    /// The trigger's health endpoint never responded within the allotted
    /// number of attempts.
    #[error("health check failed for {0}")]
    HealthCheckFailed(String),

    /// Reading or writing the installation manifest failed.
    #[error("manifest I/O error: {0}")]
    ManifestIo(String),

    /// The trigger is not in the installation manifest.
    #[error("trigger not installed: {0}")]
    NotInstalled(String),

    /// No entry is registered under this trigger id.
    #[error("unknown trigger: {0}")]
    UnknownTrigger(String),

    /// The registry's internal lock was poisoned by a panicking holder.
    #[error("trigger registry lock poisoned: {0}")]
    LockPoisoned(String),
}

impl TriggerLifecycleError {
    /// Widen to the shared error-kind taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TriggerLifecycleError::PackageNotFound(_) => ErrorKind::UnknownProvider,
            TriggerLifecycleError::CatalogClient(_) => ErrorKind::TransportFailure,
            TriggerLifecycleError::ContainerRuntime(_) => ErrorKind::TransportFailure,
            TriggerLifecycleError::HealthCheckFailed(_) => ErrorKind::Timeout,
            TriggerLifecycleError::ManifestIo(_) => ErrorKind::ConfigurationError,
            TriggerLifecycleError::NotInstalled(_) => ErrorKind::ConfigurationError,
            TriggerLifecycleError::UnknownTrigger(_) => ErrorKind::UnknownProvider,
            TriggerLifecycleError::LockPoisoned(_) => ErrorKind::ConfigurationError,
        }
    }
}

/// How many times (and how far apart) to probe a freshly-started
/// trigger's health endpoint before giving up.
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

/// What the caller supplies at install time, beyond the package id.
pub struct TriggerInstallRequest {
    /// The trigger package to install.
    pub trigger: TriggerId,
    /// What this trigger launches when it fires.
    pub target: RunTarget,
    /// How this trigger maps the outside world onto a task.
    pub config: TriggerConfig,
}

/// Per-trigger outcome of a `reconcile_on_boot` pass.
pub struct ReconcileReport {
    /// Triggers that were newly installed, or failed to install.
    pub installed: Vec<(TriggerId, Result<(), TriggerLifecycleError>)>,
    /// Triggers that were already installed but not running, and were started.
    pub started: Vec<(TriggerId, Result<(), TriggerLifecycleError>)>,
}

/// Owns the trigger installation manifest and the Trigger Registry, and
/// drives trigger containers through their lifecycle.
pub struct TriggerLifecycleManager {
    manifest: TriggerManifestStore,
    registry: Arc<TriggerRegistry>,
    runtime: Arc<dyn ContainerRuntime>,
    catalog_client: Arc<dyn TriggerCatalogClient>,
    callback_base_url: String,
    health_wait: HealthWaitConfig,
}

impl TriggerLifecycleManager {
    /// Build a manager over its manifest root, Trigger Registry, container
    /// runtime, package catalog client, and the base URL the Orchestrator
    /// Facade's run endpoint is reachable at (injected into every trigger
    /// container as a callback target).
    pub fn new(
        manifest_root: impl Into<std::path::PathBuf>,
        registry: Arc<TriggerRegistry>,
        runtime: Arc<dyn ContainerRuntime>,
        catalog_client: Arc<dyn TriggerCatalogClient>,
        callback_base_url: impl Into<String>,
    ) -> Self {
        Self {
            manifest: TriggerManifestStore::new(manifest_root),
            registry,
            runtime,
            catalog_client,
            callback_base_url: callback_base_url.into(),
            health_wait: HealthWaitConfig::default(),
        }
    }

    /// Override the default health-probe attempt count/interval.
    pub fn with_health_wait(mut self, health_wait: HealthWaitConfig) -> Self {
        self.health_wait = health_wait;
        self
    }

    /// Fetch the descriptor, start a container configured with the
    /// target/callback/config environment, wait for its health endpoint,
    /// record the manifest entry, then register it in the Trigger Registry.
    pub async fn install(&self, request: &TriggerInstallRequest) -> Result<(), TriggerLifecycleError> {
        let descriptor = self.catalog_client.fetch_descriptor(&request.trigger).await?;
        let env = self.build_env(&descriptor, &request.target, &request.config);
        let spec = ContainerSpec {
            image: descriptor.image.clone(),
            env,
            labels: HashMap::from([("conduit.trigger".to_string(), request.trigger.to_string())]),
        };

        self.runtime.pull(&descriptor.image).await.map_err(runtime_err)?;
        let handle = self.runtime.start(request.trigger.as_str(), &spec).await.map_err(runtime_err)?;
        let endpoint = format!("http://{}:{}", request.trigger.as_str(), descriptor.endpoint_port);

        self.wait_for_health(&endpoint, &descriptor.health_path).await?;

        self.manifest
            .put(&TriggerManifestEntry {
                trigger: request.trigger.clone(),
                image: descriptor.image.clone(),
                version: descriptor.version.clone(),
                container_id: handle.id,
                endpoint: endpoint.clone(),
                health_path: descriptor.health_path.clone(),
                target: request.target.clone(),
                config: request.config.clone(),
            })
            .await?;

        self.registry.register(
            request.trigger.clone(),
            TriggerEntry { target: request.target.clone(), config: request.config.clone(), health: TriggerHealth::Healthy },
        )?;

        tracing::info!(trigger = %request.trigger, "trigger installed");
        Ok(())
    }

    /// Look up a trigger's recorded installation manifest entry, if any.
    /// The install-trigger boundary response reads its version and
    /// container name from here, since the Trigger Registry itself only
    /// tracks target/config/health.
    pub async fn installed(&self, id: &TriggerId) -> Result<Option<TriggerManifestEntry>, TriggerLifecycleError> {
        self.manifest.get(id).await
    }

    fn build_env(
        &self,
        descriptor: &TriggerDescriptor,
        target: &RunTarget,
        config: &TriggerConfig,
    ) -> HashMap<String, String> {
        let mut env = descriptor.env.clone();
        env.insert("CONDUIT_CALLBACK_URL".to_string(), format!("{}/run", self.callback_base_url));
        match target {
            RunTarget::Workflow(id) => {
                env.insert("CONDUIT_TARGET_KIND".to_string(), "workflow".to_string());
                env.insert("CONDUIT_TARGET_ID".to_string(), id.to_string());
            }
            RunTarget::Team(id) => {
                env.insert("CONDUIT_TARGET_KIND".to_string(), "team".to_string());
                env.insert("CONDUIT_TARGET_ID".to_string(), id.to_string());
            }
        }
        match config {
            TriggerConfig::Webhook { payload_template } => {
                env.insert("CONDUIT_PAYLOAD_TEMPLATE".to_string(), payload_template.clone());
            }
            TriggerConfig::Schedule { task_description, cron_expression } => {
                env.insert("CONDUIT_TASK_DESCRIPTION".to_string(), task_description.clone());
                env.insert("CONDUIT_CRON_EXPRESSION".to_string(), cron_expression.clone());
            }
        }
        env
    }

    async fn wait_for_health(&self, endpoint: &str, health_path: &str) -> Result<(), TriggerLifecycleError> {
        for attempt in 0..self.health_wait.attempts {
            if self.runtime.probe_health(endpoint, health_path).await.map_err(runtime_err)? {
                return Ok(());
            }
            if attempt + 1 < self.health_wait.attempts {
                tokio::time::sleep(self.health_wait.interval).await;
            }
        }
        Err(TriggerLifecycleError::HealthCheckFailed(endpoint.to_string()))
    }

    /// Start an already-installed trigger's container and refresh its
    /// registry health.
    pub async fn start(&self, id: &TriggerId) -> Result<(), TriggerLifecycleError> {
        let entry = self.require_entry(id).await?;
        let handle = ContainerHandle { id: entry.container_id.clone() };
        if !self.runtime.is_running(&handle).await.map_err(runtime_err)? {
            let spec = ContainerSpec { image: entry.image.clone(), env: HashMap::new(), labels: HashMap::new() };
            let restarted = self.runtime.start(id.as_str(), &spec).await.map_err(runtime_err)?;
            self.manifest.put(&TriggerManifestEntry { container_id: restarted.id, ..entry.clone() }).await?;
        }
        let healthy = self.runtime.probe_health(&entry.endpoint, &entry.health_path).await.unwrap_or(false);
        let health = if healthy { TriggerHealth::Healthy } else { TriggerHealth::Unhealthy };
        let _ = self.registry.mark_health(id, health);
        Ok(())
    }

    /// Stop an installed trigger's container. The registry entry is left
    /// in place with its health marked unhealthy; only `uninstall` removes it.
    pub async fn stop(&self, id: &TriggerId) -> Result<(), TriggerLifecycleError> {
        let entry = self.require_entry(id).await?;
        self.runtime.stop(&ContainerHandle { id: entry.container_id }).await.map_err(runtime_err)?;
        let _ = self.registry.mark_health(id, TriggerHealth::Unhealthy);
        Ok(())
    }

    /// Stop then start a trigger's container.
    pub async fn restart(&self, id: &TriggerId) -> Result<(), TriggerLifecycleError> {
        self.stop(id).await?;
        self.start(id).await
    }

    /// If the catalog's published version is newer than the manifest's,
    /// perform a stop-install-start sequence, best-effort restoring the
    /// previous container on failure. Returns whether an update happened.
    /// The install step reuses the original target/config recorded in
    /// the manifest, since a re-fetched descriptor never carries those.
    pub async fn update(&self, id: &TriggerId) -> Result<bool, TriggerLifecycleError> {
        let previous = self.require_entry(id).await?;
        let descriptor = self.catalog_client.fetch_descriptor(id).await?;
        if descriptor.version == previous.version {
            return Ok(false);
        }

        self.runtime.stop(&ContainerHandle { id: previous.container_id.clone() }).await.map_err(runtime_err)?;

        let request =
            TriggerInstallRequest { trigger: id.clone(), target: previous.target.clone(), config: previous.config.clone() };
        match self.install(&request).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(trigger = %id, error = %e, "trigger update failed, restoring previous container");
                let restore_spec =
                    ContainerSpec { image: previous.image.clone(), env: HashMap::new(), labels: HashMap::new() };
                if let Ok(handle) = self.runtime.start(id.as_str(), &restore_spec).await {
                    let _ = self.manifest.put(&TriggerManifestEntry { container_id: handle.id, ..previous }).await;
                }
                Err(e)
            }
        }
    }

    /// Deregister from the Trigger Registry first, then stop and remove
    /// the container, then remove the manifest entry.
    pub async fn uninstall(&self, id: &TriggerId) -> Result<(), TriggerLifecycleError> {
        let entry = self.require_entry(id).await?;
        self.registry.deregister(id)?;
        let handle = ContainerHandle { id: entry.container_id };
        self.runtime.stop(&handle).await.map_err(runtime_err)?;
        self.runtime.remove(&handle).await.map_err(runtime_err)?;
        self.manifest.remove(id).await?;
        tracing::info!(trigger = %id, "trigger uninstalled");
        Ok(())
    }

    /// For each manifest entry whose container is not running, start it.
    /// Unlike providers, triggers have no declarative auto-install list in
    /// the on-disk configuration (§6) — only already-installed triggers are
    /// reconciled on boot.
    pub async fn reconcile_on_boot(&self) -> Result<ReconcileReport, TriggerLifecycleError> {
        let installed = self.manifest.list().await?;
        let mut started = Vec::new();
        for (id, entry) in &installed {
            let running =
                self.runtime.is_running(&ContainerHandle { id: entry.container_id.clone() }).await.unwrap_or(false);
            if !running {
                let result = self.start(id).await;
                if let Err(e) = &result {
                    tracing::warn!(trigger = %id, error = %e, "reconcile start failed, continuing with others");
                }
                started.push((id.clone(), result));
            }
        }
        Ok(ReconcileReport { installed: Vec::new(), started })
    }

    async fn require_entry(&self, id: &TriggerId) -> Result<TriggerManifestEntry, TriggerLifecycleError> {
        self.manifest.get(id).await?.ok_or_else(|| TriggerLifecycleError::NotInstalled(id.to_string()))
    }
}

fn runtime_err(e: conduit_provider_lifecycle::LifecycleError) -> TriggerLifecycleError {
    TriggerLifecycleError::ContainerRuntime(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock as AsyncRwLock;

    struct FakeRuntime {
        running: AsyncRwLock<HashMap<String, bool>>,
        healthy_after_attempt: usize,
        probe_calls: AtomicUsize,
        next_id: AtomicUsize,
    }

    impl FakeRuntime {
        fn new(healthy_after_attempt: usize) -> Self {
            Self {
                running: AsyncRwLock::new(HashMap::new()),
                healthy_after_attempt,
                probe_calls: AtomicUsize::new(0),
                next_id: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn pull(&self, _image: &str) -> Result<(), conduit_provider_lifecycle::LifecycleError> {
            Ok(())
        }

        async fn start(
            &self,
            _name: &str,
            _spec: &ContainerSpec,
        ) -> Result<ContainerHandle, conduit_provider_lifecycle::LifecycleError> {
            let id = format!("container-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            self.running.write().await.insert(id.clone(), true);
            Ok(ContainerHandle { id })
        }

        async fn stop(&self, handle: &ContainerHandle) -> Result<(), conduit_provider_lifecycle::LifecycleError> {
            self.running.write().await.insert(handle.id.clone(), false);
            Ok(())
        }

        async fn remove(&self, handle: &ContainerHandle) -> Result<(), conduit_provider_lifecycle::LifecycleError> {
            self.running.write().await.remove(&handle.id);
            Ok(())
        }

        async fn is_running(
            &self,
            handle: &ContainerHandle,
        ) -> Result<bool, conduit_provider_lifecycle::LifecycleError> {
            Ok(self.running.read().await.get(&handle.id).copied().unwrap_or(false))
        }

        async fn probe_health(
            &self,
            _endpoint: &str,
            _health_path: &str,
        ) -> Result<bool, conduit_provider_lifecycle::LifecycleError> {
            let call = self.probe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(call >= self.healthy_after_attempt)
        }
    }

    struct FakeCatalogClient {
        descriptor: TriggerDescriptor,
    }

    #[async_trait]
    impl TriggerCatalogClient for FakeCatalogClient {
        async fn fetch_descriptor(&self, _id: &TriggerId) -> Result<TriggerDescriptor, TriggerLifecycleError> {
            Ok(self.descriptor.clone())
        }
    }

    fn descriptor(version: &str) -> TriggerDescriptor {
        TriggerDescriptor {
            id: TriggerId::new("nightly-report"),
            image: "registry/conduit-trigger-schedule:1.0.0".into(),
            version: version.into(),
            endpoint_port: 9200,
            health_path: "/healthz".into(),
            env: HashMap::new(),
        }
    }

    fn manager(
        dir: &tempfile::TempDir,
        runtime: Arc<FakeRuntime>,
        version: &str,
    ) -> (TriggerLifecycleManager, Arc<TriggerRegistry>) {
        let registry = Arc::new(TriggerRegistry::new());
        let client = Arc::new(FakeCatalogClient { descriptor: descriptor(version) });
        let manager = TriggerLifecycleManager::new(
            dir.path(),
            registry.clone(),
            runtime,
            client,
            "http://facade.internal",
        )
        .with_health_wait(HealthWaitConfig { attempts: 5, interval: Duration::from_millis(1) });
        (manager, registry)
    }

    fn install_request() -> TriggerInstallRequest {
        TriggerInstallRequest {
            trigger: TriggerId::new("nightly-report"),
            target: RunTarget::Workflow(layer0::id::WorkflowId::new("nightly-report-wf")),
            config: TriggerConfig::Schedule {
                task_description: "compile the nightly report".into(),
                cron_expression: "0 2 * * *".into(),
            },
        }
    }

    #[tokio::test]
    async fn install_registers_only_after_health_responds() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::new(2));
        let (manager, registry) = manager(&dir, runtime, "1.0.0");
        let request = install_request();

        assert!(registry.resolve(&request.trigger).is_err());
        manager.install(&request).await.unwrap();
        let entry = registry.resolve(&request.trigger).unwrap();
        assert_eq!(entry.target, request.target);
    }

    #[tokio::test]
    async fn uninstall_deregisters_before_stopping_the_container() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::new(0));
        let (manager, registry) = manager(&dir, runtime.clone(), "1.0.0");
        let request = install_request();

        manager.install(&request).await.unwrap();
        manager.uninstall(&request.trigger).await.unwrap();
        assert!(registry.resolve(&request.trigger).is_err());
    }

    #[tokio::test]
    async fn update_is_a_no_op_when_version_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::new(0));
        let (manager, _registry) = manager(&dir, runtime, "1.0.0");
        let request = install_request();

        manager.install(&request).await.unwrap();
        assert!(!manager.update(&request.trigger).await.unwrap());
    }

    #[tokio::test]
    async fn reconcile_on_boot_starts_stopped_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::new(0));
        let (manager, registry) = manager(&dir, runtime.clone(), "1.0.0");
        let request = install_request();

        manager.install(&request).await.unwrap();
        manager.stop(&request.trigger).await.unwrap();
        assert_eq!(registry.resolve(&request.trigger).unwrap().health, TriggerHealth::Unhealthy);

        let report = manager.reconcile_on_boot().await.unwrap();
        assert_eq!(report.started.len(), 1);
        assert!(report.started[0].1.is_ok());
    }
}
