//! Abstraction over the container runtime, so the lifecycle manager's
//! orchestration logic doesn't depend on `bollard` directly — tests swap
//! in an in-memory runtime, production wires up [`BollardRuntime`].

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

use crate::LifecycleError;

/// Everything needed to start one provider container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Image reference to run.
    pub image: String,
    /// Environment variables injected into the container.
    pub env: HashMap<String, String>,
    /// Labels attached to the container, for `docker ps` discoverability.
    pub labels: HashMap<String, String>,
}

/// A running (or previously running) container, as far as this manager is concerned.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    /// The runtime-assigned container id.
    pub id: String,
}

/// The operations the Provider Lifecycle Manager needs from a container
/// runtime. `BollardRuntime` is the production implementation; an
/// in-memory stand-in is used in this crate's own tests.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pull (or build) the image so `start` doesn't have to.
    async fn pull(&self, image: &str) -> Result<(), LifecycleError>;

    /// Create and start a container from `spec`, returning its handle.
    async fn start(&self, name: &str, spec: &ContainerSpec) -> Result<ContainerHandle, LifecycleError>;

    /// Stop a running container. Idempotent if already stopped.
    async fn stop(&self, handle: &ContainerHandle) -> Result<(), LifecycleError>;

    /// Remove a stopped container entirely.
    async fn remove(&self, handle: &ContainerHandle) -> Result<(), LifecycleError>;

    /// Whether the container is currently running.
    async fn is_running(&self, handle: &ContainerHandle) -> Result<bool, LifecycleError>;

    /// Probe `endpoint`'s health path once. Returns `Ok(true)` only on a
    /// successful (2xx) response; network failures map to `Ok(false)`, not
    /// an error, so the caller can retry with its own backoff.
    async fn probe_health(&self, endpoint: &str, health_path: &str) -> Result<bool, LifecycleError>;
}

/// Production [`ContainerRuntime`] backed by the Docker daemon via `bollard`.
pub struct BollardRuntime {
    docker: Docker,
    http: reqwest::Client,
}

impl BollardRuntime {
    /// Connect using the platform-default Docker socket.
    pub fn connect() -> Result<Self, LifecycleError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| LifecycleError::ContainerRuntime(e.to_string()))?;
        Ok(Self { docker, http: reqwest::Client::new() })
    }
}

#[async_trait]
impl ContainerRuntime for BollardRuntime {
    async fn pull(&self, image: &str) -> Result<(), LifecycleError> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| LifecycleError::ContainerRuntime(e.to_string()))?;
        }
        Ok(())
    }

    async fn start(&self, name: &str, spec: &ContainerSpec) -> Result<ContainerHandle, LifecycleError> {
        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(env),
            labels: Some(spec.labels.clone()),
            ..Default::default()
        };
        let created = self
            .docker
            .create_container(Some(CreateContainerOptions { name: name.to_string(), platform: None }), config)
            .await
            .map_err(|e| LifecycleError::ContainerRuntime(e.to_string()))?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| LifecycleError::ContainerRuntime(e.to_string()))?;

        Ok(ContainerHandle { id: created.id })
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), LifecycleError> {
        match self
            .docker
            .stop_container(&handle.id, Some(StopContainerOptions { t: 10 }))
            .await
        {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 304, .. }) => Ok(()),
            Err(e) => Err(LifecycleError::ContainerRuntime(e.to_string())),
        }
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), LifecycleError> {
        self.docker
            .remove_container(&handle.id, Some(RemoveContainerOptions { force: true, ..Default::default() }))
            .await
            .map_err(|e| LifecycleError::ContainerRuntime(e.to_string()))
    }

    async fn is_running(&self, handle: &ContainerHandle) -> Result<bool, LifecycleError> {
        let inspect = self
            .docker
            .inspect_container(&handle.id, None)
            .await
            .map_err(|e| LifecycleError::ContainerRuntime(e.to_string()))?;
        Ok(inspect.state.and_then(|s| s.running).unwrap_or(false))
    }

    async fn probe_health(&self, endpoint: &str, health_path: &str) -> Result<bool, LifecycleError> {
        let url = format!("{endpoint}{health_path}");
        let result = tokio::time::timeout(Duration::from_secs(2), self.http.get(&url).send()).await;
        match result {
            Ok(Ok(response)) => Ok(response.status().is_success()),
            _ => Ok(false),
        }
    }
}
