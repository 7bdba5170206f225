//! The external package-catalog collaborator for trigger images.

use async_trait::async_trait;
use layer0::id::TriggerId;
use std::collections::HashMap;

use crate::TriggerLifecycleError;

/// Everything needed to install one trigger, as published by the
/// external package catalog.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct TriggerDescriptor {
    /// Trigger id this descriptor installs.
    pub id: TriggerId,
    /// Container image reference.
    pub image: String,
    /// Package version, compared against the manifest on update.
    pub version: String,
    /// Container port the trigger's health endpoint listens on.
    pub endpoint_port: u16,
    /// Path probed to determine health.
    pub health_path: String,
    /// Extra environment variables to inject into the container.
    pub env: HashMap<String, String>,
}

/// Fetches trigger package descriptors from an external catalog.
#[async_trait]
pub trait TriggerCatalogClient: Send + Sync {
    /// Fetch the current descriptor for `id`.
    async fn fetch_descriptor(&self, id: &TriggerId) -> Result<TriggerDescriptor, TriggerLifecycleError>;
}

/// An HTTP-backed catalog client.
pub struct HttpTriggerCatalogClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTriggerCatalogClient {
    /// Build a client against a catalog reachable at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl TriggerCatalogClient for HttpTriggerCatalogClient {
    async fn fetch_descriptor(&self, id: &TriggerId) -> Result<TriggerDescriptor, TriggerLifecycleError> {
        let url = format!("{}/triggers/{}", self.base_url, id.as_str());
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| TriggerLifecycleError::CatalogClient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TriggerLifecycleError::PackageNotFound(id.to_string()));
        }
        response
            .json::<TriggerDescriptor>()
            .await
            .map_err(|e| TriggerLifecycleError::CatalogClient(e.to_string()))
    }
}
