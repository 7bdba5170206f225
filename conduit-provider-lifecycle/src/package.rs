//! The external package-catalog collaborator: where provider images and
//! their declared tools come from.

use async_trait::async_trait;
use conduit_tool_catalog::ToolDeclaration;
use layer0::id::ProviderName;
use std::collections::HashMap;

use crate::LifecycleError;

/// Everything needed to install one provider, as published by the
/// external package catalog.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct PackageDescriptor {
    /// Provider name this descriptor installs.
    pub name: ProviderName,
    /// Container image reference (e.g. `registry/conduit-files:1.4.0`).
    pub image: String,
    /// Package version, compared against the manifest on update.
    pub version: String,
    /// Container port the provider's endpoint listens on.
    pub endpoint_port: u16,
    /// Path probed to determine health (joined with the container's host address).
    pub health_path: String,
    /// Tools this provider declares it exposes.
    pub tools: Vec<ToolDeclaration>,
    /// Extra environment variables to inject into the container.
    pub env: HashMap<String, String>,
}

/// Fetches package descriptors from an external catalog.
///
/// A real implementation calls out over HTTP to the package registry;
/// tests substitute an in-memory stand-in.
#[async_trait]
pub trait PackageCatalogClient: Send + Sync {
    /// Fetch the current descriptor for `name`.
    async fn fetch_descriptor(&self, name: &ProviderName) -> Result<PackageDescriptor, LifecycleError>;
}

/// An HTTP-backed catalog client.
pub struct HttpCatalogClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCatalogClient {
    /// Build a client against a catalog reachable at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PackageCatalogClient for HttpCatalogClient {
    async fn fetch_descriptor(&self, name: &ProviderName) -> Result<PackageDescriptor, LifecycleError> {
        let url = format!("{}/packages/{}", self.base_url, name.as_str());
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LifecycleError::CatalogClient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(LifecycleError::PackageNotFound(name.to_string()));
        }
        response
            .json::<PackageDescriptor>()
            .await
            .map_err(|e| LifecycleError::CatalogClient(e.to_string()))
    }
}
