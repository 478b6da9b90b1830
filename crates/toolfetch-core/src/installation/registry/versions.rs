//! Resolving a version request against the registration service

use super::{call_resilient, find_services, RegistryClient, RequestOptions};
use super::{ServiceCalls, ServiceEndpoint, ServiceIndexDocument};
use crate::installation::errors::{InstallationError, InstallationResult};
use crate::installation::traits::ServiceCall;
use crate::installation::version::{is_pre_release, VersionRequest};
use async_trait::async_trait;
use serde::Deserialize;

pub const REGISTRATIONS_SERVICE: &str = "RegistrationsBaseUrl";
pub const REGISTRATIONS_KNOWN_VERSIONS: &[&str] = &["3.6.0", "3.0.0-beta"];

/// Per-package registration document, grouped into pages.
///
/// Pages whose items are not inlined are treated as empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationIndex {
    #[serde(default)]
    pub items: Vec<RegistrationPage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationPage {
    #[serde(default)]
    pub items: Vec<RegistrationLeaf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationLeaf {
    #[serde(rename = "catalogEntry")]
    pub catalog_entry: CatalogEntry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub listed: Option<bool>,
    pub version: String,
}

/// First listed entry in server order, skipping pre-releases unless allowed
pub fn select_version(index: &RegistrationIndex, include_pre_release: bool) -> Option<&str> {
    index
        .items
        .iter()
        .flat_map(|page| page.items.iter())
        .map(|leaf| &leaf.catalog_entry)
        .filter(|entry| entry.listed == Some(true))
        .find(|entry| include_pre_release || !is_pre_release(&entry.version))
        .map(|entry| entry.version.as_str())
}

/// Looks up the newest eligible version on one registration endpoint
struct ResolveLatestVersion<'a> {
    client: &'a RegistryClient,
    package_name: &'a str,
    include_pre_release: bool,
}

#[async_trait]
impl<'a> ServiceCall for ResolveLatestVersion<'a> {
    type Output = String;

    async fn call(
        &self,
        endpoint: &ServiceEndpoint,
        options: &RequestOptions,
    ) -> InstallationResult<String> {
        let url = endpoint.url(&format!("{}/index.json", self.package_name.to_lowercase()));
        let index: RegistrationIndex = self.client.get_json(&url, options).await?;

        select_version(&index, self.include_pre_release)
            .map(str::to_string)
            .ok_or_else(|| InstallationError::PackageNotFound {
                name: self.package_name.to_string(),
            })
    }
}

/// Turns a [`VersionRequest`] into a concrete version
#[derive(Debug, Clone)]
pub struct VersionResolver {
    client: RegistryClient,
}

impl VersionResolver {
    pub fn new(client: RegistryClient) -> Self {
        Self { client }
    }

    /// Exact requests come back unchanged without touching the network
    pub async fn resolve(
        &self,
        index: &ServiceIndexDocument,
        options: &RequestOptions,
        name: &str,
        request: &VersionRequest,
    ) -> InstallationResult<String> {
        if let VersionRequest::Exact(version) = request {
            return Ok(version.clone());
        }

        let services = find_services(index, REGISTRATIONS_SERVICE, REGISTRATIONS_KNOWN_VERSIONS)?;
        let call = ResolveLatestVersion {
            client: &self.client,
            package_name: name,
            include_pre_release: request.is_pre_release_request(),
        };

        let version = call_resilient(&services, options, &ServiceCalls::new(&call)).await?;
        log::debug!("Resolved {} {} to {}", name, request, version);
        Ok(version)
    }
}
