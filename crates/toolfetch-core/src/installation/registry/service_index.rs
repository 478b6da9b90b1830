//! The service index document that advertises a registry's endpoints

use super::{RegistryClient, RequestOptions};
use crate::installation::errors::InstallationResult;
use serde::{Deserialize, Deserializer, Serialize};

/// Root document of a registry.
///
/// Only `resources` is consulted. Entries that do not carry a string `@id`
/// and `@type` are kept but never match a service lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceIndexDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub resources: Vec<ServiceResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceResource {
    #[serde(rename = "@id", default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    /// `<ServiceName>/<SchemaVersion>`, or a bare name for unversioned entries
    #[serde(rename = "@type", default, deserialize_with = "lenient_string")]
    pub resource_type: Option<String>,
}

impl ServiceResource {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            resource_type: Some(resource_type.into()),
        }
    }

    /// Split `@type` into service name and schema version.
    ///
    /// `None` unless `@type` has exactly two `/`-separated parts.
    pub fn service_type(&self) -> Option<(&str, &str)> {
        let resource_type = self.resource_type.as_deref()?;
        let mut parts = resource_type.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(version), None) => Some((name, version)),
            _ => None,
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string))
}

impl RegistryClient {
    /// Fetch and parse the service index at `url`
    pub async fn fetch_service_index(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> InstallationResult<ServiceIndexDocument> {
        let index: ServiceIndexDocument = self.get_json(url, options).await?;
        log::debug!(
            "Service index at {} lists {} resources",
            url,
            index.resources.len()
        );
        Ok(index)
    }
}
