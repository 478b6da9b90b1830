//! Endpoint discovery and known-first fallback across registry endpoints

use super::{RequestOptions, ServiceIndexDocument};
use crate::installation::errors::{InstallationError, InstallationResult};
use crate::installation::traits::ServiceCall;
use std::collections::HashMap;

/// One advertised endpoint of a service family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub id: String,
    pub name: String,
    pub schema_version: String,
}

impl ServiceEndpoint {
    /// `id` joined with `path`, tolerating a trailing slash on the endpoint
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.id.trim_end_matches('/'), path)
    }
}

/// Endpoints of one service family, split by whether the client was built
/// against their schema version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSet {
    pub service: String,
    pub known: Vec<ServiceEndpoint>,
    pub unknown: Vec<ServiceEndpoint>,
}

impl ServiceSet {
    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.unknown.is_empty()
    }
}

/// Collect every endpoint named `service_name` from the index.
///
/// Order within each partition follows the index.
pub fn find_services(
    index: &ServiceIndexDocument,
    service_name: &str,
    known_versions: &[&str],
) -> InstallationResult<ServiceSet> {
    let mut set = ServiceSet {
        service: service_name.to_string(),
        ..Default::default()
    };

    for resource in &index.resources {
        let (Some(id), Some((name, schema_version))) = (&resource.id, resource.service_type())
        else {
            continue;
        };
        if name != service_name {
            continue;
        }

        let endpoint = ServiceEndpoint {
            id: id.clone(),
            name: name.to_string(),
            schema_version: schema_version.to_string(),
        };
        if known_versions.contains(&schema_version) {
            set.known.push(endpoint);
        } else {
            set.unknown.push(endpoint);
        }
    }

    if set.is_empty() {
        return Err(InstallationError::ServiceNotFound {
            service: service_name.to_string(),
        });
    }

    log::debug!(
        "Found {} known and {} unknown endpoints for {}",
        set.known.len(),
        set.unknown.len(),
        service_name
    );
    Ok(set)
}

/// The call to make against each endpoint, with optional replacements for
/// specific schema versions
pub struct ServiceCalls<'a, T: Send> {
    default: &'a dyn ServiceCall<Output = T>,
    overrides: HashMap<String, &'a dyn ServiceCall<Output = T>>,
}

impl<'a, T: Send> ServiceCalls<'a, T> {
    pub fn new(default: &'a dyn ServiceCall<Output = T>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Use `call` instead of the default for endpoints with `schema_version`
    pub fn with_override(
        mut self,
        schema_version: impl Into<String>,
        call: &'a dyn ServiceCall<Output = T>,
    ) -> Self {
        self.overrides.insert(schema_version.into(), call);
        self
    }

    fn select(&self, endpoint: &ServiceEndpoint) -> &'a dyn ServiceCall<Output = T> {
        self.overrides
            .get(&endpoint.schema_version)
            .copied()
            .unwrap_or(self.default)
    }
}

/// Try every known endpoint in order, then every unknown one.
///
/// Returns the first success. When everything fails the first error seen is
/// returned, since later failures against unfamiliar schemas are usually
/// less informative.
pub async fn call_resilient<T: Send>(
    set: &ServiceSet,
    options: &RequestOptions,
    calls: &ServiceCalls<'_, T>,
) -> InstallationResult<T> {
    let mut first_error: Option<InstallationError> = None;

    for (tier, endpoints) in [("known", &set.known), ("unknown", &set.unknown)] {
        if tier == "unknown" && !endpoints.is_empty() && first_error.is_some() {
            log::debug!("Attempting {} endpoints with unknown schema versions", set.service);
        }

        for endpoint in endpoints {
            match calls.select(endpoint).call(endpoint, options).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    log::debug!(
                        "Call to {} endpoint {} ({}) failed: {}",
                        tier,
                        endpoint.id,
                        endpoint.schema_version,
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
    }

    Err(first_error.unwrap_or_else(|| InstallationError::ServiceNotFound {
        service: set.service.clone(),
    }))
}
