//! Package registry protocol: service index discovery, endpoint fallback,
//! version resolution and package download

pub mod download;
pub mod resolver;
pub mod service_index;
pub mod versions;

pub use download::{package_url, DownloadPolicy, PackageDownloader};
pub use resolver::{call_resilient, find_services, ServiceCalls, ServiceEndpoint, ServiceSet};
pub use service_index::{ServiceIndexDocument, ServiceResource};
pub use versions::{select_version, RegistrationIndex, VersionResolver};

pub(crate) use download::verify_download;

use crate::installation::errors::{InstallationError, InstallationResult};
use reqwest::header::ACCEPT;
use reqwest::{redirect, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Timeout for small JSON documents (service index, registration index)
pub const DEFAULT_JSON_TIMEOUT: Duration = Duration::from_millis(2500);

const USER_AGENT: &str = concat!("toolfetch/", env!("CARGO_PKG_VERSION"));

/// Per-request settings shared by every call made during one install
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Sent as basic auth with an empty user name
    pub access_token: Option<String>,
    pub json_timeout: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            access_token: None,
            json_timeout: DEFAULT_JSON_TIMEOUT,
        }
    }
}

impl RequestOptions {
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            access_token: access_token.filter(|token| !token.trim().is_empty()),
            ..Default::default()
        }
    }

    pub fn with_json_timeout(mut self, timeout: Duration) -> Self {
        self.json_timeout = timeout;
        self
    }

    /// Same options with credentials removed
    pub fn without_auth(&self) -> Self {
        Self {
            access_token: None,
            json_timeout: self.json_timeout,
        }
    }

    pub(crate) fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => builder.basic_auth("", Some(token)),
            None => builder,
        }
    }
}

/// Thin HTTP client for registry documents.
///
/// Redirects are never followed automatically; the download path handles
/// them itself so credentials are not forwarded to another host.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: Client,
}

impl RegistryClient {
    pub fn new() -> InstallationResult<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| InstallationError::Io {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { http })
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// GET a JSON document. Anything but `200 OK` is an error.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> InstallationResult<T> {
        log::debug!("GET {}", url);

        let response = options
            .authorize(self.http.get(url))
            .header(ACCEPT, "application/json")
            .timeout(options.json_timeout)
            .send()
            .await
            .map_err(|e| InstallationError::ServiceUnreachable {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if response.status() != StatusCode::OK {
            return Err(InstallationError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| InstallationError::ServiceUnreachable {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        serde_json::from_slice(&body).map_err(|e| InstallationError::MalformedResponse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
