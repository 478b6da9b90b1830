//! Configuration types for toolfetch
//!
//! Every field has a default, so an empty document is a valid configuration.

use crate::errors::ToolfetchError;
use crate::installation::orchestrator::{
    InstallerSettings, DEFAULT_MAX_ATTEMPTS, DEFAULT_SERVICE_INDEX_URL,
};
use crate::installation::registry::download::{
    DEFAULT_DOWNLOAD_RETRIES, DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_MAX_REDIRECTS, DEFAULT_RETRY_DELAY,
};
use crate::installation::registry::{DownloadPolicy, DEFAULT_JSON_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolfetchConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub install: InstallConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where packages come from and how to authenticate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_service_index_url")]
    pub service_index_url: String,
    /// Literal token, or `${VAR}` to read it from the environment
    #[serde(default)]
    pub access_token: Option<String>,
    /// Environment variable holding the token
    #[serde(default)]
    pub access_token_env: Option<String>,
    #[serde(default = "default_json_timeout_ms")]
    pub json_timeout_ms: u64,
}

/// Where packages go and how hard to try
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Defaults to `<cache dir>/toolfetch/versions`
    #[serde(default)]
    pub versions_root: Option<PathBuf>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_download_retries")]
    pub download_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            service_index_url: default_service_index_url(),
            access_token: None,
            access_token_env: None,
            json_timeout_ms: default_json_timeout_ms(),
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            versions_root: None,
            max_attempts: default_max_attempts(),
            download_retries: default_download_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_redirects: default_max_redirects(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_service_index_url() -> String {
    DEFAULT_SERVICE_INDEX_URL.to_string()
}

fn default_json_timeout_ms() -> u64 {
    DEFAULT_JSON_TIMEOUT.as_millis() as u64
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_download_retries() -> u32 {
    DEFAULT_DOWNLOAD_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

fn default_max_redirects() -> u32 {
    DEFAULT_MAX_REDIRECTS
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT.as_secs()
}


fn default_log_level() -> String {
    "info".to_string()
}

/// `<cache dir>/toolfetch/versions`, when the platform has a cache dir
pub fn default_versions_root() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("toolfetch").join("versions"))
}

impl ToolfetchConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ToolfetchError> {
        let url = self.registry.service_index_url.trim();
        if url.is_empty() {
            return Err(ToolfetchError::ConfigError(
                "Registry service_index_url cannot be empty".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolfetchError::ConfigError(format!(
                "Registry service_index_url must be an http(s) URL, got '{}'",
                url
            )));
        }

        if self.registry.json_timeout_ms == 0 {
            return Err(ToolfetchError::ConfigError(
                "Registry json_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.install.max_attempts == 0 {
            return Err(ToolfetchError::ConfigError(
                "Install max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.install.download_timeout_secs == 0 {
            return Err(ToolfetchError::ConfigError(
                "Install download_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Configured versions root, or the platform default
    pub fn versions_root(&self) -> Result<PathBuf, ToolfetchError> {
        self.install
            .versions_root
            .clone()
            .or_else(default_versions_root)
            .ok_or_else(|| {
                ToolfetchError::ConfigError(
                    "No versions_root configured and no cache directory available".to_string(),
                )
            })
    }

    /// Settings for an [`crate::installation::InstallOrchestrator`]
    pub fn to_settings(&self) -> Result<InstallerSettings, ToolfetchError> {
        let settings = InstallerSettings {
            service_index_url: self.registry.service_index_url.trim().to_string(),
            versions_root: self.versions_root()?,
            access_token: self.registry.access_token.clone(),
            max_attempts: self.install.max_attempts,
            json_timeout: Duration::from_millis(self.registry.json_timeout_ms),
            download: DownloadPolicy {
                retries: self.install.download_retries,
                retry_delay: Duration::from_millis(self.install.retry_delay_ms),
                max_redirects: self.install.max_redirects,
                timeout: Duration::from_secs(self.install.download_timeout_secs),
            },
        };
        Ok(settings)
    }
}
