//! Core traits and abstractions for the installation system

use crate::installation::errors::InstallationResult;
use crate::installation::orchestrator::InstallResult;
use crate::installation::registry::{RequestOptions, ServiceEndpoint};
use crate::installation::version::PackageSpecifier;
use async_trait::async_trait;
use std::path::Path;

/// One attempt against a single registry endpoint.
///
/// `call_resilient` drives an implementation of this trait across every
/// candidate endpoint until one succeeds.
#[async_trait]
pub trait ServiceCall: Send + Sync {
    type Output: Send;

    async fn call(
        &self,
        endpoint: &ServiceEndpoint,
        options: &RequestOptions,
    ) -> InstallationResult<Self::Output>;
}

/// Installs packages into a versions root
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Ensure the requested package version is installed, downloading it if necessary
    async fn install(&self, spec: &PackageSpecifier) -> InstallationResult<InstallResult>;

    /// Directory holding every installed `<name>.<version>` folder
    fn versions_root(&self) -> &Path;
}

/// Platform detection utilities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    /// Get the current platform
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// Runtime identifier suffix used by self-contained tool packages
    pub fn package_suffix(&self) -> Option<&'static str> {
        match (self.os.as_str(), self.arch.as_str()) {
            ("windows", _) => Some("win-x64"),
            ("linux", "aarch64") => Some("linux-arm64"),
            ("linux", _) => Some("linux-x64"),
            _ => None,
        }
    }

    /// Pick the platform specific package for `base`, or `base` itself when
    /// only the framework-dependent package exists for this platform
    pub fn package_name(&self, base: &str) -> String {
        match self.package_suffix() {
            Some(suffix) => format!("{}.{}", base, suffix),
            None => base.to_string(),
        }
    }
}
