//! Idempotent package installation into a versions root

use crate::installation::archive::ArchiveInstaller;
use crate::installation::cache::{CacheProbe, LatestVersionMemo};
use crate::installation::errors::{InstallationError, InstallationResult};
use crate::installation::registry::{
    DownloadPolicy, PackageDownloader, RegistryClient, RequestOptions, VersionResolver,
    DEFAULT_JSON_TIMEOUT,
};
use crate::installation::traits::PackageInstaller;
use crate::installation::version::{PackageSpecifier, VersionRequest};
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SERVICE_INDEX_URL: &str = "https://api.nuget.org/v3/index.json";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Outcome of a successful install
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallResult {
    pub success: bool,
    /// The package was already extracted; nothing was downloaded
    pub in_cache: bool,
    pub package_name: String,
    pub requested_version: String,
    pub resolved_version: Option<String>,
    pub package_folder: Option<PathBuf>,
    pub package_path: Option<PathBuf>,
}

impl InstallResult {
    pub(crate) fn installed(
        name: &str,
        requested: &str,
        version: &str,
        folder: PathBuf,
        archive: PathBuf,
        in_cache: bool,
    ) -> Self {
        Self {
            success: true,
            in_cache,
            package_name: name.to_string(),
            requested_version: requested.to_string(),
            resolved_version: Some(version.to_string()),
            package_folder: Some(folder),
            package_path: Some(archive),
        }
    }

    /// Path of `relative` inside the installed package folder
    pub fn tool_path(&self, relative: impl AsRef<Path>) -> Option<PathBuf> {
        self.package_folder
            .as_ref()
            .map(|folder| folder.join(relative))
    }

    /// Check that a tool the caller expects to run is present in the package
    pub async fn verify_tool(&self, relative: impl AsRef<Path>) -> InstallationResult<PathBuf> {
        let relative = relative.as_ref();
        let missing = || InstallationError::ToolNotFound {
            path: relative.display().to_string(),
        };

        let path = self.tool_path(relative).ok_or_else(missing)?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            Ok(path)
        } else {
            Err(missing())
        }
    }
}

/// Everything an orchestrator needs to reach the registry and lay out packages
#[derive(Debug, Clone)]
pub struct InstallerSettings {
    pub service_index_url: String,
    pub versions_root: PathBuf,
    pub access_token: Option<String>,
    /// Whole-sequence attempts, the first one included
    pub max_attempts: u32,
    pub json_timeout: Duration,
    pub download: DownloadPolicy,
}

impl InstallerSettings {
    pub fn new(service_index_url: impl Into<String>, versions_root: impl Into<PathBuf>) -> Self {
        Self {
            service_index_url: service_index_url.into(),
            versions_root: versions_root.into(),
            access_token: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            json_timeout: DEFAULT_JSON_TIMEOUT,
            download: DownloadPolicy::default(),
        }
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_download_policy(mut self, policy: DownloadPolicy) -> Self {
        self.download = policy;
        self
    }

    fn request_options(&self) -> RequestOptions {
        RequestOptions::new(self.access_token.clone()).with_json_timeout(self.json_timeout)
    }
}

/// Resolves, downloads and extracts packages, reusing anything already on disk
pub struct InstallOrchestrator {
    settings: InstallerSettings,
    client: RegistryClient,
    cache: CacheProbe,
    versions: VersionResolver,
    downloader: PackageDownloader,
    archives: ArchiveInstaller,
    memo: Arc<LatestVersionMemo>,
}

impl InstallOrchestrator {
    /// Create an orchestrator sharing the process-wide latest-version memo
    pub fn new(settings: InstallerSettings) -> InstallationResult<Self> {
        let client = RegistryClient::new()?;
        Ok(Self {
            cache: CacheProbe::new(settings.versions_root.clone()),
            versions: VersionResolver::new(client.clone()),
            downloader: PackageDownloader::new(client.clone(), settings.download.clone()),
            archives: ArchiveInstaller::new(),
            memo: LatestVersionMemo::shared(),
            client,
            settings,
        })
    }

    /// Replace the memo, mostly so tests do not share process state
    pub fn with_memo(mut self, memo: Arc<LatestVersionMemo>) -> Self {
        self.memo = memo;
        self
    }

    pub fn settings(&self) -> &InstallerSettings {
        &self.settings
    }

    pub fn cache(&self) -> &CacheProbe {
        &self.cache
    }

    /// A concrete version that can be probed without going to the network
    fn known_version(&self, request: &VersionRequest, name: &str) -> Option<String> {
        match request {
            VersionRequest::Exact(version) => Some(version.clone()),
            latest => self.memo.get(name, latest.is_pre_release_request()),
        }
    }

    async fn install_once(
        &self,
        spec: &PackageSpecifier,
        requested: &str,
        options: &RequestOptions,
    ) -> InstallationResult<InstallResult> {
        self.cache.ensure_versions_root().await?;

        let index = self
            .client
            .fetch_service_index(&self.settings.service_index_url, options)
            .await?;
        let version = self
            .versions
            .resolve(&index, options, &spec.name, &spec.version_request)
            .await?;

        // Another process may have finished the same install meanwhile
        if let Some(result) = self.cache.probe(&spec.name, requested, &version).await {
            log::debug!("{} {} was installed concurrently", spec.name, version);
            return Ok(result);
        }

        let package_path = self
            .downloader
            .download(&index, options, &spec.name, &version, self.cache.versions_root())
            .await?;
        let package_folder = self.archives.extract(&package_path).await?;

        Ok(InstallResult::installed(
            &spec.name,
            requested,
            &version,
            package_folder,
            package_path,
            false,
        ))
    }
}

/// Run `attempt` until it succeeds, fails with a non-retryable error or
/// `max_attempts` runs are used up. A failure carries the number of runs made
/// and the error of the last one.
pub(crate) async fn retry_sequence<T, F, Fut>(
    max_attempts: u32,
    label: &str,
    mut attempt: F,
) -> Result<T, (u32, InstallationError)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = InstallationResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut made = 0;
    loop {
        made += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() || made >= max_attempts => return Err((made, e)),
            Err(e) => {
                log::warn!(
                    "Install attempt {}/{} for {} failed: {}",
                    made,
                    max_attempts,
                    label,
                    e
                );
            }
        }
    }
}

#[async_trait]
impl PackageInstaller for InstallOrchestrator {
    async fn install(&self, spec: &PackageSpecifier) -> InstallationResult<InstallResult> {
        let requested = spec.version_request.to_string();

        if let Some(version) = self.known_version(&spec.version_request, &spec.name) {
            if let Some(result) = self.cache.probe(&spec.name, &requested, &version).await {
                log::info!("{} {} is already installed", spec.name, version);
                return Ok(result);
            }
        }

        let options = self.settings.request_options();
        let label = format!("{} {}", spec.name, requested);
        let outcome = retry_sequence(self.settings.max_attempts, &label, || {
            self.install_once(spec, &requested, &options)
        })
        .await;

        match outcome {
            Ok(result) => {
                if spec.version_request.is_latest() {
                    if let Some(version) = &result.resolved_version {
                        self.memo.remember(
                            &spec.name,
                            spec.version_request.is_pre_release_request(),
                            version,
                        );
                    }
                }
                log::info!(
                    "Installed {} {} into {}",
                    spec.name,
                    result.resolved_version.as_deref().unwrap_or(&requested),
                    self.cache.versions_root().display()
                );
                Ok(result)
            }
            Err((attempts, e)) => {
                log::error!("Failed to install {}: {}", label, e);
                Err(InstallationError::InstallFailed {
                    package: spec.name.clone(),
                    requested,
                    attempts,
                    source: Box::new(e),
                })
            }
        }
    }

    fn versions_root(&self) -> &Path {
        self.cache.versions_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installation::registry::verify_download;
    use tempfile::tempdir;

    #[test]
    fn test_settings_defaults() {
        let settings = InstallerSettings::new(DEFAULT_SERVICE_INDEX_URL, "/tmp/versions");
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.json_timeout, Duration::from_millis(2500));
        assert_eq!(settings.download, DownloadPolicy::default());
        assert!(settings.access_token.is_none());
    }

    #[test]
    fn test_blank_token_is_not_sent() {
        let settings = InstallerSettings::new(DEFAULT_SERVICE_INDEX_URL, "/tmp/versions")
            .with_access_token(Some("  ".to_string()));
        assert!(settings.request_options().access_token.is_none());
    }

    #[test]
    fn test_tool_path() {
        let result = InstallResult::installed(
            "pkg",
            "1.0.0",
            "1.0.0",
            PathBuf::from("/v/pkg.1.0.0"),
            PathBuf::from("/v/pkg.1.0.0.nupkg"),
            false,
        );
        assert_eq!(
            result.tool_path("tools/guardian"),
            Some(PathBuf::from("/v/pkg.1.0.0/tools/guardian"))
        );
    }

    #[tokio::test]
    async fn test_verify_tool() {
        let temp_dir = tempdir().unwrap();
        let folder = temp_dir.path().join("pkg.1.0.0");
        tokio::fs::create_dir_all(folder.join("tools")).await.unwrap();
        tokio::fs::write(folder.join("tools/guardian"), b"bin").await.unwrap();

        let result = InstallResult::installed(
            "pkg",
            "1.0.0",
            "1.0.0",
            folder.clone(),
            temp_dir.path().join("pkg.1.0.0.nupkg"),
            true,
        );

        assert_eq!(
            result.verify_tool("tools/guardian").await.unwrap(),
            folder.join("tools/guardian")
        );
        let err = result.verify_tool("tools/missing").await.unwrap_err();
        assert!(matches!(
            err,
            InstallationError::ToolNotFound { path } if path == "tools/missing"
        ));
    }

    #[tokio::test]
    async fn test_exact_cache_hit_skips_network() {
        let temp_dir = tempdir().unwrap();
        tokio::fs::create_dir_all(temp_dir.path().join("pkg.1.0.0")).await.unwrap();

        // Nothing listens here; any network call would fail the install
        let settings =
            InstallerSettings::new("http://127.0.0.1:1/v3/index.json", temp_dir.path());
        let orchestrator = InstallOrchestrator::new(settings)
            .unwrap()
            .with_memo(Arc::new(LatestVersionMemo::default()));

        let result = orchestrator
            .install(&PackageSpecifier::parse("pkg", Some("1.0.0")))
            .await
            .unwrap();
        assert!(result.in_cache);
        assert_eq!(result.resolved_version.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_remembered_latest_hits_cache() {
        let temp_dir = tempdir().unwrap();
        tokio::fs::create_dir_all(temp_dir.path().join("pkg.2.0.0")).await.unwrap();

        let memo = Arc::new(LatestVersionMemo::default());
        memo.remember("pkg", false, "2.0.0");

        let settings =
            InstallerSettings::new("http://127.0.0.1:1/v3/index.json", temp_dir.path());
        let orchestrator = InstallOrchestrator::new(settings).unwrap().with_memo(memo);

        let result = orchestrator
            .install(&PackageSpecifier::new("pkg", VersionRequest::Latest))
            .await
            .unwrap();
        assert!(result.in_cache);
        assert_eq!(result.requested_version, "Latest");
        assert_eq!(result.resolved_version.as_deref(), Some("2.0.0"));
    }

    #[tokio::test]
    async fn test_retry_sequence_surfaces_last_error() {
        let mut calls = 0;
        let outcome: Result<(), _> = retry_sequence(3, "pkg Latest", || {
            calls += 1;
            let status = 500 + calls;
            async move {
                Err(InstallationError::UnexpectedStatus {
                    url: "http://registry/v3/index.json".to_string(),
                    status,
                })
            }
        })
        .await;

        let (attempts, err) = outcome.unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(attempts, 3);
        assert!(matches!(err, InstallationError::UnexpectedStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_retry_sequence_stops_after_success() {
        let mut calls = 0;
        let outcome = retry_sequence(5, "pkg 1.0.0", || {
            calls += 1;
            let current = calls;
            async move {
                if current < 2 {
                    Err(InstallationError::Io {
                        message: "transient".to_string(),
                    })
                } else {
                    Ok(current)
                }
            }
        })
        .await;

        assert_eq!(outcome.unwrap(), 2);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let mut calls = 0;
        let outcome = retry_sequence(0, "pkg 1.0.0", || {
            calls += 1;
            async { Ok::<_, InstallationError>(()) }
        })
        .await;

        assert!(outcome.is_ok());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_download_verification_failure_is_not_retried() {
        let temp_dir = tempdir().unwrap();
        let missing = temp_dir.path().join("pkg.1.0.0.nupkg");

        let mut calls = 0;
        let outcome = retry_sequence(3, "pkg 1.0.0", || {
            calls += 1;
            verify_download(&missing)
        })
        .await;

        let (attempts, err) = outcome.unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(attempts, 1);
        assert!(matches!(
            err,
            InstallationError::DownloadVerificationFailed { path }
                if path == missing.display().to_string()
        ));
    }
}
