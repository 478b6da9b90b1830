//! Versions-root layout, install probing and the latest-version memo

use crate::installation::errors::{InstallationError, InstallationResult};
use crate::installation::orchestrator::InstallResult;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::fs;

/// Archive extension used by the package index
pub const PACKAGE_EXTENSION: &str = "nupkg";

/// Knows where packages live under a versions root and whether they are installed
#[derive(Debug, Clone)]
pub struct CacheProbe {
    versions_root: PathBuf,
}

impl CacheProbe {
    pub fn new(versions_root: PathBuf) -> Self {
        Self { versions_root }
    }

    pub fn versions_root(&self) -> &Path {
        &self.versions_root
    }

    /// `<root>/<name>.<version>.nupkg`
    pub fn package_path(&self, name: &str, version: &str) -> PathBuf {
        self.versions_root
            .join(format!("{}.{}.{}", name, version, PACKAGE_EXTENSION))
    }

    /// `<root>/<name>.<version>/`
    pub fn package_folder(&self, name: &str, version: &str) -> PathBuf {
        self.versions_root.join(format!("{}.{}", name, version))
    }

    /// Check whether `version` of `name` is already extracted.
    ///
    /// The extracted folder is the only thing consulted; a stray archive
    /// without its folder does not count as installed.
    pub async fn probe(&self, name: &str, requested: &str, version: &str) -> Option<InstallResult> {
        let folder = self.package_folder(name, version);
        match fs::metadata(&folder).await {
            Ok(metadata) if metadata.is_dir() => Some(InstallResult::installed(
                name,
                requested,
                version,
                folder,
                self.package_path(name, version),
                true,
            )),
            _ => None,
        }
    }

    /// Ensure the versions root exists
    pub async fn ensure_versions_root(&self) -> InstallationResult<()> {
        fs::create_dir_all(&self.versions_root).await?;
        Ok(())
    }

    /// Versions of `name` that are extracted under the root, newest first
    pub async fn installed_versions(&self, name: &str) -> InstallationResult<Vec<String>> {
        let mut versions = Vec::new();
        if !self.versions_root.is_dir() {
            return Ok(versions);
        }

        let prefix = format!("{}.", name);
        let mut entries = fs::read_dir(&self.versions_root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(version) = file_name.strip_prefix(&prefix) else {
                continue;
            };
            // `Tool.linux-x64.1.0.0` must not show up as a version of `Tool`
            if version.starts_with(|c: char| c.is_ascii_digit()) {
                versions.push(version.to_string());
            }
        }

        versions.sort_by(|a, b| version_key(b).cmp(&version_key(a)).then_with(|| b.cmp(a)));
        Ok(versions)
    }

    /// Summarize what the versions root currently holds
    pub async fn stats(&self) -> InstallationResult<VersionsRootStats> {
        let root = self.versions_root.clone();
        tokio::task::spawn_blocking(move || collect_stats(&root))
            .await
            .map_err(|e| InstallationError::Io {
                message: format!("stats task failed: {}", e),
            })?
    }
}

/// Leading numeric components, `1.10.0-beta` -> `[1, 10]`
fn version_key(version: &str) -> Vec<u64> {
    version.split('.').map_while(|part| part.parse().ok()).collect()
}

fn collect_stats(root: &Path) -> InstallationResult<VersionsRootStats> {
    let mut stats = VersionsRootStats::default();
    if !root.exists() {
        return Ok(stats);
    }

    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|e| InstallationError::Io {
            message: format!("walk {}: {}", root.display(), e),
        })?;

        if entry.depth() == 1 {
            if entry.file_type().is_dir() {
                stats.package_count += 1;
            } else if entry.path().extension().is_some_and(|ext| ext == PACKAGE_EXTENSION) {
                stats.archive_count += 1;
            }
        }

        if entry.file_type().is_file() {
            let metadata = entry.metadata().map_err(|e| InstallationError::Io {
                message: e.to_string(),
            })?;
            stats.total_size += metadata.len();
        }
    }

    Ok(stats)
}

/// Versions-root statistics
#[derive(Debug, Default)]
pub struct VersionsRootStats {
    /// Number of extracted package folders
    pub package_count: usize,
    /// Number of downloaded archives still present
    pub archive_count: usize,
    /// Total size of every file under the root in bytes
    pub total_size: u64,
}

impl VersionsRootStats {
    /// Get total size in human-readable format
    pub fn total_size_human(&self) -> String {
        let sizes = ["B", "KB", "MB", "GB"];
        let mut size = self.total_size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < sizes.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        format!("{:.2} {}", size, sizes[unit_index])
    }
}

/// Remembers which concrete version a latest request resolved to.
///
/// Keyed by `(package name, pre-release flag)`. The first resolution for a key
/// wins and is never replaced for the life of the process, so repeated latest
/// installs in one run stay on the same version.
#[derive(Debug, Default)]
pub struct LatestVersionMemo {
    slots: Mutex<HashMap<(String, bool), String>>,
}

impl LatestVersionMemo {
    /// The process-wide memo
    pub fn shared() -> Arc<LatestVersionMemo> {
        static SHARED: OnceLock<Arc<LatestVersionMemo>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(LatestVersionMemo::default())).clone()
    }

    pub fn get(&self, name: &str, pre_release: bool) -> Option<String> {
        self.slots
            .lock()
            .ok()?
            .get(&(name.to_string(), pre_release))
            .cloned()
    }

    pub fn remember(&self, name: &str, pre_release: bool, version: &str) {
        // A poisoned lock only costs a network round trip later.
        if let Ok(mut slots) = self.slots.lock() {
            slots
                .entry((name.to_string(), pre_release))
                .or_insert_with(|| version.to_string());
        }
    }
}
