//! Package archive extraction

use crate::installation::errors::{InstallationError, InstallationResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extracts downloaded archives next to themselves
#[derive(Debug, Clone, Default)]
pub struct ArchiveInstaller;

impl ArchiveInstaller {
    pub fn new() -> Self {
        Self
    }

    /// Folder an archive extracts into: the archive path minus its extension
    pub fn folder_for(archive_path: &Path) -> PathBuf {
        archive_path.with_extension("")
    }

    /// Staging folder an archive is unpacked into before it is published.
    ///
    /// Hidden and suffixed with the process id so it never looks like an
    /// installed version and concurrent extractors do not share it.
    pub fn staging_for(folder: &Path) -> PathBuf {
        let name = folder
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        folder.with_file_name(format!(".{}.partial-{}", name, std::process::id()))
    }

    /// Extract `archive_path` into its sibling folder and return the folder.
    ///
    /// The folder only appears once every entry has been written; an existing
    /// folder is replaced at that point. A failed extraction leaves no folder
    /// behind.
    pub async fn extract(&self, archive_path: &Path) -> InstallationResult<PathBuf> {
        let archive_path = archive_path.to_path_buf();
        let folder = Self::folder_for(&archive_path);
        let staging = Self::staging_for(&folder);
        log::debug!("Extracting {} to {}", archive_path.display(), folder.display());

        let target = folder.clone();
        tokio::task::spawn_blocking(move || {
            remove_quietly(&staging);
            if let Err(e) = extract_zip(&archive_path, &staging) {
                remove_quietly(&staging);
                return Err(e);
            }
            make_tree_executable(&staging);
            publish(&staging, &target)
        })
        .await
        .map_err(|e| InstallationError::Io {
            message: format!("extraction task failed: {}", e),
        })??;

        Ok(folder)
    }
}

/// Move a completely extracted `staging` tree to `folder`
fn publish(staging: &Path, folder: &Path) -> InstallationResult<()> {
    if folder.exists() {
        if let Err(e) = fs::remove_dir_all(folder) {
            remove_quietly(staging);
            return Err(e.into());
        }
    }

    match fs::rename(staging, folder) {
        Ok(()) => Ok(()),
        Err(_) if folder.is_dir() => {
            // Another process published the same version in between
            log::debug!("{} was published concurrently", folder.display());
            remove_quietly(staging);
            Ok(())
        }
        Err(e) => {
            remove_quietly(staging);
            Err(e.into())
        }
    }
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_dir_all(path) {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

fn extract_zip(archive_path: &Path, destination: &Path) -> InstallationResult<()> {
    use zip::ZipArchive;

    let extraction_error = |reason: String| InstallationError::ExtractionFailed {
        path: archive_path.display().to_string(),
        reason,
    };

    let file = fs::File::open(archive_path)
        .map_err(|e| extraction_error(format!("Failed to open archive: {}", e)))?;
    let mut archive = ZipArchive::new(io::BufReader::new(file))
        .map_err(|e| extraction_error(format!("Failed to read zip archive: {}", e)))?;

    fs::create_dir_all(destination)?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| extraction_error(format!("Failed to read zip entry: {}", e)))?;

        let Some(relative) = entry.enclosed_name() else {
            log::warn!(
                "Skipping archive entry outside the package folder: {}",
                entry.name()
            );
            continue;
        };
        let out_path = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = fs::File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file).map_err(|e| {
            extraction_error(format!("Failed to write {}: {}", out_path.display(), e))
        })?;
    }

    Ok(())
}

/// Mark every regular file under `folder` executable (Unix only).
///
/// Failures are logged per file and otherwise ignored.
#[cfg(unix)]
fn make_tree_executable(folder: &Path) {
    use std::os::unix::fs::PermissionsExt;

    for entry in walkdir::WalkDir::new(folder) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Error walking {}: {}", folder.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        match fs::set_permissions(entry.path(), fs::Permissions::from_mode(0o755)) {
            Ok(()) => log::debug!("Set 0755 on {}", entry.path().display()),
            Err(e) => log::warn!(
                "Error setting executable permission on {}: {}",
                entry.path().display(),
                e
            ),
        }
    }
}

#[cfg(not(unix))]
fn make_tree_executable(_folder: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{corrupted_package_bytes, package_bytes};
    use tempfile::tempdir;

    fn write_package(path: &Path, files: &[(&str, &[u8])]) {
        fs::write(path, package_bytes(files)).unwrap();
    }

    #[test]
    fn test_folder_for_strips_extension() {
        assert_eq!(
            ArchiveInstaller::folder_for(Path::new("/v/Contoso.Tool.2.3.1.nupkg")),
            PathBuf::from("/v/Contoso.Tool.2.3.1")
        );
    }

    #[tokio::test]
    async fn test_extract_into_sibling_folder() {
        let temp_dir = tempdir().unwrap();
        let archive = temp_dir.path().join("pkg.1.0.0.nupkg");
        write_package(
            &archive,
            &[("tools/guardian", b"#!/bin/sh\n"), ("pkg.nuspec", b"<package/>")],
        );

        let folder = ArchiveInstaller::new().extract(&archive).await.unwrap();

        assert_eq!(folder, temp_dir.path().join("pkg.1.0.0"));
        assert_eq!(fs::read(folder.join("tools/guardian")).unwrap(), b"#!/bin/sh\n");
        assert!(folder.join("pkg.nuspec").is_file());
        // The archive stays behind
        assert!(archive.exists());
    }

    #[tokio::test]
    async fn test_extract_overwrites_existing_files() {
        let temp_dir = tempdir().unwrap();
        let archive = temp_dir.path().join("pkg.1.0.0.nupkg");
        write_package(&archive, &[("tools/guardian", b"new")]);

        let folder = temp_dir.path().join("pkg.1.0.0");
        fs::create_dir_all(folder.join("tools")).unwrap();
        fs::write(folder.join("tools/guardian"), b"stale content").unwrap();

        ArchiveInstaller::new().extract(&archive).await.unwrap();
        assert_eq!(fs::read(folder.join("tools/guardian")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_extract_skips_entries_outside_folder() {
        let temp_dir = tempdir().unwrap();
        let archive = temp_dir.path().join("pkg.1.0.0.nupkg");
        write_package(&archive, &[("../escape.txt", b"x"), ("tools/guardian", b"bin")]);

        let folder = ArchiveInstaller::new().extract(&archive).await.unwrap();

        assert!(folder.join("tools/guardian").is_file());
        assert!(!temp_dir.path().join("escape.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_marks_files_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        let archive = temp_dir.path().join("pkg.1.0.0.nupkg");
        write_package(&archive, &[("tools/guardian", b"bin"), ("readme.txt", b"docs")]);

        let folder = ArchiveInstaller::new().extract(&archive).await.unwrap();

        for file in ["tools/guardian", "readme.txt"] {
            let mode = fs::metadata(folder.join(file)).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755, "{} should be executable", file);
        }
    }

    #[tokio::test]
    async fn test_extract_rejects_non_zip() {
        let temp_dir = tempdir().unwrap();
        let archive = temp_dir.path().join("pkg.1.0.0.nupkg");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let err = ArchiveInstaller::new().extract(&archive).await.unwrap_err();
        assert!(matches!(err, InstallationError::ExtractionFailed { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_entry_leaves_no_folder() {
        let temp_dir = tempdir().unwrap();
        let archive = temp_dir.path().join("pkg.1.0.0.nupkg");
        fs::write(
            &archive,
            corrupted_package_bytes(&[("tools/guardian", b"#!/bin/sh\necho guardian\n")]),
        )
        .unwrap();

        let err = ArchiveInstaller::new().extract(&archive).await.unwrap_err();
        assert!(matches!(err, InstallationError::ExtractionFailed { .. }));

        let folder = temp_dir.path().join("pkg.1.0.0");
        assert!(!folder.exists());
        assert!(!ArchiveInstaller::staging_for(&folder).exists());
    }

    #[tokio::test]
    async fn test_corrupt_entry_keeps_previous_install() {
        let temp_dir = tempdir().unwrap();
        let archive = temp_dir.path().join("pkg.1.0.0.nupkg");
        fs::write(
            &archive,
            corrupted_package_bytes(&[("tools/guardian", b"#!/bin/sh\necho guardian\n")]),
        )
        .unwrap();

        let folder = temp_dir.path().join("pkg.1.0.0");
        fs::create_dir_all(folder.join("tools")).unwrap();
        fs::write(folder.join("tools/guardian"), b"previous").unwrap();

        assert!(ArchiveInstaller::new().extract(&archive).await.is_err());
        assert_eq!(fs::read(folder.join("tools/guardian")).unwrap(), b"previous");
    }

    #[tokio::test]
    async fn test_extract_replaces_stale_files() {
        let temp_dir = tempdir().unwrap();
        let archive = temp_dir.path().join("pkg.1.0.0.nupkg");
        write_package(&archive, &[("tools/guardian", b"new")]);

        let folder = temp_dir.path().join("pkg.1.0.0");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("leftover.txt"), b"old").unwrap();

        ArchiveInstaller::new().extract(&archive).await.unwrap();
        assert!(!folder.join("leftover.txt").exists());
        assert_eq!(fs::read(folder.join("tools/guardian")).unwrap(), b"new");
    }

    #[test]
    fn test_staging_folder_is_hidden_sibling() {
        let staging = ArchiveInstaller::staging_for(Path::new("/v/pkg.1.0.0"));
        assert_eq!(staging.parent(), Some(Path::new("/v")));
        let name = staging.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".pkg.1.0.0.partial-"));
    }
}
