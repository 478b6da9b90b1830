//! Package installation from a NuGet v3 style registry
//!
//! Packages are resolved through the registry's service index, downloaded as
//! archives into a versions root and extracted to `<name>.<version>/` folders.
//! An extracted folder is the only record that a version is installed, so
//! installs are idempotent and safe to race across processes.

pub mod archive;
pub mod cache;
pub mod errors;
pub mod orchestrator;
pub mod registry;
pub mod traits;
pub mod version;



// Re-exports for convenience
pub use archive::ArchiveInstaller;
pub use cache::{CacheProbe, LatestVersionMemo, VersionsRootStats};
pub use errors::*;
pub use orchestrator::{InstallOrchestrator, InstallResult, InstallerSettings};
pub use traits::*;
pub use version::{classify, compare_at_least, is_pre_release, PackageSpecifier, VersionRequest};

/// Creates an orchestrator backed by the process-wide latest-version memo
pub fn create_default_orchestrator(
    settings: InstallerSettings,
) -> Result<Box<dyn PackageInstaller>, InstallationError> {
    let orchestrator = InstallOrchestrator::new(settings)?;
    Ok(Box::new(orchestrator))
}
