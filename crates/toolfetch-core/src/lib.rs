//! Package resolution and installation for NuGet v3 style registries.
//!
//! `toolfetch-core` resolves a package name and version request against a
//! registry's service index, downloads the package archive and extracts it
//! into a shared versions root. Installs are idempotent: a version whose
//! folder already exists is never fetched again.
//!
//! # Architecture Overview
//!
//! - **Version policy**: classifying requests and comparing dotted versions
//! - **Registry protocol**: service index discovery, known-first endpoint
//!   fallback, version resolution and archive download
//! - **Installation**: cache probing, extraction and the retrying orchestrator
//! - **Configuration**: YAML settings with environment resolution

pub mod config;
pub mod errors;
pub mod installation;

pub use config::*;
pub use errors::ToolfetchError;
pub use installation::{
    InstallOrchestrator, InstallResult, InstallationError, InstallerSettings, PackageInstaller,
    PackageSpecifier, VersionRequest,
};

#[cfg(test)]
pub mod test_utils;
