//! Crate-level error type
//!
//! Configuration loading and the command-line front end speak in terms of
//! `ToolfetchError`. The installation engine has its own structured error
//! (`installation::InstallationError`) that converts into this one when it
//! crosses the crate boundary.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ToolfetchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Installer error: {0}")]
    InstallerError(String),
}
