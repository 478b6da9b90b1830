//! Error types for the installation system

use crate::errors::ToolfetchError;
use thiserror::Error;

/// Errors that can occur while resolving, downloading or extracting a package
#[derive(Error, Debug)]
pub enum InstallationError {
    #[error("Service unreachable at {url}: {message}")]
    ServiceUnreachable { url: String, message: String },

    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    #[error("Could not find service: {service}")]
    ServiceNotFound { service: String },

    #[error("Package not found: {name}")]
    PackageNotFound { name: String },

    #[error("Failed to download {url}: status {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Failed to download {url} after {attempts} attempts: {source}")]
    DownloadRetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<InstallationError>,
    },

    #[error("Gave up on {url} after {limit} redirects")]
    RedirectLimitExceeded { url: String, limit: u32 },

    #[error("The package could not be found after download: {path}")]
    DownloadVerificationFailed { path: String },

    #[error("Failed to extract {path}: {reason}")]
    ExtractionFailed { path: String, reason: String },

    #[error("Expected tool '{path}' was not found in the installed package")]
    ToolNotFound { path: String },

    #[error("Failed to install {package} version {requested} after {attempts} attempts: {source}")]
    InstallFailed {
        package: String,
        requested: String,
        attempts: u32,
        #[source]
        source: Box<InstallationError>,
    },

    #[error("I/O error during installation: {message}")]
    Io { message: String },
}

impl InstallationError {
    /// Whether the outer install loop may try the whole sequence again.
    ///
    /// A missing file after a completed download points at the filesystem,
    /// so another network round trip will not help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, InstallationError::DownloadVerificationFailed { .. })
    }
}

impl From<std::io::Error> for InstallationError {
    fn from(err: std::io::Error) -> Self {
        InstallationError::Io {
            message: err.to_string(),
        }
    }
}

impl From<InstallationError> for ToolfetchError {
    fn from(err: InstallationError) -> Self {
        match err {
            InstallationError::Io { message } => ToolfetchError::IoError(message),
            other => ToolfetchError::InstallerError(other.to_string()),
        }
    }
}

/// Result type for installation operations
pub type InstallationResult<T> = Result<T, InstallationError>;
