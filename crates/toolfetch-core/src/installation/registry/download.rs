//! Package archive download with manual redirect handling and retry

use super::{call_resilient, find_services, RegistryClient, RequestOptions};
use super::{ServiceCalls, ServiceEndpoint, ServiceIndexDocument};
use crate::installation::cache::PACKAGE_EXTENSION;
use crate::installation::errors::{InstallationError, InstallationResult};
use crate::installation::traits::ServiceCall;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::LOCATION;
use reqwest::{Response, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const PACKAGE_BASE_ADDRESS_SERVICE: &str = "PackageBaseAddress";
pub const PACKAGE_BASE_ADDRESS_KNOWN_VERSIONS: &[&str] = &["3.0.0"];

pub const DEFAULT_DOWNLOAD_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Retry, redirect and deadline limits for archive downloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPolicy {
    /// Attempts after the first one
    pub retries: u32,
    pub retry_delay: Duration,
    pub max_redirects: u32,
    /// Deadline for one attempt, body included
    pub timeout: Duration,
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_DOWNLOAD_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

/// `{base}/{name}/{version}/{name}.{version}.nupkg`, all lowercased
pub fn package_url(base: &str, name: &str, version: &str) -> String {
    let name = name.to_lowercase();
    let version = version.to_lowercase();
    format!(
        "{}/{}/{}/{}.{}.{}",
        base.trim_end_matches('/'),
        name,
        version,
        name,
        version,
        PACKAGE_EXTENSION
    )
}

#[derive(Debug, Clone)]
pub struct PackageDownloader {
    client: RegistryClient,
    policy: DownloadPolicy,
}

impl PackageDownloader {
    pub fn new(client: RegistryClient, policy: DownloadPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &DownloadPolicy {
        &self.policy
    }

    /// Download `name` at `version` into `output_dir` and return the archive path
    pub async fn download(
        &self,
        index: &ServiceIndexDocument,
        options: &RequestOptions,
        name: &str,
        version: &str,
        output_dir: &Path,
    ) -> InstallationResult<PathBuf> {
        let services = find_services(
            index,
            PACKAGE_BASE_ADDRESS_SERVICE,
            PACKAGE_BASE_ADDRESS_KNOWN_VERSIONS,
        )?;

        let destination = output_dir.join(format!("{}.{}.{}", name, version, PACKAGE_EXTENSION));
        let call = DownloadFromBaseAddress {
            downloader: self,
            name,
            version,
            destination: &destination,
        };
        call_resilient(&services, options, &ServiceCalls::<()>::new(&call)).await?;

        verify_download(&destination).await?;

        log::info!("Downloaded {} {} to {}", name, version, destination.display());
        Ok(destination)
    }

    /// Download `url` to `destination`, retrying the whole transfer on failure.
    ///
    /// The error from the final attempt is surfaced.
    pub async fn download_file(
        &self,
        url: &str,
        options: &RequestOptions,
        destination: &Path,
    ) -> InstallationResult<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.download_once(url, options, destination).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt > self.policy.retries => {
                    return Err(InstallationError::DownloadRetriesExhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    log::debug!("Error downloading {} (attempt {}): {}", url, attempt, e);
                    log::debug!("Retrying download in {:?}", self.policy.retry_delay);
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
            }
        }
    }

    async fn download_once(
        &self,
        url: &str,
        options: &RequestOptions,
        destination: &Path,
    ) -> InstallationResult<()> {
        let mut current = url.to_string();
        let mut options = options.clone();

        for _ in 0..=self.policy.max_redirects {
            log::debug!("GET {}", current);
            let response = options
                .authorize(self.client.http().get(&current))
                .timeout(self.policy.timeout)
                .send()
                .await
                .map_err(|e| InstallationError::ServiceUnreachable {
                    url: current.clone(),
                    message: e.to_string(),
                })?;

            let status = response.status();
            if status == StatusCode::SEE_OTHER {
                let next = redirect_target(&response)?;
                log::debug!("Following redirect to {}", next);
                // Redirect targets are pre-signed; never forward the credential
                options = options.without_auth();
                current = next;
                continue;
            }

            if status != StatusCode::OK {
                return Err(InstallationError::DownloadFailed {
                    url: current,
                    status: status.as_u16(),
                });
            }

            return write_body(response, &current, destination).await;
        }

        Err(InstallationError::RedirectLimitExceeded {
            url: url.to_string(),
            limit: self.policy.max_redirects,
        })
    }
}

/// Confirm a finished download actually left its archive on disk
pub(crate) async fn verify_download(path: &Path) -> InstallationResult<()> {
    if fs::try_exists(path).await.unwrap_or(false) {
        Ok(())
    } else {
        Err(InstallationError::DownloadVerificationFailed {
            path: path.display().to_string(),
        })
    }
}

fn redirect_target(response: &Response) -> InstallationResult<String> {
    let url = response.url().to_string();
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| InstallationError::MalformedResponse {
            url: url.clone(),
            message: "redirect without a Location header".to_string(),
        })?;

    response
        .url()
        .join(location)
        .map(|target| target.to_string())
        .map_err(|e| InstallationError::MalformedResponse {
            url,
            message: format!("invalid Location '{}': {}", location, e),
        })
}

async fn write_body(response: Response, url: &str, destination: &Path) -> InstallationResult<()> {
    let mut file = fs::File::create(destination).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(destination).await;
                return Err(InstallationError::ServiceUnreachable {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
        };
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(())
}

/// Downloads the archive from one base-address endpoint
struct DownloadFromBaseAddress<'a> {
    downloader: &'a PackageDownloader,
    name: &'a str,
    version: &'a str,
    destination: &'a Path,
}

#[async_trait]
impl<'a> ServiceCall for DownloadFromBaseAddress<'a> {
    type Output = ();

    async fn call(
        &self,
        endpoint: &ServiceEndpoint,
        options: &RequestOptions,
    ) -> InstallationResult<()> {
        let url = package_url(&endpoint.id, self.name, self.version);
        self.downloader.download_file(&url, options, self.destination).await
    }
}
