//! Version request classification and lazy version comparison

use std::fmt;
use std::str::FromStr;

const LATEST: &str = "Latest";
const LATEST_PRE_RELEASE: &str = "LatestPreRelease";

/// What the caller asked for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionRequest {
    /// A concrete version string, used as-is
    Exact(String),
    /// Newest listed stable version
    Latest,
    /// Newest listed version, pre-releases included
    LatestPreRelease,
}

impl VersionRequest {
    pub fn is_latest(&self) -> bool {
        !matches!(self, VersionRequest::Exact(_))
    }

    pub fn is_pre_release_request(&self) -> bool {
        matches!(self, VersionRequest::LatestPreRelease)
    }

    /// The exact version, if one was requested
    pub fn exact(&self) -> Option<&str> {
        match self {
            VersionRequest::Exact(version) => Some(version),
            _ => None,
        }
    }
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRequest::Exact(version) => f.write_str(version),
            VersionRequest::Latest => f.write_str(LATEST),
            VersionRequest::LatestPreRelease => f.write_str(LATEST_PRE_RELEASE),
        }
    }
}

impl FromStr for VersionRequest {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(classify(Some(s)))
    }
}

/// A package name paired with the version the caller wants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpecifier {
    pub name: String,
    pub version_request: VersionRequest,
}

impl PackageSpecifier {
    pub fn new(name: impl Into<String>, version_request: VersionRequest) -> Self {
        Self {
            name: name.into(),
            version_request,
        }
    }

    /// Build a specifier from a raw version string, normalizing wildcards
    pub fn parse(name: impl Into<String>, version: Option<&str>) -> Self {
        Self::new(name, classify(version))
    }
}

/// Classify a raw version string.
///
/// A missing value, a wildcard such as `1.*`, or a blank string all mean
/// "latest". Older pipelines passed wildcard versions before exact pinning
/// was supported, so they are folded into `Latest` here.
pub fn classify(version: Option<&str>) -> VersionRequest {
    let Some(version) = version else {
        return VersionRequest::Latest;
    };

    match version.trim() {
        LATEST => VersionRequest::Latest,
        LATEST_PRE_RELEASE => VersionRequest::LatestPreRelease,
        v if v.is_empty() || v.contains('*') => VersionRequest::Latest,
        v => VersionRequest::Exact(v.to_string()),
    }
}

/// True when the version carries a pre-release label (`1.2.0-beta`)
pub fn is_pre_release(version: &str) -> bool {
    matches!(version.find('-'), Some(index) if index > 0)
}

/// Lazily checks whether `v1 >= v2`.
///
/// Components are compared numerically with missing trailing components
/// treated as zero. Missing or unparsable input yields `true`; this gates
/// optional behavior, so erring towards "new enough" keeps the tool usable.
pub fn compare_at_least(v1: Option<&str>, v2: Option<&str>) -> bool {
    let (Some(v1), Some(v2)) = (v1, v2) else {
        return true;
    };

    let parts1: Vec<&str> = v1.trim().split('.').collect();
    let parts2: Vec<&str> = v2.trim().split('.').collect();

    for i in 0..parts1.len().max(parts2.len()) {
        let (Some(a), Some(b)) = (component(&parts1, i), component(&parts2, i)) else {
            return true;
        };

        if a > b {
            return true;
        }
        if a < b {
            return false;
        }
    }

    true
}

fn component(parts: &[&str], index: usize) -> Option<u64> {
    match parts.get(index) {
        None => Some(0),
        Some(part) => part.trim().parse().ok(),
    }
}
