//! Distribution resolution
//!
//! Decides where the Gradle archive for a version comes from. When both
//! repository URLs are known the archive URI is built explicitly; otherwise
//! the connector is asked to resolve the version by name.

use std::fmt;

use reqwest::Url;
use tracing::debug;

use crate::config::RepositorySettings;
use crate::error::{HarnessError, HarnessResult};
use crate::version::GradleVersion;

/// Public release repository, used by the connector's by-name resolution.
pub const PUBLIC_RELEASE_REPOSITORY: &str = "https://services.gradle.org/distributions";
/// Public snapshot repository, used by the connector's by-name resolution.
pub const PUBLIC_SNAPSHOT_REPOSITORY: &str = "https://services.gradle.org/distributions-snapshots";

pub const ARCHIVE_NAME: &str = "gradle";
pub const ARCHIVE_CLASSIFIER: &str = "bin";

/// Where the connector should take the distribution from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionSource {
    /// Explicit archive URI
    Uri(Url),
    /// Let the connector resolve the version by name
    Version(GradleVersion),
}

impl fmt::Display for DistributionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionSource::Uri(uri) => write!(f, "{}", uri),
            DistributionSource::Version(v) => write!(f, "version {}", v),
        }
    }
}

impl RepositorySettings {
    /// Repository base URL for release or snapshot distributions.
    ///
    /// Explicit override first, then the CI mirror when running under CI,
    /// otherwise absent.
    pub fn resolve_repository(&self, snapshot: bool) -> Option<String> {
        let explicit = if snapshot {
            &self.snapshot_override
        } else {
            &self.release_override
        };

        explicit.clone().or_else(|| {
            self.under_ci.then(|| {
                if snapshot {
                    self.ci_snapshot_mirror.clone()
                } else {
                    self.ci_release_mirror.clone()
                }
            })
        })
    }
}

/// Resolved pair of repository base URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionLocator {
    release_repo_url: String,
    snapshot_repo_url: String,
}

impl DistributionLocator {
    pub fn new(release_repo_url: impl Into<String>, snapshot_repo_url: impl Into<String>) -> Self {
        Self {
            release_repo_url: release_repo_url.into(),
            snapshot_repo_url: snapshot_repo_url.into(),
        }
    }

    /// Locator over the public services.gradle.org repositories.
    pub fn public() -> Self {
        Self::new(PUBLIC_RELEASE_REPOSITORY, PUBLIC_SNAPSHOT_REPOSITORY)
    }

    /// Build a locator when both repositories resolve, `None` otherwise.
    pub fn from_settings(settings: &RepositorySettings) -> Option<Self> {
        let release = settings.resolve_repository(false)?;
        let snapshot = settings.resolve_repository(true)?;
        Some(Self::new(release, snapshot))
    }

    pub fn release_repo_url(&self) -> &str {
        &self.release_repo_url
    }

    pub fn snapshot_repo_url(&self) -> &str {
        &self.snapshot_repo_url
    }

    /// Archive URI for `version`, picked from the snapshot or release repository.
    pub fn distribution_for(&self, version: &GradleVersion) -> HarnessResult<Url> {
        let repository = if version.is_snapshot() {
            &self.snapshot_repo_url
        } else {
            &self.release_repo_url
        };
        distribution_uri(repository, version, ARCHIVE_NAME, ARCHIVE_CLASSIFIER)
    }
}

/// Format `{repository}/{archive}-{version}-{classifier}.zip` and parse it.
///
/// A malformed result is a configuration error; nothing retries it.
pub fn distribution_uri(
    repository_url: &str,
    version: &GradleVersion,
    archive_name: &str,
    archive_classifier: &str,
) -> HarnessResult<Url> {
    let raw = format!(
        "{}/{}-{}-{}.zip",
        repository_url,
        archive_name,
        version.as_str(),
        archive_classifier
    );
    Url::parse(&raw)
        .map_err(|e| HarnessError::Configuration(format!("malformed distribution URI {raw}: {e}")))
}

/// Pick the distribution source for `version` from repository settings.
pub fn select_distribution(
    settings: &RepositorySettings,
    version: &GradleVersion,
) -> HarnessResult<DistributionSource> {
    match DistributionLocator::from_settings(settings) {
        Some(locator) => {
            let uri = locator.distribution_for(version)?;
            debug!(version = %version, uri = %uri, "Resolved explicit distribution");
            Ok(DistributionSource::Uri(uri))
        }
        None => {
            debug!(version = %version, "Repositories unresolved, falling back to version name");
            Ok(DistributionSource::Version(version.clone()))
        }
    }
}
