//! Harness configuration
//!
//! Everything is resolved from environment variables with fixed defaults.
//! `RepositorySettings::from_lookup` takes an arbitrary key lookup so that
//! tests can exercise the priority rules without touching process env.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Release repository override.
pub const RELEASE_REPOSITORY_ENV: &str = "GRADLE_RELEASE_REPOSITORY";
/// Snapshot repository override.
pub const SNAPSHOT_REPOSITORY_ENV: &str = "GRADLE_SNAPSHOT_REPOSITORY";
/// Set by TeamCity agents; its presence means we run under CI.
pub const CI_MARKER_ENV: &str = "TEAMCITY_VERSION";

pub const FIXTURES_ENV: &str = "MODEL_HARNESS_FIXTURES";
pub const DISTRIBUTIONS_ENV: &str = "MODEL_HARNESS_DISTRIBUTIONS";
pub const GRADLE_USER_HOME_ENV: &str = "MODEL_HARNESS_GRADLE_USER_HOME";
pub const EXTENSION_SCRIPT_ENV: &str = "MODEL_HARNESS_EXTENSION_SCRIPT";

/// Internal mirror of the release repository, used under CI.
pub const CI_RELEASE_MIRROR: &str =
    "http://services.gradle.org-mirror.labs.intellij.net/distributions";
/// Internal mirror of the snapshot repository, used under CI.
pub const CI_SNAPSHOT_MIRROR: &str =
    "http://services.gradle.org-mirror.labs.intellij.net/distributions-snapshots";

/// Name of the shared temp root under the system temp directory.
pub const DEFAULT_TEMP_ROOT_NAME: &str = "gradleTests";

/// Daemons spawned by a case are reclaimed after this much idle time.
pub const DEFAULT_DAEMON_MAX_IDLE: Duration = Duration::from_secs(1);

/// Repository sources consulted by the distribution resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySettings {
    /// Explicit release repository URL
    pub release_override: Option<String>,
    /// Explicit snapshot repository URL
    pub snapshot_override: Option<String>,
    /// Whether a recognized CI environment was detected
    pub under_ci: bool,
    /// Release mirror used under CI
    pub ci_release_mirror: String,
    /// Snapshot mirror used under CI
    pub ci_snapshot_mirror: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl RepositorySettings {
    /// Read settings from process environment
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Read settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        RepositorySettings {
            release_override: lookup(RELEASE_REPOSITORY_ENV).filter(|v| !v.is_empty()),
            snapshot_override: lookup(SNAPSHOT_REPOSITORY_ENV).filter(|v| !v.is_empty()),
            under_ci: lookup(CI_MARKER_ENV).is_some(),
            ci_release_mirror: CI_RELEASE_MIRROR.to_string(),
            ci_snapshot_mirror: CI_SNAPSHOT_MIRROR.to_string(),
        }
    }

    /// Settings with no overrides and no CI, so every lookup is absent
    pub fn offline() -> Self {
        Self::from_lookup(|_| None)
    }

    /// Set both repository overrides
    pub fn with_repositories(mut self, release: &str, snapshot: &str) -> Self {
        self.release_override = Some(release.to_string());
        self.snapshot_override = Some(snapshot.to_string());
        self
    }

    /// Force CI detection on or off
    pub fn with_ci(mut self, under_ci: bool) -> Self {
        self.under_ci = under_ci;
        self
    }
}

/// Top-level harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Repository sources for distribution resolution
    pub repositories: RepositorySettings,
    /// Directory the shared temp root is created in
    pub temp_base: PathBuf,
    /// Name of the shared temp root
    pub temp_root_name: String,
    /// Directory holding `<test>/build.gradle` and `<test>/settings.gradle`
    pub fixtures_dir: PathBuf,
    /// Cache directory for downloaded distributions
    pub distributions_dir: PathBuf,
    /// Gradle user home passed to every invocation (Gradle default if unset)
    pub gradle_user_home: Option<PathBuf>,
    /// Daemon idle timeout
    #[serde(with = "duration_millis")]
    pub daemon_max_idle: Duration,
    /// Model-builder extension script inlined into the init script
    pub extension_script: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let temp = std::env::temp_dir();
        HarnessConfig {
            repositories: RepositorySettings::from_env(),
            temp_base: temp.clone(),
            temp_root_name: DEFAULT_TEMP_ROOT_NAME.to_string(),
            fixtures_dir: std::env::var_os(FIXTURES_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tests/fixtures")),
            distributions_dir: std::env::var_os(DISTRIBUTIONS_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| temp.join("model-harness-dists")),
            gradle_user_home: std::env::var_os(GRADLE_USER_HOME_ENV).map(PathBuf::from),
            daemon_max_idle: DEFAULT_DAEMON_MAX_IDLE,
            extension_script: std::env::var_os(EXTENSION_SCRIPT_ENV).map(PathBuf::from),
        }
    }
}

impl HarnessConfig {
    /// Create a config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Replace repository settings
    pub fn with_repositories(mut self, repositories: RepositorySettings) -> Self {
        self.repositories = repositories;
        self
    }

    /// Place the shared temp root under `base`
    pub fn with_temp_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.temp_base = base.into();
        self
    }

    /// Set the fixtures directory
    pub fn with_fixtures_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fixtures_dir = dir.into();
        self
    }

    /// Set the distribution cache directory
    pub fn with_distributions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.distributions_dir = dir.into();
        self
    }

    /// Set the model-builder extension script
    pub fn with_extension_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.extension_script = Some(path.into());
        self
    }

    /// Full path of the shared temp root
    pub fn temp_root_path(&self) -> PathBuf {
        self.temp_base.join(&self.temp_root_name)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_overrides_read_from_lookup() {
        let settings = RepositorySettings::from_lookup(lookup_from(&[
            (RELEASE_REPOSITORY_ENV, "https://mirror/releases"),
            (SNAPSHOT_REPOSITORY_ENV, "https://mirror/snapshots"),
        ]));
        assert_eq!(
            settings.release_override.as_deref(),
            Some("https://mirror/releases")
        );
        assert_eq!(
            settings.snapshot_override.as_deref(),
            Some("https://mirror/snapshots")
        );
        assert!(!settings.under_ci);
    }

    #[test]
    fn test_ci_marker_detected() {
        let settings = RepositorySettings::from_lookup(lookup_from(&[(CI_MARKER_ENV, "2023.1")]));
        assert!(settings.under_ci);
        assert!(settings.release_override.is_none());
    }

    #[test]
    fn test_empty_override_is_absent() {
        let settings =
            RepositorySettings::from_lookup(lookup_from(&[(RELEASE_REPOSITORY_ENV, "")]));
        assert!(settings.release_override.is_none());
    }

    #[test]
    fn test_offline_has_nothing() {
        let settings = RepositorySettings::offline();
        assert!(settings.release_override.is_none());
        assert!(settings.snapshot_override.is_none());
        assert!(!settings.under_ci);
    }

    #[test]
    fn test_config_builders() {
        let config = HarnessConfig::default()
            .with_repositories(RepositorySettings::offline())
            .with_temp_base("/tmp/base")
            .with_fixtures_dir("/fixtures")
            .with_extension_script("/ext/builders.gradle");

        assert_eq!(config.temp_root_path(), PathBuf::from("/tmp/base/gradleTests"));
        assert_eq!(config.fixtures_dir, PathBuf::from("/fixtures"));
        assert_eq!(config.daemon_max_idle, Duration::from_secs(1));
        assert!(config.extension_script.is_some());
    }

    #[test]
    fn test_config_serde_roundtrip_keeps_idle_millis() {
        let config = HarnessConfig::default().with_repositories(RepositorySettings::offline());
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["daemon_max_idle"], 1000);

        let back: HarnessConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.daemon_max_idle, config.daemon_max_idle);
        assert_eq!(back.repositories, config.repositories);
    }
}
