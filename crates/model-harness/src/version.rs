//! Gradle version identifiers and the static version table.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Gradle versions every suite case runs against, in execution order.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.9", "1.10", "1.11", "1.12-20140327133732+0000"];

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^((\d+)(\.\d+)+)(-([A-Za-z]+)-(\d+[a-z]?))?(-(SNAPSHOT|\d{14}([-+]\d{4})?))?$",
        )
        .expect("version pattern is a valid regex")
    })
}

/// A parsed Gradle version.
///
/// Follows Gradle's own grammar: a dotted base version, an optional
/// pre-release stage (`-rc-1`, `-milestone-3`) and an optional snapshot
/// marker (`-SNAPSHOT` or a 14 digit timestamp with optional zone offset).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GradleVersion {
    version: String,
    base: String,
    stage: Option<String>,
    snapshot: Option<String>,
}

impl GradleVersion {
    /// Parse a version identifier such as `1.9` or `1.12-20140327133732+0000`.
    pub fn parse(version: &str) -> HarnessResult<Self> {
        let caps = version_pattern()
            .captures(version)
            .ok_or_else(|| HarnessError::InvalidVersion(version.to_string()))?;

        let stage = match (caps.get(5), caps.get(6)) {
            (Some(name), Some(number)) => Some(format!("{}-{}", name.as_str(), number.as_str())),
            _ => None,
        };

        Ok(Self {
            version: version.to_string(),
            base: caps[1].to_string(),
            stage,
            snapshot: caps.get(8).map(|m| m.as_str().to_string()),
        })
    }

    /// The full version string as given.
    pub fn as_str(&self) -> &str {
        &self.version
    }

    /// The dotted base version (`1.12` for `1.12-20140327133732+0000`).
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Pre-release stage such as `rc-1`, if any.
    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    /// Whether this is a snapshot (nightly) build.
    pub fn is_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }
}

impl fmt::Display for GradleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)
    }
}

impl FromStr for GradleVersion {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for GradleVersion {
    type Error = HarnessError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<GradleVersion> for String {
    fn from(v: GradleVersion) -> Self {
        v.version
    }
}
