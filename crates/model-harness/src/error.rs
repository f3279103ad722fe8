//! Error taxonomy for the model harness

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a [`HarnessError`].
///
/// Reports group failures by kind so an environment fault (tool could not
/// start) is never confused with a harness bug (contract violation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Static misconfiguration: malformed URL or version.
    Configuration,
    /// Missing or unreadable fixture resource.
    Fixture,
    /// Distribution fetch, daemon startup or action failure.
    ExternalTool,
    /// The harness broke one of its own contracts.
    ContractViolation,
    /// Local filesystem failure outside fixtures.
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Fixture => "fixture",
            ErrorKind::ExternalTool => "external_tool",
            ErrorKind::ContractViolation => "contract_violation",
            ErrorKind::Io => "io",
        }
    }
}

/// Errors that can occur while running a harness case
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Malformed repository URL or distribution URI
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Version string does not follow the Gradle version grammar
    #[error("invalid Gradle version: {0}")]
    InvalidVersion(String),

    /// Fixture resource missing or unreadable
    #[error("fixture {file} for test '{test}' could not be loaded from {path:?}: {reason}")]
    Fixture {
        test: String,
        file: String,
        path: PathBuf,
        reason: String,
    },

    /// Could not establish a connection to the build tool
    #[error("connection to Gradle failed: {0}")]
    Connection(String),

    /// Distribution could not be fetched or installed
    #[error("distribution {uri} unavailable: {reason}")]
    Distribution { uri: String, reason: String },

    /// Import action failed inside the build tool
    #[error("import action failed (exit code {exit_code}): {stderr}")]
    Execution { exit_code: i32, stderr: String },

    /// Internal harness contract violated (missing snapshot, missing init script)
    #[error("harness contract violated: {0}")]
    ContractViolation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error while downloading a distribution
    #[error("HTTP error: {0}")]
    Http(String),

    /// Distribution archive could not be unpacked
    #[error("archive error: {0}")]
    Zip(String),
}

impl HarnessError {
    /// Classify this error into the reporting taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::Configuration(_) | HarnessError::InvalidVersion(_) => {
                ErrorKind::Configuration
            }
            HarnessError::Fixture { .. } => ErrorKind::Fixture,
            HarnessError::Connection(_)
            | HarnessError::Distribution { .. }
            | HarnessError::Execution { .. }
            | HarnessError::Http(_)
            | HarnessError::Zip(_) => ErrorKind::ExternalTool,
            HarnessError::ContractViolation(_) => ErrorKind::ContractViolation,
            HarnessError::Io(_) | HarnessError::Json(_) => ErrorKind::Io,
        }
    }
}

impl From<reqwest::Error> for HarnessError {
    fn from(err: reqwest::Error) -> Self {
        HarnessError::Http(err.to_string())
    }
}

impl From<zip::result::ZipError> for HarnessError {
    fn from(err: zip::result::ZipError) -> Self {
        HarnessError::Zip(err.to_string())
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HarnessError::Configuration("bad url".to_string());
        assert!(err.to_string().contains("configuration error"));

        let err = HarnessError::Execution {
            exit_code: 1,
            stderr: "BUILD FAILED".to_string(),
        };
        assert!(err.to_string().contains("exit code 1"));
        assert!(err.to_string().contains("BUILD FAILED"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            HarnessError::InvalidVersion("x".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            HarnessError::Fixture {
                test: "t".into(),
                file: "build.gradle".into(),
                path: PathBuf::from("/t/build.gradle"),
                reason: "not found".into(),
            }
            .kind(),
            ErrorKind::Fixture
        );
        assert_eq!(
            HarnessError::Connection("refused".into()).kind(),
            ErrorKind::ExternalTool
        );
        assert_eq!(
            HarnessError::ContractViolation("no snapshot".into()).kind(),
            ErrorKind::ContractViolation
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(HarnessError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_fixture_error_names_file_and_test() {
        let err = HarnessError::Fixture {
            test: "testSimple".into(),
            file: "settings.gradle".into(),
            path: PathBuf::from("/fixtures/testSimple/settings.gradle"),
            reason: "No such file".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("testSimple"));
        assert!(msg.contains("settings.gradle"));
    }
}
