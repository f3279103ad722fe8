//! Model Harness - version-parameterized Gradle model-builder testing
//!
//! Drives a Gradle model-builder extension against every version in a fixed
//! table:
//! - Resolves which Gradle distribution to fetch for a version
//! - Provisions an isolated workspace per test case from fixture files
//! - Submits an import action through a tool connection and captures the
//!   resulting model snapshot
//! - Tears the workspace down whether the case passed or failed

pub mod config;
pub mod distribution;
pub mod error;
pub mod fakes;
pub mod lifecycle;
pub mod obs;
pub mod session;
pub mod telemetry;
pub mod version;
pub mod workspace;

// Re-export key types
pub use config::{HarnessConfig, RepositorySettings};
pub use distribution::{DistributionLocator, DistributionSource};
pub use error::{ErrorKind, HarnessError, HarnessResult};
pub use lifecycle::{
    CaseContext, CaseFailure, LifecycleState, ModelCase, ModelHarness, ModelSuite, SuiteReport,
    VersionRun,
};
pub use obs::{
    emit_case_finished, emit_case_started, emit_distribution_selected, emit_state_transition,
    emit_teardown_failed, CaseSpan,
};
pub use session::{
    AllModels, ConnectionRequest, GradleProcessConnector, ImportAction, InitScript, ModelClass,
    ModelSet, ProjectConnection, SessionOrchestrator, ToolConnector, ToolSession,
};
pub use telemetry::{init_test_tracing, init_tracing, LogFormat};
pub use version::{GradleVersion, SUPPORTED_VERSIONS};
pub use workspace::{
    strip_parameter_suffix, workspace_name, DirFixtures, FixtureSource, StaticFixtures, TempRoot,
    Workspace, WorkspaceProvisioner,
};
