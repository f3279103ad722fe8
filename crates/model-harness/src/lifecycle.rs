//! Per (case x version) lifecycle: provision, connect, capture, tear down.
//!
//! A [`ModelHarness`] drives each [`ModelCase`] through
//! `Idle -> WorkspaceReady -> SessionEstablished -> SnapshotCaptured -> TornDown`
//! once per requested version. Versions run one after another and report
//! independently.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{HarnessConfig, RepositorySettings};
use crate::distribution::{select_distribution, DistributionSource};
use crate::error::{ErrorKind, HarnessError, HarnessResult};
use crate::obs::{
    emit_case_finished, emit_case_started, emit_distribution_selected, emit_state_transition,
    emit_teardown_failed, CaseSpan,
};
use crate::session::{
    AllModels, GradleProcessConnector, ImportAction, ModelSet, SessionOrchestrator, ToolConnector,
};
use crate::version::{GradleVersion, SUPPORTED_VERSIONS};
use crate::workspace::{
    workspace_name, DirFixtures, FixtureSource, TempRoot, Workspace, WorkspaceProvisioner,
};

/// Where a case currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    WorkspaceReady,
    SessionEstablished,
    SnapshotCaptured,
    TornDown,
}

impl LifecycleState {
    /// Forward steps only; `TornDown` is reachable from every live state.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, WorkspaceReady)
                | (WorkspaceReady, SessionEstablished)
                | (SessionEstablished, SnapshotCaptured)
                | (Idle | WorkspaceReady | SessionEstablished | SnapshotCaptured, TornDown)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::WorkspaceReady => "workspace_ready",
            LifecycleState::SessionEstablished => "session_established",
            LifecycleState::SnapshotCaptured => "snapshot_captured",
            LifecycleState::TornDown => "torn_down",
        };
        f.write_str(name)
    }
}

/// One test case: fixture name plus the model classes it asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCase {
    /// Test name, possibly with a `[n]` parameter suffix
    pub name: String,
    /// Extra project model classes to build
    #[serde(default)]
    pub models: ModelSet,
    /// Also build the tool's default models
    #[serde(default)]
    pub include_default_models: bool,
}

impl ModelCase {
    pub fn new<I>(name: impl Into<String>, models: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<crate::session::ModelClass>,
    {
        Self {
            name: name.into(),
            models: models.into_iter().map(Into::into).collect(),
            include_default_models: false,
        }
    }

    pub fn with_default_models(mut self, include: bool) -> Self {
        self.include_default_models = include;
        self
    }

    /// The import action submitted for this case.
    pub fn action(&self) -> ImportAction {
        ImportAction::new(self.include_default_models).with_models(self.models.iter().cloned())
    }
}

/// A named group of cases, usually loaded from TOML.
///
/// ```toml
/// name = "external-project"
///
/// [[cases]]
/// name = "testSimple"
/// models = ["ExternalProject"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSuite {
    pub name: String,
    #[serde(default)]
    pub cases: Vec<ModelCase>,
}

impl ModelSuite {
    /// Parse a suite; every case name must map to a single workspace directory.
    pub fn from_toml_str(raw: &str) -> HarnessResult<Self> {
        let suite: ModelSuite = toml::from_str(raw)
            .map_err(|e| HarnessError::Configuration(format!("invalid suite definition: {e}")))?;
        for case in &suite.cases {
            workspace_name(&case.name)?;
        }
        Ok(suite)
    }

    pub fn load(path: &Path) -> HarnessResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

/// What an assertion body sees once the snapshot is captured.
pub struct CaseContext<'a> {
    pub case: &'a ModelCase,
    pub version: &'a GradleVersion,
    pub workspace: &'a Workspace,
    pub snapshot: &'a AllModels,
}

/// Why a (case x version) run failed.
#[derive(Debug, thiserror::Error)]
pub enum CaseFailure {
    /// The harness or the tool failed before assertions ran
    #[error(transparent)]
    Harness(#[from] HarnessError),

    /// The assertion body rejected the snapshot
    #[error("assertion failed: {0}")]
    Assertion(String),
}

impl CaseFailure {
    /// Taxonomy kind, `None` for assertion failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CaseFailure::Harness(e) => Some(e.kind()),
            CaseFailure::Assertion(_) => None,
        }
    }
}

/// Result of one case against one version.
#[derive(Debug)]
pub struct VersionRun {
    pub case: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// States visited, starting at `Idle` and always ending at `TornDown`
    pub transitions: Vec<LifecycleState>,
    pub outcome: Result<AllModels, CaseFailure>,
}

impl VersionRun {
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn snapshot(&self) -> Option<&AllModels> {
        self.outcome.as_ref().ok()
    }

    pub fn failure(&self) -> Option<&CaseFailure> {
        self.outcome.as_ref().err()
    }

    pub fn final_state(&self) -> LifecycleState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(LifecycleState::Idle)
    }

    /// Highest state reached before teardown.
    pub fn reached(&self) -> LifecycleState {
        self.transitions
            .iter()
            .rev()
            .copied()
            .find(|s| *s != LifecycleState::TornDown)
            .unwrap_or(LifecycleState::Idle)
    }
}

/// Every run of a suite, in execution order.
#[derive(Debug)]
pub struct SuiteReport {
    pub suite: String,
    pub runs: Vec<VersionRun>,
}

impl SuiteReport {
    pub fn passed_count(&self) -> usize {
        self.runs.iter().filter(|r| r.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.runs.len() - self.passed_count()
    }

    pub fn success(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &VersionRun> {
        self.runs.iter().filter(|r| !r.passed())
    }

    /// Runs for one case, across versions.
    pub fn runs_for<'a>(&'a self, case: &'a str) -> impl Iterator<Item = &'a VersionRun> + 'a {
        self.runs.iter().filter(move |r| r.case == case)
    }
}

struct StateTracker<'a> {
    case: &'a str,
    state: LifecycleState,
    visited: Vec<LifecycleState>,
}

impl<'a> StateTracker<'a> {
    fn new(case: &'a str) -> Self {
        Self {
            case,
            state: LifecycleState::Idle,
            visited: vec![LifecycleState::Idle],
        }
    }

    fn advance(&mut self, next: LifecycleState) {
        if !self.state.can_transition_to(next) {
            warn!(
                "Unexpected lifecycle transition {} -> {} for {}",
                self.state, next, self.case
            );
        }
        emit_state_transition(self.case, self.state, next);
        self.state = next;
        self.visited.push(next);
    }
}

/// Runs model cases against Gradle versions.
#[derive(Clone)]
pub struct ModelHarness {
    repositories: RepositorySettings,
    provisioner: WorkspaceProvisioner,
    orchestrator: SessionOrchestrator,
}

impl ModelHarness {
    pub fn new(
        repositories: RepositorySettings,
        provisioner: WorkspaceProvisioner,
        orchestrator: SessionOrchestrator,
    ) -> Self {
        Self {
            repositories,
            provisioner,
            orchestrator,
        }
    }

    /// Harness backed by real Gradle processes and on-disk fixtures.
    pub fn from_config(config: &HarnessConfig) -> HarnessResult<Self> {
        let connector = Arc::new(GradleProcessConnector::new(config)?);
        let fixtures = Arc::new(DirFixtures::new(&config.fixtures_dir));
        Self::with_connector(config, connector, fixtures)
    }

    /// Harness over the process-wide temp root with a custom connector.
    pub fn with_connector(
        config: &HarnessConfig,
        connector: Arc<dyn ToolConnector>,
        fixtures: Arc<dyn FixtureSource>,
    ) -> HarnessResult<Self> {
        let root = TempRoot::process_wide(&config.temp_root_path())?;
        let orchestrator = SessionOrchestrator::new(connector)
            .with_daemon_max_idle(config.daemon_max_idle)
            .with_extension_script(config.extension_script.clone());
        Ok(Self::new(
            config.repositories.clone(),
            WorkspaceProvisioner::new(root, fixtures),
            orchestrator,
        ))
    }

    pub fn provisioner(&self) -> &WorkspaceProvisioner {
        &self.provisioner
    }

    /// Capture the snapshot for `case` on `version`, no assertions.
    pub async fn run_case(&self, case: &ModelCase, version: &str) -> VersionRun {
        self.run_case_with(case, version, |_| Ok(())).await
    }

    /// Capture the snapshot for `case` on `version` and hand it to `body`.
    ///
    /// The workspace is removed before this returns, whatever happened.
    pub async fn run_case_with<F>(&self, case: &ModelCase, version: &str, body: F) -> VersionRun
    where
        F: FnOnce(&CaseContext<'_>) -> anyhow::Result<()>,
    {
        let _span = CaseSpan::enter(&case.name, version);
        let started_at = Utc::now();
        let clock = Instant::now();
        emit_case_started(&case.name, version, case.models.len());

        let mut tracker = StateTracker::new(&case.name);
        let outcome = self.drive(case, version, &mut tracker, body).await;
        tracker.advance(LifecycleState::TornDown);

        let duration_ms = clock.elapsed().as_millis() as u64;
        emit_case_finished(&case.name, version, duration_ms, outcome.is_ok());

        VersionRun {
            case: case.name.clone(),
            version: version.to_string(),
            started_at,
            duration_ms,
            transitions: tracker.visited,
            outcome,
        }
    }

    /// Run `case` once per version, sequentially.
    pub async fn run_versions(&self, case: &ModelCase, versions: &[&str]) -> Vec<VersionRun> {
        self.run_versions_with(case, versions, |_| Ok(())).await
    }

    /// Run `case` once per version with the same assertion body.
    pub async fn run_versions_with<F>(
        &self,
        case: &ModelCase,
        versions: &[&str],
        body: F,
    ) -> Vec<VersionRun>
    where
        F: Fn(&CaseContext<'_>) -> anyhow::Result<()>,
    {
        let mut runs = Vec::with_capacity(versions.len());
        for version in versions {
            runs.push(self.run_case_with(case, version, &body).await);
        }
        runs
    }

    /// Run `case` against the full static version table.
    pub async fn run_all_versions(&self, case: &ModelCase) -> Vec<VersionRun> {
        self.run_versions(case, SUPPORTED_VERSIONS).await
    }

    /// Run every case of `suite` against every version.
    pub async fn run_suite<F>(&self, suite: &ModelSuite, versions: &[&str], body: F) -> SuiteReport
    where
        F: Fn(&CaseContext<'_>) -> anyhow::Result<()>,
    {
        let mut runs = Vec::with_capacity(suite.cases.len() * versions.len());
        for case in &suite.cases {
            runs.extend(self.run_versions_with(case, versions, &body).await);
        }
        SuiteReport {
            suite: suite.name.clone(),
            runs,
        }
    }

    async fn drive<F>(
        &self,
        case: &ModelCase,
        version: &str,
        tracker: &mut StateTracker<'_>,
        body: F,
    ) -> Result<AllModels, CaseFailure>
    where
        F: FnOnce(&CaseContext<'_>) -> anyhow::Result<()>,
    {
        let version = GradleVersion::parse(version)?;
        let workspace = self.provisioner.provision(&case.name)?;
        tracker.advance(LifecycleState::WorkspaceReady);

        let captured = self.capture(case, &version, &workspace, tracker).await;
        let outcome = match captured {
            Ok(snapshot) => {
                let context = CaseContext {
                    case,
                    version: &version,
                    workspace: &workspace,
                    snapshot: &snapshot,
                };
                match body(&context) {
                    Ok(()) => Ok(snapshot),
                    Err(e) => Err(CaseFailure::Assertion(format!("{e:#}"))),
                }
            }
            Err(e) => Err(CaseFailure::Harness(e)),
        };

        if let Err(e) = workspace.teardown() {
            emit_teardown_failed(&case.name, &e);
        }
        outcome
    }

    async fn capture(
        &self,
        case: &ModelCase,
        version: &GradleVersion,
        workspace: &Workspace,
        tracker: &mut StateTracker<'_>,
    ) -> HarnessResult<AllModels> {
        let source = select_distribution(&self.repositories, version)?;
        let explicit = matches!(source, DistributionSource::Uri(_));
        emit_distribution_selected(version.as_str(), &source, explicit);

        let mut session = self.orchestrator.open(workspace.path(), source).await?;
        tracker.advance(LifecycleState::SessionEstablished);

        let imported = session.import(&case.action()).await;
        if let Err(e) = session.close().await {
            warn!("Failed to close session for {}: {}", case.name, e);
        }
        let snapshot = imported?;
        tracker.advance(LifecycleState::SnapshotCaptured);
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeBehavior, FakeConnector};
    use crate::session::ModelClass;
    use crate::workspace::StaticFixtures;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: Arc<TempRoot>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = Arc::new(TempRoot::reset(dir.path().join("gradleTests")).unwrap());
        Fixture { _dir: dir, root }
    }

    fn harness(fx: &Fixture, connector: Arc<FakeConnector>) -> ModelHarness {
        let fixtures = Arc::new(StaticFixtures::new().with_project(
            "testSimple",
            "apply plugin: 'java'\n",
            "rootProject.name = 'simple'\n",
        ));
        ModelHarness::new(
            RepositorySettings::offline(),
            WorkspaceProvisioner::new(Arc::clone(&fx.root), fixtures),
            SessionOrchestrator::new(connector),
        )
    }

    fn simple_case() -> ModelCase {
        ModelCase::new("testSimple", [ModelClass::EXTERNAL_PROJECT])
    }

    #[test]
    fn test_transitions_are_forward_only() {
        use LifecycleState::*;
        assert!(Idle.can_transition_to(WorkspaceReady));
        assert!(SessionEstablished.can_transition_to(SnapshotCaptured));
        assert!(Idle.can_transition_to(TornDown));
        assert!(!SnapshotCaptured.can_transition_to(WorkspaceReady));
        assert!(!Idle.can_transition_to(SnapshotCaptured));
        assert!(!TornDown.can_transition_to(TornDown));
    }

    #[tokio::test]
    async fn test_successful_run_visits_every_state() {
        let fx = fixture();
        let connector = Arc::new(FakeConnector::new());
        let run = harness(&fx, connector.clone())
            .run_case(&simple_case(), "1.9")
            .await;

        assert!(run.passed(), "{:?}", run.failure());
        assert_eq!(
            run.transitions,
            vec![
                LifecycleState::Idle,
                LifecycleState::WorkspaceReady,
                LifecycleState::SessionEstablished,
                LifecycleState::SnapshotCaptured,
                LifecycleState::TornDown,
            ]
        );
        assert_eq!(connector.closed_count(), 1);
        assert!(!fx.root.path().join("testSimple").exists());
    }

    #[tokio::test]
    async fn test_body_sees_snapshot_and_workspace() {
        let fx = fixture();
        let run = harness(&fx, Arc::new(FakeConnector::new()))
            .run_case_with(&simple_case(), "1.10", |ctx| {
                assert!(ctx.workspace.build_script_path().is_file());
                assert_eq!(ctx.version.as_str(), "1.10");
                anyhow::ensure!(ctx.snapshot.missing(&ctx.case.models).is_empty());
                Ok(())
            })
            .await;
        assert!(run.passed());
    }

    #[tokio::test]
    async fn test_assertion_failure_still_tears_down() {
        let fx = fixture();
        let run = harness(&fx, Arc::new(FakeConnector::new()))
            .run_case_with(&simple_case(), "1.9", |_| anyhow::bail!("wrong project name"))
            .await;

        match run.failure() {
            Some(CaseFailure::Assertion(msg)) => assert!(msg.contains("wrong project name")),
            other => panic!("expected assertion failure, got {other:?}"),
        }
        assert_eq!(run.reached(), LifecycleState::SnapshotCaptured);
        assert_eq!(run.final_state(), LifecycleState::TornDown);
        assert!(!fx.root.path().join("testSimple").exists());
    }

    #[tokio::test]
    async fn test_invalid_version_fails_before_provisioning() {
        let fx = fixture();
        let connector = Arc::new(FakeConnector::new());
        let run = harness(&fx, connector.clone())
            .run_case(&simple_case(), "not-a-version")
            .await;

        assert_eq!(
            run.failure().and_then(CaseFailure::kind),
            Some(ErrorKind::Configuration)
        );
        assert_eq!(
            run.transitions,
            vec![LifecycleState::Idle, LifecycleState::TornDown]
        );
        assert!(connector.connections().is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure_reaches_workspace_ready_only() {
        let fx = fixture();
        let connector = Arc::new(
            FakeConnector::new().with_behavior(FakeBehavior::FailConnect("daemon".into())),
        );
        let run = harness(&fx, connector).run_case(&simple_case(), "1.9").await;

        assert_eq!(
            run.failure().and_then(CaseFailure::kind),
            Some(ErrorKind::ExternalTool)
        );
        assert_eq!(run.reached(), LifecycleState::WorkspaceReady);
        assert!(!fx.root.path().join("testSimple").exists());
    }

    #[tokio::test]
    async fn test_suite_report_counts() {
        let fx = fixture();
        let connector = Arc::new(
            FakeConnector::new()
                .with_version_behavior("1.11", FakeBehavior::FailExecute("boom".into())),
        );
        let suite = ModelSuite {
            name: "external".into(),
            cases: vec![simple_case()],
        };
        let report = harness(&fx, connector)
            .run_suite(&suite, &["1.9", "1.11"], |_| Ok(()))
            .await;

        assert_eq!(report.runs.len(), 2);
        assert_eq!(report.passed_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(!report.success());
        assert_eq!(report.failures().next().unwrap().version, "1.11");
        assert_eq!(report.runs_for("testSimple").count(), 2);
    }

    #[test]
    fn test_suite_from_toml() {
        let suite = ModelSuite::from_toml_str(
            r#"
            name = "external-project"

            [[cases]]
            name = "testSimple"
            models = ["ExternalProject"]

            [[cases]]
            name = "testDefaults[1]"
            include_default_models = true
            "#,
        )
        .unwrap();

        assert_eq!(suite.cases.len(), 2);
        assert!(suite.cases[0]
            .models
            .contains(&ModelClass::external_project()));
        assert!(suite.cases[1].models.is_empty());
        assert!(suite.cases[1].include_default_models);
    }

    #[test]
    fn test_suite_toml_rejects_garbage() {
        let err = ModelSuite::from_toml_str("cases = 3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_suite_toml_rejects_path_like_case_names() {
        for name in ["..", "", "nested/case"] {
            let raw = format!("name = \"bad\"\n\n[[cases]]\nname = {name:?}\n");
            let err = ModelSuite::from_toml_str(&raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{name:?}");
        }
    }

    #[test]
    fn test_case_action_forwards_models() {
        let case = ModelCase::new("t", ["ExternalProject", "Custom"]).with_default_models(true);
        let action = case.action();
        assert_eq!(action.models().len(), 2);
        assert!(action.include_default_models());
    }
}
