//! Session orchestration: one connection, one import action, one snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::connector::{ConnectionRequest, ProjectConnection, ToolConnector};
use super::init_script::InitScript;
use super::model::{AllModels, ImportAction};
use crate::config::DEFAULT_DAEMON_MAX_IDLE;
use crate::distribution::DistributionSource;
use crate::error::{HarnessError, HarnessResult};

/// Opens tool sessions through a [`ToolConnector`].
#[derive(Clone)]
pub struct SessionOrchestrator {
    connector: Arc<dyn ToolConnector>,
    daemon_max_idle: Duration,
    extension_script: Option<PathBuf>,
}

impl SessionOrchestrator {
    pub fn new(connector: Arc<dyn ToolConnector>) -> Self {
        Self {
            connector,
            daemon_max_idle: DEFAULT_DAEMON_MAX_IDLE,
            extension_script: None,
        }
    }

    pub fn with_daemon_max_idle(mut self, idle: Duration) -> Self {
        self.daemon_max_idle = idle;
        self
    }

    pub fn with_extension_script(mut self, path: Option<PathBuf>) -> Self {
        self.extension_script = path;
        self
    }

    /// Connect to the project at `project_dir`.
    pub async fn open(
        &self,
        project_dir: &Path,
        distribution: DistributionSource,
    ) -> HarnessResult<ToolSession> {
        let request = ConnectionRequest {
            project_dir: project_dir.to_path_buf(),
            distribution,
            daemon_max_idle: self.daemon_max_idle,
        };
        let connection = self.connector.connect(&request).await?;
        debug!("Session established for {:?}", project_dir);

        Ok(ToolSession {
            project_dir: request.project_dir,
            connection,
            extension_script: self.extension_script.clone(),
            closed: false,
        })
    }

    /// Open a session, run `action`, close the session.
    ///
    /// The session is closed on every path. A close failure after a
    /// successful action is logged, not returned.
    pub async fn run(
        &self,
        project_dir: &Path,
        distribution: DistributionSource,
        action: &ImportAction,
    ) -> HarnessResult<AllModels> {
        let mut session = self.open(project_dir, distribution).await?;
        let result = session.import(action).await;
        if let Err(e) = session.close().await {
            warn!("Failed to close session for {:?}: {}", project_dir, e);
        }
        result
    }
}

/// A live connection bound to one workspace.
///
/// Must be finished with [`ToolSession::close`]; dropping an open session
/// only logs, since the connection cannot be released synchronously.
pub struct ToolSession {
    project_dir: PathBuf,
    connection: Box<dyn ProjectConnection>,
    extension_script: Option<PathBuf>,
    closed: bool,
}

impl ToolSession {
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Generate a fresh init script and execute `action` with it.
    pub async fn import(&mut self, action: &ImportAction) -> HarnessResult<AllModels> {
        if self.closed {
            return Err(HarnessError::ContractViolation(
                "import on a closed session".to_string(),
            ));
        }

        let init_script = InitScript::generate(self.extension_script.as_deref())?;
        if !init_script.path().is_file() {
            return Err(HarnessError::ContractViolation(format!(
                "init script {:?} was not generated",
                init_script.path()
            )));
        }

        debug!(models = ?action.models(), "Running import action");
        let snapshot = self
            .connection
            .run_action(action, &init_script.command_line_args())
            .await?;

        snapshot.ok_or_else(|| {
            HarnessError::ContractViolation("import action returned no snapshot".to_string())
        })
    }

    /// Release the connection.
    pub async fn close(mut self) -> HarnessResult<()> {
        self.closed = true;
        self.connection.close().await
    }
}

impl Drop for ToolSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Tool session for {:?} dropped without close", self.project_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeBehavior, FakeConnector};
    use crate::session::model::ModelClass;
    use crate::version::GradleVersion;

    fn action() -> ImportAction {
        ImportAction::new(false).with_models([ModelClass::external_project()])
    }

    fn by_name() -> DistributionSource {
        DistributionSource::Version(GradleVersion::parse("1.9").unwrap())
    }

    #[tokio::test]
    async fn test_run_returns_snapshot_and_closes() {
        let connector = Arc::new(FakeConnector::new());
        let orchestrator = SessionOrchestrator::new(connector.clone());

        let snapshot = orchestrator
            .run(Path::new("/ws/testSimple"), by_name(), &action())
            .await
            .unwrap();

        assert!(snapshot.get(&ModelClass::external_project()).is_some());
        assert_eq!(connector.connections().len(), 1);
        assert_eq!(connector.closed_count(), 1);

        let request = &connector.connections()[0];
        assert_eq!(request.project_dir, PathBuf::from("/ws/testSimple"));
        assert_eq!(request.daemon_max_idle, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_init_script_passed_as_argument() {
        let connector = Arc::new(FakeConnector::new());
        let orchestrator = SessionOrchestrator::new(connector.clone());
        orchestrator
            .run(Path::new("/ws/a"), by_name(), &action())
            .await
            .unwrap();

        let actions = connector.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].arguments[0], "--init-script");
        assert!(actions[0].arguments[1].ends_with(".gradle"));
        assert!(actions[0].init_script_existed);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_contract_violation() {
        let connector = Arc::new(FakeConnector::new().with_behavior(FakeBehavior::NoSnapshot));
        let orchestrator = SessionOrchestrator::new(connector.clone());

        let err = orchestrator
            .run(Path::new("/ws/a"), by_name(), &action())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::ContractViolation(_)));
        assert_eq!(connector.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_execution_failure_still_closes() {
        let connector =
            Arc::new(FakeConnector::new().with_behavior(FakeBehavior::FailExecute("boom".into())));
        let orchestrator = SessionOrchestrator::new(connector.clone());

        let err = orchestrator
            .run(Path::new("/ws/a"), by_name(), &action())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Execution { .. }));
        assert_eq!(connector.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_has_nothing_to_close() {
        let connector = Arc::new(
            FakeConnector::new().with_behavior(FakeBehavior::FailConnect("refused".into())),
        );
        let orchestrator = SessionOrchestrator::new(connector.clone());

        let err = orchestrator
            .run(Path::new("/ws/a"), by_name(), &action())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Connection(_)));
        assert_eq!(connector.closed_count(), 0);
        assert!(connector.actions().is_empty());
    }

    #[tokio::test]
    async fn test_extension_script_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let ext = dir.path().join("builders.gradle");
        std::fs::write(
            &ext,
            "modelHarnessBuilders['IdeaProject'] = { project -> [name: project.name] }\n",
        )
        .unwrap();

        let connector = Arc::new(FakeConnector::new());
        let orchestrator =
            SessionOrchestrator::new(connector.clone()).with_extension_script(Some(ext));
        let mut session = orchestrator.open(Path::new("/ws/a"), by_name()).await.unwrap();
        session.import(&action()).await.unwrap();
        session.close().await.unwrap();

        let actions = connector.actions();
        let script = actions[0].init_script_text.as_deref().unwrap();
        assert!(script.contains("modelHarnessBuilders['IdeaProject']"));
        assert!(script.contains("task('modelHarnessExport')"));
        assert!(!script.contains("// @extension@"));
        assert_eq!(connector.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_without_extension_only_builtin_builders() {
        let connector = Arc::new(FakeConnector::new());
        let orchestrator = SessionOrchestrator::new(connector.clone());
        orchestrator
            .run(Path::new("/ws/a"), by_name(), &action())
            .await
            .unwrap();

        let actions = connector.actions();
        let script = actions[0].init_script_text.as_deref().unwrap();
        assert!(script.contains("modelHarnessBuilders['ExternalProject']"));
        assert!(!script.contains("IdeaProject"));
    }
}
