//! In-memory fakes for the tool boundary (testing only)
//!
//! `FakeConnector` satisfies the `ToolConnector` contract without a Gradle
//! installation. It records every connection request and action, and can be
//! scripted to fail, globally or for a single version.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::distribution::DistributionSource;
use crate::error::{HarnessError, HarnessResult};
use crate::session::connector::{ConnectionRequest, ProjectConnection, ToolConnector};
use crate::session::init_script::INIT_SCRIPT_OPTION;
use crate::session::model::{AllModels, ImportAction, ModelClass, ModelSet};

/// How the fake responds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Return a model for every requested class
    Succeed,
    /// Run, but produce no snapshot
    NoSnapshot,
    /// Refuse the connection
    FailConnect(String),
    /// Connect, then fail the action
    FailExecute(String),
}

/// One executed import action as the fake saw it.
#[derive(Debug, Clone)]
pub struct RecordedAction {
    pub project_dir: PathBuf,
    pub models: ModelSet,
    pub include_default_models: bool,
    pub arguments: Vec<String>,
    /// Whether the `--init-script` file existed while the action ran
    pub init_script_existed: bool,
    /// Contents of the `--init-script` file while the action ran
    pub init_script_text: Option<String>,
    /// Sorted file names present in the project dir while the action ran
    pub workspace_files: Vec<String>,
}

#[derive(Debug, Default)]
struct Shared {
    actions: Mutex<Vec<RecordedAction>>,
    closed: AtomicUsize,
}

/// Scriptable in-memory connector.
#[derive(Debug)]
pub struct FakeConnector {
    behavior: FakeBehavior,
    per_version: HashMap<String, FakeBehavior>,
    connections: Mutex<Vec<ConnectionRequest>>,
    shared: Arc<Shared>,
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            behavior: FakeBehavior::Succeed,
            per_version: HashMap::new(),
            connections: Mutex::new(Vec::new()),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Default behavior for every version.
    pub fn with_behavior(mut self, behavior: FakeBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Behavior for one version only.
    pub fn with_version_behavior(mut self, version: &str, behavior: FakeBehavior) -> Self {
        self.per_version.insert(version.to_string(), behavior);
        self
    }

    /// Connection requests received, in order.
    pub fn connections(&self) -> Vec<ConnectionRequest> {
        self.connections.lock().unwrap().clone()
    }

    /// Actions executed, in order.
    pub fn actions(&self) -> Vec<RecordedAction> {
        self.shared.actions.lock().unwrap().clone()
    }

    /// Number of connections closed.
    pub fn closed_count(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, source: &DistributionSource) -> FakeBehavior {
        let matched = self.per_version.iter().find(|(version, _)| match source {
            DistributionSource::Version(v) => v.as_str() == version.as_str(),
            DistributionSource::Uri(uri) => uri.as_str().contains(&format!("-{version}-")),
        });
        matched
            .map(|(_, behavior)| behavior.clone())
            .unwrap_or_else(|| self.behavior.clone())
    }
}

#[async_trait]
impl ToolConnector for FakeConnector {
    async fn connect(
        &self,
        request: &ConnectionRequest,
    ) -> HarnessResult<Box<dyn ProjectConnection>> {
        self.connections.lock().unwrap().push(request.clone());

        let behavior = self.behavior_for(&request.distribution);
        if let FakeBehavior::FailConnect(reason) = &behavior {
            return Err(HarnessError::Connection(reason.clone()));
        }

        let gradle_version = match &request.distribution {
            DistributionSource::Version(v) => Some(v.to_string()),
            DistributionSource::Uri(_) => None,
        };

        Ok(Box::new(FakeConnection {
            project_dir: request.project_dir.clone(),
            gradle_version,
            behavior,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct FakeConnection {
    project_dir: PathBuf,
    gradle_version: Option<String>,
    behavior: FakeBehavior,
    shared: Arc<Shared>,
}

impl FakeConnection {
    fn snapshot(&self, action: &ImportAction) -> AllModels {
        let project_name = self
            .project_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut snapshot = AllModels {
            gradle_version: self.gradle_version.clone(),
            ..AllModels::default()
        };
        for class in action.models() {
            let value = if class.as_str() == ModelClass::EXTERNAL_PROJECT {
                json!({
                    "name": project_name,
                    "path": ":",
                    "group": "",
                    "version": "unspecified",
                    "projectDir": self.project_dir.display().to_string(),
                    "buildDir": self.project_dir.join("build").display().to_string(),
                    "children": [],
                })
            } else {
                json!({ "class": class.as_str() })
            };
            snapshot.models.insert(class.clone(), value);
        }
        if action.include_default_models() {
            snapshot.models.insert(
                ModelClass::new(ModelClass::GRADLE_BUILD),
                json!({ "rootProject": project_name, "projects": [":"] }),
            );
        }
        snapshot
    }
}

#[async_trait]
impl ProjectConnection for FakeConnection {
    async fn run_action(
        &mut self,
        action: &ImportAction,
        arguments: &[String],
    ) -> HarnessResult<Option<AllModels>> {
        let init_script_text = arguments
            .iter()
            .position(|a| a == INIT_SCRIPT_OPTION)
            .and_then(|i| arguments.get(i + 1))
            .and_then(|p| std::fs::read_to_string(p).ok());
        let init_script_existed = init_script_text.is_some();

        let mut workspace_files: Vec<String> = std::fs::read_dir(&self.project_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        workspace_files.sort();

        self.shared.actions.lock().unwrap().push(RecordedAction {
            project_dir: self.project_dir.clone(),
            models: action.models().clone(),
            include_default_models: action.include_default_models(),
            arguments: arguments.to_vec(),
            init_script_existed,
            init_script_text,
            workspace_files,
        });

        match &self.behavior {
            FakeBehavior::FailExecute(reason) => Err(HarnessError::Execution {
                exit_code: 1,
                stderr: reason.clone(),
            }),
            FakeBehavior::NoSnapshot => Ok(None),
            _ => Ok(Some(self.snapshot(action))),
        }
    }

    async fn close(&mut self) -> HarnessResult<()> {
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
