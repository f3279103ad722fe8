//! Workspace provisioning: shared temp root, fixtures, per-case directories.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Build script copied into every workspace.
pub const BUILD_SCRIPT_NAME: &str = "build.gradle";
/// Settings file copied into every workspace.
pub const SETTINGS_FILE_NAME: &str = "settings.gradle";

fn parameter_suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.*)\[(\d*)\]$").expect("suffix pattern is a valid regex"))
}

/// Strip a trailing parameter index: `foo[2]` becomes `foo`.
///
/// Names without a bracket suffix are returned unchanged.
pub fn strip_parameter_suffix(test_name: &str) -> &str {
    parameter_suffix_pattern()
        .captures(test_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(test_name)
}

/// Workspace directory name for `test_name`: suffix stripped, and exactly
/// one plain path segment so it can only ever address a child of the root.
pub fn workspace_name(test_name: &str) -> HarnessResult<&str> {
    let name = strip_parameter_suffix(test_name);
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(segment)), None) if segment == OsStr::new(name) => Ok(name),
        _ => Err(HarnessError::Configuration(format!(
            "test name {test_name:?} is not a single directory name"
        ))),
    }
}

// ---------------------------------------------------------------------------
// TempRoot
// ---------------------------------------------------------------------------

static PROCESS_ROOT: Mutex<Option<Arc<TempRoot>>> = Mutex::new(None);

/// Top-level directory all workspaces live under.
///
/// Created empty at first use: stale contents from an earlier process are
/// removed. Never deleted afterwards.
#[derive(Debug)]
pub struct TempRoot {
    path: PathBuf,
}

impl TempRoot {
    /// Wipe `path` and recreate it empty.
    pub fn reset(path: impl Into<PathBuf>) -> HarnessResult<Self> {
        let path = path.into();
        match std::fs::remove_dir_all(&path) {
            Ok(()) => debug!("Removed stale temp root {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        std::fs::create_dir_all(&path)?;
        Ok(TempRoot { path })
    }

    /// The process-wide temp root, reset on the first call only.
    ///
    /// Later calls return the same root; a differing `path` is ignored with
    /// a warning. Not safe against other processes sharing the directory.
    pub fn process_wide(path: &Path) -> HarnessResult<Arc<TempRoot>> {
        let mut guard = PROCESS_ROOT.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(root) = guard.as_ref() {
            if root.path != path {
                warn!(
                    "Temp root already initialised at {:?}, ignoring {:?}",
                    root.path, path
                );
            }
            return Ok(Arc::clone(root));
        }

        let root = Arc::new(TempRoot::reset(path)?);
        info!("Initialised temp root {:?}", root.path);
        *guard = Some(Arc::clone(&root));
        Ok(root)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Source of the descriptor files for a test.
pub trait FixtureSource: Send + Sync {
    /// Load `file_name` for the (already stripped) `test_name`.
    fn load(&self, test_name: &str, file_name: &str) -> HarnessResult<String>;
}

/// Fixtures laid out on disk as `<root>/<test>/<file>`.
#[derive(Debug, Clone)]
pub struct DirFixtures {
    root: PathBuf,
}

impl DirFixtures {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FixtureSource for DirFixtures {
    fn load(&self, test_name: &str, file_name: &str) -> HarnessResult<String> {
        let path = self.root.join(test_name).join(file_name);
        std::fs::read_to_string(&path).map_err(|e| HarnessError::Fixture {
            test: test_name.to_string(),
            file: file_name.to_string(),
            path,
            reason: e.to_string(),
        })
    }
}

/// In-memory fixtures, for embedding descriptor files in a test binary.
#[derive(Debug, Clone, Default)]
pub struct StaticFixtures {
    files: HashMap<(String, String), String>,
}

impl StaticFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one fixture file.
    pub fn with_file(mut self, test_name: &str, file_name: &str, content: &str) -> Self {
        self.files.insert(
            (test_name.to_string(), file_name.to_string()),
            content.to_string(),
        );
        self
    }

    /// Add a build script and settings file for `test_name`.
    pub fn with_project(self, test_name: &str, build_script: &str, settings: &str) -> Self {
        self.with_file(test_name, BUILD_SCRIPT_NAME, build_script)
            .with_file(test_name, SETTINGS_FILE_NAME, settings)
    }
}

impl FixtureSource for StaticFixtures {
    fn load(&self, test_name: &str, file_name: &str) -> HarnessResult<String> {
        self.files
            .get(&(test_name.to_string(), file_name.to_string()))
            .cloned()
            .ok_or_else(|| HarnessError::Fixture {
                test: test_name.to_string(),
                file: file_name.to_string(),
                path: PathBuf::from(format!("/{test_name}/{file_name}")),
                reason: "not bundled".to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// A provisioned per-case project directory.
///
/// Deleted by [`Workspace::teardown`], or on drop if teardown was never
/// called, so the directory disappears on every exit path.
#[derive(Debug)]
pub struct Workspace {
    name: String,
    path: PathBuf,
    removed: bool,
}

impl Workspace {
    /// Stripped test name this workspace was provisioned for.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn build_script_path(&self) -> PathBuf {
        self.path.join(BUILD_SCRIPT_NAME)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.path.join(SETTINGS_FILE_NAME)
    }

    /// Delete the workspace tree.
    pub fn teardown(mut self) -> HarnessResult<()> {
        self.removed = true;
        remove_tree(&self.path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = remove_tree(&self.path) {
            warn!("Failed to remove workspace {:?}: {}", self.path, e);
        }
    }
}

fn remove_tree(path: &Path) -> HarnessResult<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Creates workspaces under an injected temp root from a fixture source.
#[derive(Clone)]
pub struct WorkspaceProvisioner {
    root: Arc<TempRoot>,
    fixtures: Arc<dyn FixtureSource>,
}

impl WorkspaceProvisioner {
    pub fn new(root: Arc<TempRoot>, fixtures: Arc<dyn FixtureSource>) -> Self {
        Self { root, fixtures }
    }

    pub fn root(&self) -> &TempRoot {
        &self.root
    }

    /// Provision the workspace for `test_name`.
    ///
    /// Any leftover directory with the same name is wiped first. A missing
    /// fixture fails the call and leaves no directory behind. Names that are
    /// not a single directory segment are rejected before any filesystem
    /// access.
    pub fn provision(&self, test_name: &str) -> HarnessResult<Workspace> {
        let name = workspace_name(test_name)?.to_string();
        let path = self.root.path().join(&name);

        remove_tree(&path)?;
        std::fs::create_dir_all(&path)?;
        let workspace = Workspace {
            name,
            path,
            removed: false,
        };

        for file_name in [BUILD_SCRIPT_NAME, SETTINGS_FILE_NAME] {
            let content = self.fixtures.load(&workspace.name, file_name)?;
            std::fs::write(workspace.path.join(file_name), content)?;
        }

        debug!("Provisioned workspace {:?}", workspace.path);
        Ok(workspace)
    }
}
