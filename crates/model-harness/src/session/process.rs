//! Process-backed connector.
//!
//! Installs the requested Gradle distribution into a local cache and runs
//! the `gradle` launcher against the workspace. The import action travels as
//! `-P` properties to the export task registered by the init script, which
//! writes the snapshot as JSON next to the project.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use sha2::{Digest, Sha256};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connector::{ConnectionRequest, ProjectConnection, ToolConnector};
use super::model::{AllModels, ImportAction, EXPORT_TASK, OUTPUT_PROPERTY};
use crate::config::HarnessConfig;
use crate::distribution::{DistributionLocator, DistributionSource};
use crate::error::{HarnessError, HarnessResult};

const INSTALLED_MARKER: &str = ".installed";
const STDERR_TAIL_LINES: usize = 40;

fn launcher_name() -> &'static str {
    if cfg!(windows) {
        "gradle.bat"
    } else {
        "gradle"
    }
}

/// Cache directory for `uri`: `<base>/<archive stem>/<sha256(uri)[..12]>`.
pub fn install_dir_for(base: &Path, uri: &Url) -> PathBuf {
    let stem = uri
        .path_segments()
        .and_then(|segments| segments.last())
        .map(|name| name.trim_end_matches(".zip").to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "distribution".to_string());

    let mut hasher = Sha256::new();
    hasher.update(uri.as_str().as_bytes());
    let hash = hex::encode(hasher.finalize());

    base.join(stem).join(&hash[..12])
}

/// An unpacked Gradle distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradleInstallation {
    home: PathBuf,
}

impl GradleInstallation {
    /// Locate the distribution home (the directory holding `bin/gradle`)
    /// directly under `install_dir`.
    pub fn find(install_dir: &Path) -> HarnessResult<Self> {
        for entry in std::fs::read_dir(install_dir)? {
            let path = entry?.path();
            if path.join("bin").join(launcher_name()).is_file() {
                return Ok(GradleInstallation { home: path });
            }
        }
        Err(HarnessError::Distribution {
            uri: install_dir.display().to_string(),
            reason: "no bin/gradle launcher in unpacked archive".to_string(),
        })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn executable(&self) -> PathBuf {
        self.home.join("bin").join(launcher_name())
    }
}

/// Connector that launches the `gradle` command from an installed distribution.
pub struct GradleProcessConnector {
    distributions_dir: PathBuf,
    gradle_user_home: Option<PathBuf>,
    public: DistributionLocator,
    http_client: reqwest::Client,
}

impl GradleProcessConnector {
    /// Create a connector from harness configuration.
    pub fn new(config: &HarnessConfig) -> HarnessResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("model-harness/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(GradleProcessConnector {
            distributions_dir: config.distributions_dir.clone(),
            gradle_user_home: config.gradle_user_home.clone(),
            public: DistributionLocator::public(),
            http_client,
        })
    }

    /// Resolve a source to a concrete archive URI.
    ///
    /// Version names go through the public repositories.
    pub fn resolve_uri(&self, source: &DistributionSource) -> HarnessResult<Url> {
        match source {
            DistributionSource::Uri(uri) => Ok(uri.clone()),
            DistributionSource::Version(version) => self.public.distribution_for(version),
        }
    }

    /// Install the archive at `uri`, reusing a completed earlier install.
    pub async fn install(&self, uri: &Url) -> HarnessResult<GradleInstallation> {
        let install_dir = install_dir_for(&self.distributions_dir, uri);
        if install_dir.join(INSTALLED_MARKER).is_file() {
            debug!("Reusing installed distribution {:?}", install_dir);
            return GradleInstallation::find(&install_dir);
        }

        info!(uri = %uri, "Installing Gradle distribution");
        if install_dir.exists() {
            tokio::fs::remove_dir_all(&install_dir).await?;
        }
        tokio::fs::create_dir_all(&install_dir).await?;

        let archive = install_dir.join("distribution.zip");
        let bytes = self.fetch(uri).await?;
        tokio::fs::write(&archive, &bytes).await?;

        let target = install_dir.clone();
        let archive_path = archive.clone();
        tokio::task::spawn_blocking(move || unpack(&archive_path, &target))
            .await
            .map_err(|e| HarnessError::Zip(format!("unpack task failed: {e}")))??;

        tokio::fs::remove_file(&archive).await?;
        let installation = GradleInstallation::find(&install_dir)?;
        tokio::fs::write(install_dir.join(INSTALLED_MARKER), uri.as_str()).await?;
        Ok(installation)
    }

    async fn fetch(&self, uri: &Url) -> HarnessResult<Vec<u8>> {
        let distribution_error = |reason: String| HarnessError::Distribution {
            uri: uri.to_string(),
            reason,
        };

        if uri.scheme() == "file" {
            let path = uri
                .to_file_path()
                .map_err(|_| distribution_error("not a local path".to_string()))?;
            return tokio::fs::read(&path)
                .await
                .map_err(|e| distribution_error(e.to_string()));
        }

        let response = self
            .http_client
            .get(uri.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| distribution_error(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| distribution_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

fn unpack(archive: &Path, target: &Path) -> HarnessResult<()> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(target)?;
    Ok(())
}

#[async_trait]
impl ToolConnector for GradleProcessConnector {
    async fn connect(
        &self,
        request: &ConnectionRequest,
    ) -> HarnessResult<Box<dyn ProjectConnection>> {
        if !request.project_dir.is_dir() {
            return Err(HarnessError::Connection(format!(
                "project directory {:?} does not exist",
                request.project_dir
            )));
        }

        let uri = self.resolve_uri(&request.distribution)?;
        let installation = self.install(&uri).await?;
        debug!("Connected to {:?} using {:?}", request.project_dir, installation.home());

        Ok(Box::new(ProcessConnection {
            executable: installation.executable(),
            project_dir: request.project_dir.clone(),
            daemon_max_idle: request.daemon_max_idle,
            gradle_user_home: self.gradle_user_home.clone(),
            output: request
                .project_dir
                .join("build")
                .join("model-harness")
                .join(format!("models-{}.json", Uuid::new_v4())),
            closed: false,
        }))
    }
}

struct ProcessConnection {
    executable: PathBuf,
    project_dir: PathBuf,
    daemon_max_idle: Duration,
    gradle_user_home: Option<PathBuf>,
    output: PathBuf,
    closed: bool,
}

impl ProcessConnection {
    fn command(&self, action: &ImportAction, arguments: &[String]) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("--project-dir")
            .arg(&self.project_dir)
            .arg("--daemon")
            .arg(format!(
                "-Dorg.gradle.daemon.idletimeout={}",
                self.daemon_max_idle.as_millis()
            ));
        if let Some(home) = &self.gradle_user_home {
            cmd.arg("--gradle-user-home").arg(home);
        }
        cmd.args(arguments)
            .args(action.to_properties())
            .arg(format!("-P{}={}", OUTPUT_PROPERTY, self.output.display()))
            .arg(EXPORT_TASK)
            .current_dir(&self.project_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl ProjectConnection for ProcessConnection {
    async fn run_action(
        &mut self,
        action: &ImportAction,
        arguments: &[String],
    ) -> HarnessResult<Option<AllModels>> {
        if self.closed {
            return Err(HarnessError::Connection("connection already closed".to_string()));
        }

        let output = self.command(action, arguments).output().await.map_err(|e| {
            HarnessError::Connection(format!("failed to launch {:?}: {}", self.executable, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(HarnessError::Execution {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: tail,
            });
        }

        match tokio::fs::read(&self.output).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&mut self) -> HarnessResult<()> {
        self.closed = true;
        match tokio::fs::remove_file(&self.output).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Could not remove snapshot file {:?}: {}", self.output, e);
                Err(e.into())
            }
        }
    }
}
