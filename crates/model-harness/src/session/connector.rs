//! Client boundary to the build tool.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use super::model::{AllModels, ImportAction};
use crate::distribution::DistributionSource;
use crate::error::HarnessResult;

/// Everything needed to open a connection for one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    /// Project root the connection is bound to
    pub project_dir: PathBuf,
    /// Explicit archive or version name
    pub distribution: DistributionSource,
    /// Idle time after which spawned daemons exit
    pub daemon_max_idle: Duration,
}

/// Opens connections to the build tool.
#[async_trait]
pub trait ToolConnector: Send + Sync {
    /// Resolve the distribution and connect to the project in `request`.
    async fn connect(&self, request: &ConnectionRequest)
        -> HarnessResult<Box<dyn ProjectConnection>>;
}

/// A live connection to one project.
#[async_trait]
pub trait ProjectConnection: Send {
    /// Execute `action` to completion.
    ///
    /// `Ok(None)` means the tool ran but produced no snapshot.
    async fn run_action(
        &mut self,
        action: &ImportAction,
        arguments: &[String],
    ) -> HarnessResult<Option<AllModels>>;

    /// Release the connection. Called exactly once, on every exit path.
    async fn close(&mut self) -> HarnessResult<()>;
}
