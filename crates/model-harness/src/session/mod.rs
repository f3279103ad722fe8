//! Tool sessions: connect to Gradle, run the import action, capture models.
//!
//! - [`model`]        : `ModelClass`, `ImportAction`, `AllModels`
//! - [`connector`]    : `ToolConnector` / `ProjectConnection` client boundary
//! - [`init_script`]  : per-run init script generation
//! - [`process`]      : `GradleProcessConnector` backed by the gradle launcher
//! - [`orchestrator`] : `SessionOrchestrator`, scoped `ToolSession`

pub mod connector;
pub mod init_script;
pub mod model;
pub mod orchestrator;
pub mod process;

pub use connector::{ConnectionRequest, ProjectConnection, ToolConnector};
pub use init_script::{InitScript, INIT_SCRIPT_OPTION};
pub use model::{AllModels, ExternalProject, ImportAction, ModelClass, ModelSet};
pub use orchestrator::{SessionOrchestrator, ToolSession};
pub use process::{GradleInstallation, GradleProcessConnector};
