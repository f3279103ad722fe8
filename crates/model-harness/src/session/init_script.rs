//! Init script generation.
//!
//! Every run gets a fresh script registering the model builders (built-in
//! ones plus the extension under test) and the export task that writes the
//! requested models as JSON. The file is removed when the `InitScript` drops.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Gradle command-line option that loads an init script.
pub const INIT_SCRIPT_OPTION: &str = "--init-script";

const EXPORT_TEMPLATE: &str = include_str!("export.gradle");
const EXTENSION_MARKER: &str = "// @extension@";

/// A generated init script on disk.
#[derive(Debug)]
pub struct InitScript {
    file: NamedTempFile,
}

impl InitScript {
    /// Render the script text, inlining `extension` at the builder hook.
    pub fn render(extension: Option<&str>) -> String {
        EXPORT_TEMPLATE.replacen(EXTENSION_MARKER, extension.unwrap_or(""), 1)
    }

    /// Write a fresh script, reading the extension source from `extension_path`.
    pub fn generate(extension_path: Option<&Path>) -> HarnessResult<Self> {
        let extension = match extension_path {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
                HarnessError::Configuration(format!(
                    "extension script {:?} unreadable: {}",
                    path, e
                ))
            })?),
            None => None,
        };

        let mut file = tempfile::Builder::new()
            .prefix("model-harness-init")
            .suffix(".gradle")
            .tempfile()?;
        file.write_all(Self::render(extension.as_deref()).as_bytes())?;
        file.flush()?;

        debug!("Generated init script {:?}", file.path());
        Ok(InitScript { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// `--init-script <absolute path>`
    pub fn command_line_args(&self) -> Vec<String> {
        vec![
            INIT_SCRIPT_OPTION.to_string(),
            self.path().to_string_lossy().to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_extension() {
        let script = InitScript::render(None);
        assert!(script.contains("task('modelHarnessExport')"));
        assert!(script.contains("modelHarnessBuilders['ExternalProject']"));
        assert!(!script.contains(EXTENSION_MARKER));
    }

    #[test]
    fn test_render_inlines_extension_before_export_task() {
        let ext = "modelHarnessBuilders['BuildScriptClasspathModel'] = { p -> [:] }";
        let script = InitScript::render(Some(ext));
        let ext_at = script.find(ext).unwrap();
        let task_at = script.find("task('modelHarnessExport')").unwrap();
        assert!(ext_at < task_at);
    }

    #[test]
    fn test_generate_writes_file_and_removes_on_drop() {
        let script = InitScript::generate(None).unwrap();
        let path = script.path().to_path_buf();
        assert!(path.is_absolute());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("modelHarnessExport"));

        let args = script.command_line_args();
        assert_eq!(args[0], "--init-script");
        assert_eq!(args[1], path.to_string_lossy());

        drop(script);
        assert!(!path.exists());
    }

    #[test]
    fn test_unreadable_extension_is_configuration_error() {
        let err =
            InitScript::generate(Some(Path::new("/definitely/not/here.gradle"))).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
    }
}
