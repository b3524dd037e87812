//! Document-conversion capability.

use super::{Tool, ToolDefinition};
use crate::errors::{CapabilityError, StoreError};
use crate::store::ArtifactStore;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Extensions that are already text and are read as-is.
const TEXT_EXTENSIONS: [&str; 3] = ["md", "txt", "json"];

/// Converts an uploaded document to markdown text.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Converts the document at `path`.
    async fn convert(&self, path: &Path) -> Result<String, CapabilityError>;
}

/// Converter that shells out to an external program (`markitdown` by default).
///
/// Text formats are read directly; everything else is passed to the program,
/// whose stdout is the result.
#[derive(Debug, Clone)]
pub struct ProgramConverter {
    store: Arc<ArtifactStore>,
    program: String,
}

impl ProgramConverter {
    /// Creates a converter running `program`.
    #[must_use]
    pub fn new(store: Arc<ArtifactStore>, program: impl Into<String>) -> Self {
        Self {
            store,
            program: program.into(),
        }
    }
}

#[async_trait]
impl DocumentConverter for ProgramConverter {
    async fn convert(&self, path: &Path) -> Result<String, CapabilityError> {
        let target = self.store.resolve(path)?;
        if !target.exists() {
            return Err(StoreError::NotFound(target).into());
        }
        if !target.is_file() {
            return Err(StoreError::NotAFile(target).into());
        }

        let is_text = target
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| TEXT_EXTENSIONS.iter().any(|t| ext.eq_ignore_ascii_case(t)));
        if is_text {
            return Ok(self.store.read_text(&target)?);
        }

        debug!(program = %self.program, path = %target.display(), "converting document");
        let output = tokio::process::Command::new(&self.program)
            .arg(&target)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CapabilityError::Process {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(CapabilityError::Process {
                program: self.program.clone(),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[derive(Deserialize)]
struct ConvertArgs {
    path: PathBuf,
}

/// The `convert_to_markdown` tool.
pub struct ConvertTool {
    converter: Arc<dyn DocumentConverter>,
}

impl ConvertTool {
    /// Wraps a converter.
    #[must_use]
    pub fn new(converter: Arc<dyn DocumentConverter>) -> Self {
        Self { converter }
    }
}

#[async_trait]
impl Tool for ConvertTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("convert_to_markdown")
            .with_description("Convert a document (docx, pdf, pptx, xlsx, html, ...) to markdown text.")
            .with_string_params(&[("path", "Absolute path of the document")])
    }

    async fn call(&self, arguments: serde_json::Value) -> String {
        let args: ConvertArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => return CapabilityError::invalid("convert_to_markdown", e.to_string()).to_string(),
        };
        match self.converter.convert(&args.path).await {
            Ok(text) => text,
            Err(e) => e.to_string(),
        }
    }
}
