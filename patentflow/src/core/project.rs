//! Project identity and on-disk location.

use crate::errors::PipelineError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static PROJECT_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").ok());

/// One pipeline run's project: an identifier and its root directory.
///
/// Created once at run start and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    id: String,
    root: PathBuf,
}

impl Project {
    /// Creates a project rooted at `<workspace_root>/temp_<id>`.
    pub fn new(id: impl Into<String>, workspace_root: &Path) -> Result<Self, PipelineError> {
        let id = id.into();
        let valid = PROJECT_ID
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&id));
        if !valid {
            return Err(PipelineError::Config(format!(
                "Invalid project id '{id}': use 1-64 letters, digits, '_' or '-'"
            )));
        }

        let root = workspace_root.join(format!("temp_{id}"));
        Ok(Self { id, root })
    }

    /// Creates a project whose id is the current Unix timestamp.
    pub fn from_timestamp(workspace_root: &Path) -> Result<Self, PipelineError> {
        Self::new(chrono::Utc::now().timestamp().to_string(), workspace_root)
    }

    /// Returns the project id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the project root (`temp_<id>`).
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the absolute path of a stage working directory.
    #[must_use]
    pub fn stage_dir(&self, dir: &str) -> PathBuf {
        self.root.join(dir)
    }

    /// Returns the absolute path of an artifact.
    #[must_use]
    pub fn artifact_path(&self, dir: &str, file: &str) -> PathBuf {
        self.root.join(dir).join(file)
    }
}
