//! Error types for the patentflow pipeline.
//!
//! Two layers of errors exist:
//! - [`StoreError`] for artifact-level operations. Capability calls recover
//!   these locally and hand a descriptive status string back to the worker.
//! - [`PipelineError`] for run-level failures that end a run or are surfaced
//!   through the execution bridge.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The main error type for pipeline runs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage ran but its required outputs are absent, empty or malformed.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A stage failed validation on every permitted attempt.
    #[error("Stage '{stage}' failed after {attempts} attempts: {reason}")]
    RetryExhausted {
        /// The failing stage.
        stage: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last validation failure.
        reason: String,
    },

    /// An unrecoverable failure inside a stage invocation.
    #[error("Stage '{stage}' failed upstream: {message}")]
    Upstream {
        /// The stage whose invocation failed.
        stage: String,
        /// Provider or transport message.
        message: String,
    },

    /// The caller requested the run to stop.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// A stage was about to be delegated without one of its declared inputs.
    #[error("Stage '{stage}' is missing input artifact {artifact}")]
    MissingInput {
        /// The stage that would have been delegated.
        stage: String,
        /// Path of the missing artifact.
        artifact: String,
    },

    /// An artifact store operation failed outside of a capability call.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A run is already active on this bridge.
    #[error("A pipeline run is already in progress")]
    RunInProgress,

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Creates an upstream error for a stage.
    #[must_use]
    pub fn upstream(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Returns the stage this error is attributed to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Validation(err) => Some(&err.stage),
            Self::RetryExhausted { stage, .. }
            | Self::Upstream { stage, .. }
            | Self::MissingInput { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Returns true if this error represents a caller-requested stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let kind = match self {
            Self::Validation(_) => "ValidationError",
            Self::RetryExhausted { .. } => "RetryExhaustedError",
            Self::Upstream { .. } => "UpstreamError",
            Self::Cancelled(_) => "CancellationError",
            Self::MissingInput { .. } => "MissingInputError",
            Self::Store(_) => "StoreError",
            Self::Config(_) => "ConfigError",
            Self::RunInProgress => "RunInProgressError",
            Self::Internal(_) => "InternalError",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IoError",
        };

        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Some(stage) = self.stage() {
            map.insert("stage".to_string(), serde_json::json!(stage));
        }
        map
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Raised when a stage's required outputs do not satisfy the registry contract.
#[derive(Debug, Clone, Default, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("Stage '{stage}' produced invalid output: {}", self.reason())]
pub struct ValidationError {
    /// The stage that was validated.
    pub stage: String,
    /// Required outputs that do not exist.
    pub missing: Vec<String>,
    /// Required outputs that exist but are empty.
    pub empty: Vec<String>,
    /// Required outputs that exist but could not be parsed.
    pub malformed: Vec<String>,
    /// Required outputs inherited from an earlier stage that the attempt
    /// left byte-for-byte unchanged.
    #[serde(default)]
    pub unchanged: Vec<String>,
}

impl ValidationError {
    /// Creates an empty validation report for a stage.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Self::default()
        }
    }

    /// Returns true if nothing was flagged.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
            && self.empty.is_empty()
            && self.malformed.is_empty()
            && self.unchanged.is_empty()
    }

    /// Renders every offending artifact into one sentence.
    #[must_use]
    pub fn reason(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing {}", self.missing.join(", ")));
        }
        if !self.empty.is_empty() {
            parts.push(format!("empty {}", self.empty.join(", ")));
        }
        if !self.malformed.is_empty() {
            parts.push(format!("malformed {}", self.malformed.join(", ")));
        }
        if !self.unchanged.is_empty() {
            parts.push(format!("unchanged {}", self.unchanged.join(", ")));
        }
        if parts.is_empty() {
            "no problems found".to_string()
        } else {
            parts.join("; ")
        }
    }
}

/// Errors raised by artifact store operations.
///
/// The `Display` text is what a worker sees when a capability call fails.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The path resolves outside the workspace root.
    #[error("Permission denied: {path} is outside the workspace {root}")]
    PermissionDenied {
        /// The offending path.
        path: PathBuf,
        /// The sandbox root.
        root: PathBuf,
    },

    /// The target does not exist.
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    /// The target exists but is not a regular file.
    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    /// The target exists but is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The target already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(PathBuf),

    /// A JSON write targeted a file without a `.json` suffix.
    #[error("Not a .json file: {0}")]
    NotJson(PathBuf),

    /// A JSON file exists but does not parse.
    #[error("Malformed JSON in {path}: {reason}")]
    MalformedJson {
        /// The file that failed to parse.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// Underlying IO failure.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The path being operated on.
        path: PathBuf,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Wraps an IO error with the path it occurred on.
    #[must_use]
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Returns true for sandbox violations.
    #[must_use]
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Returns true when the target was missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors raised by capability tools.
///
/// Like [`StoreError`], these are rendered to text for the worker and never
/// end a run.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// An artifact store operation failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// The tool was called with arguments it cannot use.
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments {
        /// Tool name.
        tool: String,
        /// What was wrong.
        reason: String,
    },

    /// The capability is not configured in this process.
    #[error("Tool unavailable: {0}")]
    Unavailable(String),

    /// An external program failed.
    #[error("{program} failed: {message}")]
    Process {
        /// Program name.
        program: String,
        /// Exit status and stderr.
        message: String,
    },

    /// An HTTP request failed.
    #[error("Request failed: {0}")]
    Http(String),
}

impl CapabilityError {
    /// Creates an invalid-arguments error.
    #[must_use]
    pub fn invalid(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_error_wraps_store_text() {
        let err: CapabilityError = StoreError::NotFound(PathBuf::from("/ws/a.md")).into();
        assert_eq!(err.to_string(), "Not found: /ws/a.md");
        assert_eq!(
            CapabilityError::invalid("read_file", "missing field `path`").to_string(),
            "Invalid arguments for read_file: missing field `path`"
        );
    }

    #[test]
    fn test_validation_reason_lists_everything() {
        let mut err = ValidationError::new("patent_searcher");
        err.missing.push("prior_art_analysis.md".to_string());
        err.empty.push("claims_writing_style.md".to_string());

        assert!(!err.is_clean());
        assert_eq!(
            err.reason(),
            "missing prior_art_analysis.md; empty claims_writing_style.md"
        );
        assert!(err.to_string().contains("patent_searcher"));
    }

    #[test]
    fn test_validation_clean() {
        let err = ValidationError::new("abstract_writer");
        assert!(err.is_clean());
        assert_eq!(err.reason(), "no problems found");
    }

    #[test]
    fn test_retry_exhausted_names_stage() {
        let err = PipelineError::RetryExhausted {
            stage: "description_writer_part1".to_string(),
            attempts: 5,
            reason: "missing description.md".to_string(),
        };

        assert_eq!(err.stage(), Some("description_writer_part1"));
        assert!(err.to_string().contains("description_writer_part1"));
        assert!(err.to_string().contains("5 attempts"));
    }

    #[test]
    fn test_cancelled_is_distinct() {
        let err = PipelineError::Cancelled("stop".to_string());
        assert!(err.is_cancelled());
        assert!(err.stage().is_none());

        let dict = err.to_dict();
        assert_eq!(dict.get("type").unwrap(), "CancellationError");
    }

    #[test]
    fn test_store_error_messages() {
        let err = StoreError::PermissionDenied {
            path: PathBuf::from("/etc/passwd"),
            root: PathBuf::from("/srv/workspace"),
        };
        assert!(err.is_permission());
        assert!(err.to_string().starts_with("Permission denied"));

        let err = StoreError::NotFound(PathBuf::from("/srv/workspace/x.md"));
        assert!(err.is_not_found());
    }
}
