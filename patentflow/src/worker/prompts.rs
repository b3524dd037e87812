//! System prompts for stage workers.

use crate::errors::PipelineError;
use crate::registry::StageDef;
use std::path::PathBuf;

const PLANNING_RULES: &str = "\
Plan before acting: call `write_todos` with the full list of steps for this task, \
keep exactly one item `in_progress` while you work on it, and mark items \
`completed` as soon as they are done. Every call replaces the whole list.";

/// Resolves the system prompt for each stage.
///
/// A file `<dir>/<stage>.md` overrides the built-in brief.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    dir: Option<PathBuf>,
}

impl PromptLibrary {
    /// Creates a library with an optional override directory.
    #[must_use]
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Returns the system prompt for a stage.
    pub fn system_prompt(&self, stage: &StageDef) -> Result<String, PipelineError> {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.md", stage.name));
            if path.is_file() {
                let body = std::fs::read_to_string(&path)?;
                return Ok(format!("{}\n\n{PLANNING_RULES}", body.trim_end()));
            }
        }
        Ok(Self::default_prompt(stage))
    }

    fn default_prompt(stage: &StageDef) -> String {
        format!(
            "You are the `{name}` specialist of a patent drafting team. Your job: {summary}.\n\n\
             Work only inside the `{dir}/` directory of the project you are given, reading the \
             input files named in the task and writing exactly these outputs there: {outputs}. \
             Use absolute paths with the file tools. Tool results are plain text; when a tool \
             reports an error, fix the call yourself instead of giving up.\n\n\
             {PLANNING_RULES}\n\n\
             When every output is written, reply with a short summary of what you produced.",
            name = stage.name,
            summary = stage.summary,
            dir = stage.dir,
            outputs = stage.outputs.join(", "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use tempfile::TempDir;

    #[test]
    fn test_default_prompt_names_outputs() {
        let stage = registry::stage("patent_searcher").unwrap();
        let prompt = PromptLibrary::default().system_prompt(stage).unwrap();

        assert!(prompt.contains("`patent_searcher`"));
        assert!(prompt.contains("02_research/"));
        assert!(prompt.contains("claims_writing_style.md"));
        assert!(prompt.contains("write_todos"));
    }

    #[test]
    fn test_override_file_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("claims_writer.md"), "Write claims carefully.\n").unwrap();
        let library = PromptLibrary::new(Some(dir.path().to_path_buf()));

        let claims = library.system_prompt(registry::stage("claims_writer").unwrap()).unwrap();
        assert!(claims.starts_with("Write claims carefully."));

        let other = library.system_prompt(registry::stage("abstract_writer").unwrap()).unwrap();
        assert!(other.contains("`abstract_writer`"));
    }
}
