//! Delegation instructions.

use crate::core::Project;
use crate::registry::StageDef;
use std::fmt::Write as _;
use std::path::Path;

/// Builds the natural-language task for one stage attempt.
///
/// Every input and output is named by absolute path. A retry carries the
/// previous attempt's validation reason.
pub(crate) fn delegation(
    stage: &StageDef,
    project: &Project,
    source: &Path,
    attempt: u32,
    max_attempts: u32,
    previous_failure: Option<&str>,
) -> String {
    let mut text = format!(
        "Task for `{}`: {}.\nAttempt {attempt} of {max_attempts}.\n\n\
         Project root: {}\nWorking directory: {}\n",
        stage.name,
        stage.summary,
        project.root().display(),
        project.stage_dir(stage.dir).display(),
    );

    text.push_str("\nInput files (read these):\n");
    for path in stage.input_paths(project, source) {
        let _ = writeln!(text, "- {}", path.display());
    }

    text.push_str("\nOutput files (each must exist and be non-empty when you finish):\n");
    for path in stage.output_paths(project) {
        let _ = writeln!(text, "- {}", path.display());
    }

    if let Some(reason) = previous_failure {
        let _ = write!(
            text,
            "\nThe previous attempt was rejected: {reason}. \
             Partial files were removed from the working directory; start again.\n"
        );
    }
    text
}
