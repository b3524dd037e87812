//! Skill-lookup capability: static reference guides read from a directory.

use super::{Tool, ToolDefinition};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A named skill and the guide files it concatenates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skill {
    /// Mermaid flowchart and sequence-diagram syntax.
    Mermaid,
    /// Patent drafting guide.
    PatentWriting,
}

impl Skill {
    /// Every skill.
    pub const ALL: [Skill; 2] = [Skill::Mermaid, Skill::PatentWriting];

    /// Tool name.
    #[must_use]
    pub fn tool_name(self) -> &'static str {
        match self {
            Self::Mermaid => "learn_skills_mermaid",
            Self::PatentWriting => "learn_skills_patent_writing",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::Mermaid => "Learn mermaid flowchart and sequence-diagram syntax.",
            Self::PatentWriting => "Learn how to write a patent application.",
        }
    }

    /// `(heading, file)` pairs. A `None` heading returns the file verbatim.
    fn sections(self) -> &'static [(Option<&'static str>, &'static str)] {
        match self {
            Self::Mermaid => &[
                (Some("Mermaid Flowchart Syntax"), "mermaid_flowchart.md"),
                (Some("Mermaid Sequence Diagram Syntax"), "mermaid_sequence_diagram.md"),
            ],
            Self::PatentWriting => &[(None, "patent_guide.md")],
        }
    }
}

/// Reads skill guides from a directory.
#[derive(Debug, Clone)]
pub struct SkillLibrary {
    dir: PathBuf,
}

impl SkillLibrary {
    /// Creates a library rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the skills directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads a skill's text. A missing file yields a not-found message.
    pub async fn load(&self, skill: Skill) -> String {
        let mut parts = Vec::new();
        for (heading, file) in skill.sections() {
            let path = self.dir.join(file);
            let body = match tokio::fs::read_to_string(&path).await {
                Ok(body) => body,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return format!("Not found: {}", path.display());
                }
                Err(e) => return format!("Read failed: {}: {e}", path.display()),
            };
            match heading {
                Some(heading) => parts.push(format!("# {heading}\n\n{body}")),
                None => parts.push(body),
            }
        }
        parts.join("\n\n")
    }
}

/// A tool serving one skill.
#[derive(Debug, Clone)]
pub struct SkillTool {
    skill: Skill,
    library: SkillLibrary,
}

impl SkillTool {
    /// Creates a tool for one skill.
    #[must_use]
    pub fn new(skill: Skill, library: SkillLibrary) -> Self {
        Self { skill, library }
    }
}

#[async_trait]
impl Tool for SkillTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.skill.tool_name()).with_description(self.skill.description())
    }

    async fn call(&self, _arguments: serde_json::Value) -> String {
        self.library.load(self.skill).await
    }

    fn name(&self) -> String {
        self.skill.tool_name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_mermaid_concatenates_under_headings() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("mermaid_flowchart.md"), "flowchart TD").unwrap();
        std::fs::write(dir.path().join("mermaid_sequence_diagram.md"), "sequenceDiagram").unwrap();

        let text = SkillLibrary::new(dir.path()).load(Skill::Mermaid).await;
        assert_eq!(
            text,
            "# Mermaid Flowchart Syntax\n\nflowchart TD\n\n# Mermaid Sequence Diagram Syntax\n\nsequenceDiagram"
        );
    }

    #[tokio::test]
    async fn test_missing_guide_is_reported() {
        let dir = TempDir::new().unwrap();
        let tool = SkillTool::new(Skill::PatentWriting, SkillLibrary::new(dir.path()));
        let out = tool.call(serde_json::json!({})).await;
        assert!(out.starts_with("Not found"));
        assert!(out.contains("patent_guide.md"));
    }

    #[tokio::test]
    async fn test_patent_guide_verbatim() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("patent_guide.md"), "Claims first.").unwrap();
        let text = SkillLibrary::new(dir.path()).load(Skill::PatentWriting).await;
        assert_eq!(text, "Claims first.");
    }
}
