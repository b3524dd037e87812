//! The static stage table.
//!
//! [`STAGES`] is the only place stage names, working directories, input and
//! output artifacts and capability sets are written down. The coordinator
//! builds delegation instructions and validates outputs from it, the worker
//! layer binds capabilities from it, and the CLI prints it.

use crate::config::TemperatureTier;
use crate::core::Project;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Working directories of a project, in layout order.
pub const STAGE_DIRS: [&str; 5] = [
    "01_input",
    "02_research",
    "03_outline",
    "04_content",
    "05_final",
];

/// Directory the caller's source document is seeded into.
pub const SOURCE_DIR: &str = "01_input";

/// File stem of the seeded source document.
pub const SOURCE_STEM: &str = "raw_document";

/// A capability a stage worker may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Sandboxed file operations.
    Filesystem,
    /// Converting uploaded documents to text.
    DocumentConversion,
    /// External patent search.
    PatentSearch,
    /// Static reference guides.
    SkillLookup,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem => write!(f, "filesystem"),
            Self::DocumentConversion => write!(f, "document_conversion"),
            Self::PatentSearch => write!(f, "patent_search"),
            Self::SkillLookup => write!(f, "skill_lookup"),
        }
    }
}

/// A reference to an artifact a stage consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactRef {
    /// The seeded source document. Its extension is only known at run time.
    Source,
    /// A file produced by an earlier stage.
    File {
        /// Working directory of the producing stage.
        dir: &'static str,
        /// File name.
        name: &'static str,
    },
}

impl ArtifactRef {
    const fn file(dir: &'static str, name: &'static str) -> Self {
        Self::File { dir, name }
    }

    /// Resolves the reference to an absolute path inside a project.
    #[must_use]
    pub fn path(&self, project: &Project, source: &Path) -> PathBuf {
        match self {
            Self::Source => source.to_path_buf(),
            Self::File { dir, name } => project.artifact_path(dir, name),
        }
    }

    /// Returns a short display name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Source => SOURCE_STEM,
            Self::File { name, .. } => name,
        }
    }
}

/// Static description of one pipeline stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageDef {
    /// Stage name, also the worker's name.
    pub name: &'static str,
    /// Working directory under the project root.
    pub dir: &'static str,
    /// One-line description of the stage's job.
    pub summary: &'static str,
    /// Artifacts that must exist before delegation.
    pub inputs: &'static [ArtifactRef],
    /// Files that must exist and be non-empty in `dir` after an attempt.
    pub outputs: &'static [&'static str],
    /// Capabilities the stage's worker is granted.
    pub capabilities: &'static [Capability],
    /// Sampling temperature tier for the stage's model.
    pub tier: TemperatureTier,
}

impl StageDef {
    /// Returns true if the stage is granted `capability`.
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Returns the absolute paths of the stage's outputs.
    #[must_use]
    pub fn output_paths(&self, project: &Project) -> Vec<PathBuf> {
        self.outputs
            .iter()
            .map(|name| project.artifact_path(self.dir, name))
            .collect()
    }

    /// Returns the absolute paths of the stage's inputs.
    #[must_use]
    pub fn input_paths(&self, project: &Project, source: &Path) -> Vec<PathBuf> {
        self.inputs
            .iter()
            .map(|input| input.path(project, source))
            .collect()
    }

    /// Label used for the stage's coordinator todo item.
    #[must_use]
    pub fn todo_label(&self) -> String {
        format!("{}: {}", self.name, self.summary)
    }
}

const PARSED_INFO: ArtifactRef = ArtifactRef::file("01_input", "parsed_info.json");
const PRIOR_ART: ArtifactRef = ArtifactRef::file("02_research", "prior_art_analysis.md");
const ABSTRACT_STYLE: ArtifactRef = ArtifactRef::file("02_research", "abstract_writing_style.md");
const CLAIMS_STYLE: ArtifactRef = ArtifactRef::file("02_research", "claims_writing_style.md");
const DESCRIPTION_STYLE: ArtifactRef =
    ArtifactRef::file("02_research", "description_writing_style.md");
const OUTLINE: ArtifactRef = ArtifactRef::file("03_outline", "patent_outline.md");
const ABSTRACT: ArtifactRef = ArtifactRef::file("04_content", "abstract.md");
const CLAIMS: ArtifactRef = ArtifactRef::file("04_content", "claims.md");
const DESCRIPTION: ArtifactRef = ArtifactRef::file("04_content", "description.md");
const FIGURES: ArtifactRef = ArtifactRef::file("04_content", "figures.md");

const FS_CONVERT: &[Capability] = &[Capability::Filesystem, Capability::DocumentConversion];
const FS_CONVERT_SEARCH: &[Capability] = &[
    Capability::Filesystem,
    Capability::DocumentConversion,
    Capability::PatentSearch,
];
const FS_SKILLS: &[Capability] = &[Capability::Filesystem, Capability::SkillLookup];

/// The nine stages in execution order.
pub static STAGES: [StageDef; 9] = [
    StageDef {
        name: "input_parser",
        dir: "01_input",
        summary: "parse the input document and extract structured information",
        inputs: &[ArtifactRef::Source],
        outputs: &["parsed_info.json"],
        capabilities: FS_CONVERT,
        tier: TemperatureTier::High,
    },
    StageDef {
        name: "patent_searcher",
        dir: "02_research",
        summary: "search similar patents and summarize prior art and writing styles",
        inputs: &[PARSED_INFO],
        outputs: &[
            "prior_art_analysis.md",
            "abstract_writing_style.md",
            "claims_writing_style.md",
            "description_writing_style.md",
        ],
        capabilities: FS_CONVERT_SEARCH,
        tier: TemperatureTier::High,
    },
    StageDef {
        name: "outline_generator",
        dir: "03_outline",
        summary: "generate the patent outline",
        inputs: &[PARSED_INFO],
        outputs: &["patent_outline.md"],
        capabilities: FS_SKILLS,
        tier: TemperatureTier::High,
    },
    StageDef {
        name: "abstract_writer",
        dir: "04_content",
        summary: "write the abstract",
        inputs: &[PARSED_INFO, OUTLINE, ABSTRACT_STYLE],
        outputs: &["abstract.md"],
        capabilities: FS_SKILLS,
        tier: TemperatureTier::High,
    },
    StageDef {
        name: "claims_writer",
        dir: "04_content",
        summary: "write the claims",
        inputs: &[PARSED_INFO, OUTLINE, ABSTRACT, CLAIMS_STYLE],
        outputs: &["claims.md"],
        capabilities: FS_SKILLS,
        tier: TemperatureTier::High,
    },
    StageDef {
        name: "description_writer_part1",
        dir: "04_content",
        summary: "write the description: technical field, background, summary and figure list",
        inputs: &[PARSED_INFO, OUTLINE, ABSTRACT, CLAIMS, PRIOR_ART, DESCRIPTION_STYLE],
        outputs: &["description.md"],
        capabilities: FS_SKILLS,
        tier: TemperatureTier::High,
    },
    StageDef {
        name: "description_writer_part2",
        dir: "04_content",
        summary: "write the description: detailed embodiments",
        inputs: &[PARSED_INFO, OUTLINE, ABSTRACT, CLAIMS, DESCRIPTION_STYLE, DESCRIPTION],
        outputs: &["description.md"],
        capabilities: FS_SKILLS,
        tier: TemperatureTier::High,
    },
    StageDef {
        name: "diagram_generator",
        dir: "04_content",
        summary: "draw the description figures",
        inputs: &[DESCRIPTION],
        outputs: &["figures.md"],
        capabilities: FS_SKILLS,
        tier: TemperatureTier::Low,
    },
    StageDef {
        name: "markdown_merger",
        dir: "05_final",
        summary: "merge the complete patent and write the summary report",
        inputs: &[ABSTRACT, CLAIMS, DESCRIPTION, FIGURES],
        outputs: &["summary_report.md", "complete_patent.md"],
        capabilities: FS_SKILLS,
        tier: TemperatureTier::High,
    },
];

/// Returns every stage in execution order.
#[must_use]
pub fn stages() -> &'static [StageDef] {
    &STAGES
}

/// Looks up a stage by name.
#[must_use]
pub fn stage(name: &str) -> Option<&'static StageDef> {
    STAGES.iter().find(|def| def.name == name)
}

/// Returns the position of a stage in execution order.
#[must_use]
pub fn index_of(name: &str) -> Option<usize> {
    STAGES.iter().position(|def| def.name == name)
}

/// Returns `(dir, file)` pairs produced by the stages before `index`.
///
/// A stage retry never deletes these, so shared working directories keep
/// earlier stages' work.
#[must_use]
pub fn produced_before(index: usize) -> HashSet<(&'static str, &'static str)> {
    STAGES
        .iter()
        .take(index)
        .flat_map(|def| def.outputs.iter().map(move |name| (def.dir, *name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stage_order() {
        let names: Vec<_> = stages().iter().map(|def| def.name).collect();
        assert_eq!(
            names,
            vec![
                "input_parser",
                "patent_searcher",
                "outline_generator",
                "abstract_writer",
                "claims_writer",
                "description_writer_part1",
                "description_writer_part2",
                "diagram_generator",
                "markdown_merger",
            ]
        );
    }

    #[test]
    fn test_every_stage_dir_is_in_layout() {
        for def in stages() {
            assert!(STAGE_DIRS.contains(&def.dir), "{} uses {}", def.name, def.dir);
            assert!(!def.outputs.is_empty());
            assert!(def.has(Capability::Filesystem));
        }
    }

    #[test]
    fn test_inputs_are_produced_earlier() {
        for (index, def) in stages().iter().enumerate() {
            let earlier = produced_before(index);
            for input in def.inputs {
                match input {
                    ArtifactRef::Source => assert_eq!(index, 0),
                    ArtifactRef::File { dir, name } => {
                        assert!(
                            earlier.contains(&(*dir, *name)),
                            "{} consumes {dir}/{name} before it exists",
                            def.name
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_capability_assignment() {
        assert!(stage("patent_searcher").unwrap().has(Capability::PatentSearch));
        assert!(!stage("claims_writer").unwrap().has(Capability::PatentSearch));
        assert!(stage("input_parser").unwrap().has(Capability::DocumentConversion));
        assert!(!stage("input_parser").unwrap().has(Capability::SkillLookup));
    }

    #[test]
    fn test_only_diagrams_run_cold() {
        let cold: Vec<_> = stages()
            .iter()
            .filter(|def| def.tier == TemperatureTier::Low)
            .map(|def| def.name)
            .collect();
        assert_eq!(cold, vec!["diagram_generator"]);
    }

    #[test]
    fn test_lookup() {
        assert_eq!(index_of("markdown_merger"), Some(8));
        assert!(stage("unknown").is_none());
    }

    #[test]
    fn test_paths() {
        let project = Project::new("1700000000", Path::new("/ws")).unwrap();
        let source = project.artifact_path(SOURCE_DIR, "raw_document.docx");
        let def = stage("claims_writer").unwrap();

        assert_eq!(
            def.output_paths(&project),
            vec![PathBuf::from("/ws/temp_1700000000/04_content/claims.md")]
        );
        assert_eq!(
            def.input_paths(&project, &source)[0],
            PathBuf::from("/ws/temp_1700000000/01_input/parsed_info.json")
        );
        assert_eq!(
            stage("input_parser").unwrap().input_paths(&project, &source),
            vec![source]
        );
    }
}
