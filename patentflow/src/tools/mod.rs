//! Capability surfaces offered to stage workers.
//!
//! This module provides:
//! - Tool definitions, calls and a per-stage registry
//! - The filesystem, document-conversion, patent-search and skill-lookup tools
//! - [`CapabilityProviders`], which binds a stage's capability set to tools

mod convert;
mod definitions;
mod filesystem;
mod registry;
mod search;
mod skills;

pub use convert::{ConvertTool, DocumentConverter, ProgramConverter};
pub use definitions::{ToolCall, ToolDefinition};
pub use filesystem::{filesystem_tools, FilesystemTool, FsOp};
pub use registry::{ResolvedToolCall, Tool, ToolRegistry, UnresolvedToolCall};
#[cfg(feature = "http")]
pub use search::SerpApiSearch;
pub use search::{PatentSearch, SearchQuery, SearchTool, UnavailableSearch};
pub use skills::{Skill, SkillLibrary, SkillTool};

use crate::config::PipelineConfig;
use crate::registry::Capability;
use crate::store::ArtifactStore;
use std::sync::Arc;

/// The backends behind each capability, shared by every stage.
#[derive(Clone)]
pub struct CapabilityProviders {
    store: Arc<ArtifactStore>,
    converter: Arc<dyn DocumentConverter>,
    search: Arc<dyn PatentSearch>,
    skills: SkillLibrary,
}

impl CapabilityProviders {
    /// Creates providers from explicit backends.
    #[must_use]
    pub fn new(
        store: Arc<ArtifactStore>,
        converter: Arc<dyn DocumentConverter>,
        search: Arc<dyn PatentSearch>,
        skills: SkillLibrary,
    ) -> Self {
        Self {
            store,
            converter,
            search,
            skills,
        }
    }

    /// Creates the default providers for a configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig, store: Arc<ArtifactStore>) -> Self {
        let converter = Arc::new(ProgramConverter::new(
            Arc::clone(&store),
            config.converter_program.clone(),
        ));
        #[cfg(feature = "http")]
        let search: Arc<dyn PatentSearch> = Arc::new(SerpApiSearch::from_config(&config.search));
        #[cfg(not(feature = "http"))]
        let search: Arc<dyn PatentSearch> =
            Arc::new(UnavailableSearch::new("built without HTTP support"));

        Self::new(store, converter, search, SkillLibrary::new(&config.skills_dir))
    }

    /// Returns the artifact store.
    #[must_use]
    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Builds the tool registry for a capability set.
    #[must_use]
    pub fn tools_for(&self, capabilities: &[Capability]) -> ToolRegistry {
        let registry = ToolRegistry::new();
        for capability in capabilities {
            match capability {
                Capability::Filesystem => registry.extend(filesystem_tools(&self.store)),
                Capability::DocumentConversion => {
                    registry.register(Arc::new(ConvertTool::new(Arc::clone(&self.converter))));
                }
                Capability::PatentSearch => {
                    registry.register(Arc::new(SearchTool::new(Arc::clone(&self.search))));
                }
                Capability::SkillLookup => {
                    for skill in Skill::ALL {
                        registry.register(Arc::new(SkillTool::new(skill, self.skills.clone())));
                    }
                }
            }
        }
        registry
    }
}

impl std::fmt::Debug for CapabilityProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityProviders")
            .field("store", &self.store)
            .field("skills", &self.skills)
            .finish_non_exhaustive()
    }
}
