//! Output validation and pre-retry cleanup.

use crate::core::Project;
use crate::errors::{StoreError, ValidationError};
use crate::registry::{self, StageDef};
use crate::store::{ArtifactStore, FileDigest};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Checks a stage's required outputs.
///
/// Each output must be a non-empty file; `.json` outputs must also parse.
/// A path the store refuses counts as missing. The coordinator runs this
/// after every attempt; it is public so front ends can audit a finished
/// project with the same rules.
pub fn validate_outputs(
    store: &ArtifactStore,
    project: &Project,
    stage: &StageDef,
) -> ValidationError {
    let mut report = ValidationError::new(stage.name);
    for (name, path) in stage.outputs.iter().zip(stage.output_paths(project)) {
        match store.file_len(&path) {
            Ok(Some(0)) => report.empty.push((*name).to_string()),
            Ok(Some(_)) => {
                if is_json(&path) && store.read_json(&path).is_err() {
                    report.malformed.push((*name).to_string());
                }
            }
            Ok(None) | Err(_) => report.missing.push((*name).to_string()),
        }
    }
    report
}

/// Digests, taken before an attempt, of the outputs stage `index` shares with
/// earlier stages. Outputs that do not exist yet are skipped.
pub(crate) fn inherited_digests(
    store: &ArtifactStore,
    project: &Project,
    index: usize,
) -> Vec<(String, FileDigest)> {
    let Some(stage) = registry::stages().get(index) else {
        return Vec::new();
    };
    let earlier = registry::produced_before(index);
    stage
        .outputs
        .iter()
        .filter(|name| earlier.contains(&(stage.dir, **name)))
        .filter_map(|name| {
            let digest = store.digest(project.artifact_path(stage.dir, name)).ok()?;
            Some(((*name).to_string(), digest))
        })
        .collect()
}

/// Returns the names from `before` whose contents still match their digest.
pub(crate) fn unchanged_outputs(
    store: &ArtifactStore,
    before: &[(String, FileDigest)],
) -> Vec<String> {
    before
        .iter()
        .filter(|(_, old)| {
            store
                .digest(&old.path)
                .is_ok_and(|now| now.sha256 == old.sha256)
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Returns the inputs of `stage` that are not present as files.
pub(crate) fn missing_inputs(
    store: &ArtifactStore,
    project: &Project,
    stage: &StageDef,
    source: &Path,
) -> Vec<PathBuf> {
    stage
        .input_paths(project, source)
        .into_iter()
        .filter(|path| !matches!(store.file_len(path), Ok(Some(_))))
        .collect()
}

/// Clears a stage's working directory before a retry.
///
/// Entries produced by earlier stages and the seeded source survive; every
/// other entry is removed. Returns the removed paths.
pub(crate) fn clean_stage_dir(
    store: &ArtifactStore,
    project: &Project,
    index: usize,
    source: &Path,
) -> Result<Vec<PathBuf>, StoreError> {
    let Some(stage) = registry::stages().get(index) else {
        return Ok(Vec::new());
    };
    let dir = project.stage_dir(stage.dir);
    if !store.exists(&dir) {
        return Ok(Vec::new());
    }

    let keep = registry::produced_before(index);
    let mut removed = Vec::new();
    for entry in store.list_directory(&dir)? {
        let path = dir.join(&entry.name);
        let earlier = keep.contains(&(stage.dir, entry.name.as_str()));
        if earlier || path == source {
            continue;
        }
        debug!(stage = stage.name, path = %path.display(), "removing partial output");
        removed.push(store.remove_entry(&path)?);
    }
    Ok(removed)
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
