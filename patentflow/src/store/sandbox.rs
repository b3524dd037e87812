//! Path resolution against the workspace root.

use crate::errors::StoreError;
use std::path::{Component, Path, PathBuf};

/// Resolves `path` against `root` and checks containment.
///
/// `root` must already be canonical. Relative paths are taken relative to
/// `root`. `.` and `..` segments are folded lexically first, so no segment
/// that follows a missing directory is ever left unresolved. The longest
/// existing prefix of the folded path is then canonicalized so symlinks are
/// followed. A prefix that cannot be canonicalized (a dangling symlink) is
/// rejected.
pub(crate) fn resolve_within(root: &Path, path: &Path) -> Result<PathBuf, StoreError> {
    let denied = || StoreError::PermissionDenied {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    };

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let normalized = normalize(&absolute);

    let components: Vec<Component<'_>> = normalized.components().collect();
    let mut split = components.len();
    while split > 0 {
        let prefix: PathBuf = components[..split].iter().collect();
        if std::fs::symlink_metadata(&prefix).is_ok() {
            break;
        }
        split -= 1;
    }

    let mut resolved = if split == 0 {
        PathBuf::new()
    } else {
        let prefix: PathBuf = components[..split].iter().collect();
        prefix.canonicalize().map_err(|_| denied())?
    };
    // Only normal segments remain past the existing prefix.
    for component in &components[split..] {
        resolved.push(component.as_os_str());
    }

    if resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(denied())
    }
}

/// Folds `.` and `..` without touching the filesystem. `..` never climbs
/// above the filesystem root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
