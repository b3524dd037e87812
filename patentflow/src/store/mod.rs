//! Sandboxed artifact store.
//!
//! Every operation resolves its path(s) through [`ArtifactStore::resolve`]
//! before touching the disk, and fails closed with
//! [`StoreError::PermissionDenied`] when a path leaves the workspace root.

mod sandbox;

use crate::errors::StoreError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A directory.
    Directory,
    /// A regular file.
    File,
    /// A symbolic link.
    Symlink,
    /// Anything else.
    Other,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => write!(f, "directory"),
            Self::File => write!(f, "file"),
            Self::Symlink => write!(f, "symlink"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One entry returned by [`ArtifactStore::list_directory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    /// File name.
    pub name: String,
    /// Entry kind.
    pub kind: EntryKind,
}

/// Size and digest of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDigest {
    /// Absolute path.
    pub path: PathBuf,
    /// Size in bytes.
    pub bytes: u64,
    /// Hex-encoded SHA-256 of the contents.
    pub sha256: String,
}

/// File operations confined to one workspace root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Opens a store, creating the root directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|e| StoreError::io(root, e))?;
        let root = root.canonicalize().map_err(|e| StoreError::io(root, e))?;
        Ok(Self { root })
    }

    /// Returns the canonical workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a path and checks it stays under the root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, StoreError> {
        sandbox::resolve_within(&self.root, path.as_ref())
    }

    /// Returns true if the path resolves inside the root and exists.
    #[must_use]
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.resolve(path).is_ok_and(|p| p.exists())
    }

    /// Lists a directory, sorted by name.
    pub fn list_directory(&self, path: impl AsRef<Path>) -> Result<Vec<DirEntry>, StoreError> {
        let target = self.existing_dir(path.as_ref())?;
        let reader = fs::read_dir(&target).map_err(|e| StoreError::io(&target, e))?;

        let mut entries = Vec::new();
        for entry in reader {
            let entry = entry.map_err(|e| StoreError::io(&target, e))?;
            let kind = match entry.file_type() {
                Ok(t) if t.is_dir() => EntryKind::Directory,
                Ok(t) if t.is_file() => EntryKind::File,
                Ok(t) if t.is_symlink() => EntryKind::Symlink,
                _ => EntryKind::Other,
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Creates `name` inside the existing directory `path`.
    ///
    /// Fails with [`StoreError::AlreadyExists`] rather than touching an
    /// existing entry.
    pub fn create_directory(
        &self,
        path: impl AsRef<Path>,
        name: &str,
    ) -> Result<PathBuf, StoreError> {
        let base = self.existing_dir(path.as_ref())?;
        let target = self.resolve(base.join(name))?;
        if target.exists() {
            return Err(StoreError::AlreadyExists(target));
        }
        fs::create_dir_all(&target).map_err(|e| StoreError::io(&target, e))?;
        Ok(target)
    }

    /// Creates a directory and its parents if absent. Returns true if created.
    pub fn ensure_dir(&self, path: impl AsRef<Path>) -> Result<bool, StoreError> {
        let target = self.resolve(path)?;
        if target.is_dir() {
            return Ok(false);
        }
        if target.exists() {
            return Err(StoreError::NotADirectory(target));
        }
        fs::create_dir_all(&target).map_err(|e| StoreError::io(&target, e))?;
        Ok(true)
    }

    /// Recursively deletes `name` inside the existing directory `path`.
    pub fn delete_directory(
        &self,
        path: impl AsRef<Path>,
        name: &str,
    ) -> Result<PathBuf, StoreError> {
        let base = self.existing_dir(path.as_ref())?;
        let target = self.resolve(base.join(name))?;
        if target == self.root {
            return Err(StoreError::PermissionDenied {
                path: target,
                root: self.root.clone(),
            });
        }
        if !target.exists() {
            return Err(StoreError::NotFound(target));
        }
        if !target.is_dir() {
            return Err(StoreError::NotADirectory(target));
        }
        fs::remove_dir_all(&target).map_err(|e| StoreError::io(&target, e))?;
        Ok(target)
    }

    /// Reads a UTF-8 file.
    pub fn read_text(&self, path: impl AsRef<Path>) -> Result<String, StoreError> {
        let target = self.existing_file(path.as_ref())?;
        fs::read_to_string(&target).map_err(|e| StoreError::io(&target, e))
    }

    /// Writes a file, creating parent directories.
    pub fn write_text(&self, path: impl AsRef<Path>, content: &str) -> Result<PathBuf, StoreError> {
        let target = self.resolve(path)?;
        Self::create_parent(&target)?;
        fs::write(&target, content).map_err(|e| StoreError::io(&target, e))?;
        Ok(target)
    }

    /// Appends to a file, creating it and its parents if absent.
    pub fn append_text(
        &self,
        path: impl AsRef<Path>,
        content: &str,
    ) -> Result<PathBuf, StoreError> {
        let target = self.resolve(path)?;
        Self::create_parent(&target)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target)
            .map_err(|e| StoreError::io(&target, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| StoreError::io(&target, e))?;
        Ok(target)
    }

    /// Deletes a regular file.
    pub fn delete_file(&self, path: impl AsRef<Path>) -> Result<PathBuf, StoreError> {
        let target = self.existing_file(path.as_ref())?;
        fs::remove_file(&target).map_err(|e| StoreError::io(&target, e))?;
        Ok(target)
    }

    /// Removes a file or directory, whichever it is. Used for stage cleanup.
    pub fn remove_entry(&self, path: impl AsRef<Path>) -> Result<PathBuf, StoreError> {
        let target = self.resolve(path)?;
        if target == self.root {
            return Err(StoreError::PermissionDenied {
                path: target,
                root: self.root.clone(),
            });
        }
        let meta = fs::symlink_metadata(&target).map_err(|_| StoreError::NotFound(target.clone()))?;
        if meta.is_dir() {
            fs::remove_dir_all(&target).map_err(|e| StoreError::io(&target, e))?;
        } else {
            fs::remove_file(&target).map_err(|e| StoreError::io(&target, e))?;
        }
        Ok(target)
    }

    /// Reads and parses a JSON file.
    ///
    /// A missing file is [`StoreError::NotFound`]; unparsable content is
    /// [`StoreError::MalformedJson`].
    pub fn read_json(&self, path: impl AsRef<Path>) -> Result<serde_json::Value, StoreError> {
        let target = self.existing_file(path.as_ref())?;
        let raw = fs::read_to_string(&target).map_err(|e| StoreError::io(&target, e))?;
        serde_json::from_str(&raw).map_err(|e| StoreError::MalformedJson {
            path: target,
            reason: e.to_string(),
        })
    }

    /// Writes pretty-printed JSON. The target must carry a `.json` suffix.
    pub fn write_json(
        &self,
        path: impl AsRef<Path>,
        content: &serde_json::Value,
    ) -> Result<PathBuf, StoreError> {
        let target = self.resolve(path)?;
        let is_json = target
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            return Err(StoreError::NotJson(target));
        }
        let body = serde_json::to_string_pretty(content).map_err(|e| StoreError::MalformedJson {
            path: target.clone(),
            reason: e.to_string(),
        })?;
        Self::create_parent(&target)?;
        fs::write(&target, body).map_err(|e| StoreError::io(&target, e))?;
        Ok(target)
    }

    /// Concatenates `inputs` in order, separated by a single newline.
    ///
    /// Every input is checked and read before the output is opened, so a
    /// failure leaves the output untouched.
    pub fn join_files<P: AsRef<Path>>(
        &self,
        inputs: &[P],
        output: impl AsRef<Path>,
    ) -> Result<PathBuf, StoreError> {
        let output = self.resolve(output)?;

        let mut contents = Vec::with_capacity(inputs.len());
        for input in inputs {
            let source = self.existing_file(input.as_ref())?;
            let text = fs::read_to_string(&source).map_err(|e| StoreError::io(&source, e))?;
            contents.push(text);
        }

        Self::create_parent(&output)?;
        fs::write(&output, contents.join("\n")).map_err(|e| StoreError::io(&output, e))?;
        Ok(output)
    }

    /// Copies a file, creating the destination's parents.
    pub fn copy_file(
        &self,
        from: impl AsRef<Path>,
        to: impl AsRef<Path>,
    ) -> Result<PathBuf, StoreError> {
        let source = self.existing_file(from.as_ref())?;
        let target = self.resolve(to)?;
        Self::create_parent(&target)?;
        fs::copy(&source, &target).map_err(|e| StoreError::io(&target, e))?;
        Ok(target)
    }

    /// Returns the size of a file, or `None` if it does not exist.
    pub fn file_len(&self, path: impl AsRef<Path>) -> Result<Option<u64>, StoreError> {
        let target = self.resolve(path)?;
        match fs::metadata(&target) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Err(StoreError::NotAFile(target)),
            Err(_) => Ok(None),
        }
    }

    /// Computes the size and SHA-256 digest of a file.
    pub fn digest(&self, path: impl AsRef<Path>) -> Result<FileDigest, StoreError> {
        let target = self.existing_file(path.as_ref())?;
        let bytes = fs::read(&target).map_err(|e| StoreError::io(&target, e))?;
        let sha256 = hex::encode(Sha256::digest(&bytes));
        Ok(FileDigest {
            path: target,
            bytes: bytes.len() as u64,
            sha256,
        })
    }

    fn existing_dir(&self, path: &Path) -> Result<PathBuf, StoreError> {
        let target = self.resolve(path)?;
        if !target.exists() {
            return Err(StoreError::NotFound(target));
        }
        if !target.is_dir() {
            return Err(StoreError::NotADirectory(target));
        }
        Ok(target)
    }

    fn existing_file(&self, path: &Path) -> Result<PathBuf, StoreError> {
        let target = self.resolve(path)?;
        if !target.exists() {
            return Err(StoreError::NotFound(target));
        }
        if !target.is_file() {
            return Err(StoreError::NotAFile(target));
        }
        Ok(target)
    }

    fn create_parent(target: &Path) -> Result<(), StoreError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        Ok(())
    }
}
