//! Filesystem capability: the store's operations exposed as tools.

use super::{Tool, ToolDefinition};
use crate::errors::CapabilityError;
use crate::store::ArtifactStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// One filesystem operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsOp {
    /// Reports the workspace root.
    ReturnWorkPath,
    /// Lists a directory.
    ListDirectory,
    /// Creates a directory inside an existing one.
    CreateDirectory,
    /// Deletes a directory inside an existing one.
    DeleteDirectory,
    /// Reads a text file.
    ReadFile,
    /// Writes a text file.
    WriteFile,
    /// Appends to a text file.
    AppendFile,
    /// Deletes a file.
    DeleteFile,
    /// Reads a JSON file.
    ReadFileJson,
    /// Writes a JSON file.
    WriteFileJson,
    /// Concatenates files.
    JoinFiles,
    /// Copies a file.
    CopyFile,
}

impl FsOp {
    /// Every operation, in the order tools are offered.
    pub const ALL: [FsOp; 12] = [
        FsOp::ReturnWorkPath,
        FsOp::ListDirectory,
        FsOp::CreateDirectory,
        FsOp::DeleteDirectory,
        FsOp::ReadFile,
        FsOp::WriteFile,
        FsOp::AppendFile,
        FsOp::DeleteFile,
        FsOp::ReadFileJson,
        FsOp::WriteFileJson,
        FsOp::JoinFiles,
        FsOp::CopyFile,
    ];

    /// Tool name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ReturnWorkPath => "return_work_path",
            Self::ListDirectory => "list_directory",
            Self::CreateDirectory => "create_directory",
            Self::DeleteDirectory => "delete_directory",
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::AppendFile => "append_file",
            Self::DeleteFile => "delete_file",
            Self::ReadFileJson => "read_file_json",
            Self::WriteFileJson => "write_file_json",
            Self::JoinFiles => "join_files",
            Self::CopyFile => "copy_file",
        }
    }

    fn definition(self) -> ToolDefinition {
        let def = ToolDefinition::new(self.name());
        match self {
            Self::ReturnWorkPath => {
                def.with_description("Return the absolute path of the workspace root.")
            }
            Self::ListDirectory => def
                .with_description("List the entries of a directory, one `name<TAB>kind` per line.")
                .with_string_params(&[("path", "Absolute directory path")]),
            Self::CreateDirectory => def
                .with_description("Create directory `name` inside the existing directory `path`.")
                .with_string_params(&[
                    ("path", "Absolute path of the parent directory"),
                    ("name", "Name of the new directory"),
                ]),
            Self::DeleteDirectory => def
                .with_description("Recursively delete directory `name` inside `path`.")
                .with_string_params(&[
                    ("path", "Absolute path of the parent directory"),
                    ("name", "Name of the directory to delete"),
                ]),
            Self::ReadFile => def
                .with_description("Read a text file.")
                .with_string_params(&[("path", "Absolute file path")]),
            Self::WriteFile => def
                .with_description("Write a text file, replacing it and creating parent directories.")
                .with_string_params(&[("path", "Absolute file path"), ("content", "File content")]),
            Self::AppendFile => def
                .with_description("Append to a text file, creating it if absent.")
                .with_string_params(&[("path", "Absolute file path"), ("content", "Text to append")]),
            Self::DeleteFile => def
                .with_description("Delete a file.")
                .with_string_params(&[("path", "Absolute file path")]),
            Self::ReadFileJson => def
                .with_description("Read and parse a .json file.")
                .with_string_params(&[("path", "Absolute path of a .json file")]),
            Self::WriteFileJson => def
                .with_description("Write a JSON object to a .json file.")
                .with_input_schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Absolute path of a .json file"},
                        "content": {"type": "object", "description": "JSON object to write"}
                    },
                    "required": ["path", "content"]
                })),
            Self::JoinFiles => def
                .with_description(
                    "Concatenate files in the given order, separated by a newline, into `output`.",
                )
                .with_input_schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "paths": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Absolute input file paths, in order"
                        },
                        "output": {"type": "string", "description": "Absolute output file path"}
                    },
                    "required": ["paths", "output"]
                })),
            Self::CopyFile => def
                .with_description("Copy a file.")
                .with_string_params(&[
                    ("from", "Absolute source file path"),
                    ("to", "Absolute destination file path"),
                ]),
        }
    }
}

#[derive(Deserialize)]
struct PathArgs {
    path: PathBuf,
}

#[derive(Deserialize)]
struct DirArgs {
    path: PathBuf,
    name: String,
}

#[derive(Deserialize)]
struct ContentArgs {
    path: PathBuf,
    content: String,
}

#[derive(Deserialize)]
struct JsonArgs {
    path: PathBuf,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct JoinArgs {
    paths: Vec<PathBuf>,
    output: PathBuf,
}

#[derive(Deserialize)]
struct CopyArgs {
    from: PathBuf,
    to: PathBuf,
}

/// A filesystem tool bound to a store.
#[derive(Debug, Clone)]
pub struct FilesystemTool {
    op: FsOp,
    store: Arc<ArtifactStore>,
}

impl FilesystemTool {
    /// Creates a tool for one operation.
    #[must_use]
    pub fn new(op: FsOp, store: Arc<ArtifactStore>) -> Self {
        Self { op, store }
    }

    fn args<T: DeserializeOwned>(&self, arguments: serde_json::Value) -> Result<T, CapabilityError> {
        serde_json::from_value(arguments)
            .map_err(|e| CapabilityError::invalid(self.op.name(), e.to_string()))
    }

    fn run(&self, arguments: serde_json::Value) -> Result<String, CapabilityError> {
        let store = &self.store;
        let text = match self.op {
            FsOp::ReturnWorkPath => format!("Workspace root: {}", store.root().display()),
            FsOp::ListDirectory => {
                let PathArgs { path } = self.args(arguments)?;
                let entries = store.list_directory(&path)?;
                if entries.is_empty() {
                    format!("Directory is empty: {}", path.display())
                } else {
                    entries
                        .iter()
                        .map(|e| format!("{}\t{}", e.name, e.kind))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            FsOp::CreateDirectory => {
                let DirArgs { path, name } = self.args(arguments)?;
                let created = store.create_directory(&path, &name)?;
                format!("Directory created: {}", created.display())
            }
            FsOp::DeleteDirectory => {
                let DirArgs { path, name } = self.args(arguments)?;
                let deleted = store.delete_directory(&path, &name)?;
                format!("Directory deleted: {}", deleted.display())
            }
            FsOp::ReadFile => {
                let PathArgs { path } = self.args(arguments)?;
                store.read_text(&path)?
            }
            FsOp::WriteFile => {
                let ContentArgs { path, content } = self.args(arguments)?;
                let written = store.write_text(&path, &content)?;
                format!("File written: {}", written.display())
            }
            FsOp::AppendFile => {
                let ContentArgs { path, content } = self.args(arguments)?;
                let written = store.append_text(&path, &content)?;
                format!("File appended: {}", written.display())
            }
            FsOp::DeleteFile => {
                let PathArgs { path } = self.args(arguments)?;
                let deleted = store.delete_file(&path)?;
                format!("File deleted: {}", deleted.display())
            }
            FsOp::ReadFileJson => {
                let PathArgs { path } = self.args(arguments)?;
                let value = store.read_json(&path)?;
                serde_json::to_string_pretty(&value)
                    .map_err(|e| CapabilityError::invalid(self.op.name(), e.to_string()))?
            }
            FsOp::WriteFileJson => {
                let JsonArgs { path, content } = self.args(arguments)?;
                // Models often send the object as a JSON string.
                let content = match content {
                    serde_json::Value::String(raw) => serde_json::from_str(&raw).map_err(|e| {
                        CapabilityError::invalid(self.op.name(), format!("content is not JSON: {e}"))
                    })?,
                    other => other,
                };
                let written = store.write_json(&path, &content)?;
                format!("File written: {}", written.display())
            }
            FsOp::JoinFiles => {
                let JoinArgs { paths, output } = self.args(arguments)?;
                let joined = store.join_files(&paths, &output)?;
                format!("Files joined into: {}", joined.display())
            }
            FsOp::CopyFile => {
                let CopyArgs { from, to } = self.args(arguments)?;
                let copied = store.copy_file(&from, &to)?;
                format!("File copied: {} -> {}", from.display(), copied.display())
            }
        };
        Ok(text)
    }
}

#[async_trait]
impl Tool for FilesystemTool {
    fn definition(&self) -> ToolDefinition {
        self.op.definition()
    }

    async fn call(&self, arguments: serde_json::Value) -> String {
        self.run(arguments).unwrap_or_else(|e| e.to_string())
    }

    fn name(&self) -> String {
        self.op.name().to_string()
    }
}

/// Builds one tool per filesystem operation.
#[must_use]
pub fn filesystem_tools(store: &Arc<ArtifactStore>) -> Vec<Arc<dyn Tool>> {
    FsOp::ALL
        .iter()
        .map(|op| Arc::new(FilesystemTool::new(*op, Arc::clone(store))) as Arc<dyn Tool>)
        .collect()
}
