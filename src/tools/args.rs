//! Tool argument types.
//!
//! Each tool deserializes its JSON arguments into one of the structs
//! below (camelCase keys, the agent-facing contract) and the JSON Schema
//! advertised in [`ToolMeta`](super::ToolMeta) is derived from the same
//! struct.  Loose shapes produced by models are normalized here with
//! explicit coercion functions instead of leaking into tool logic.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::ToolError;

/// A string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Coerce an optional string-or-list into a list.
///
/// A single string becomes a one-element list; empty strings are
/// dropped; an empty result is treated as absent.
pub fn coerce_list(value: Option<OneOrMany>) -> Option<Vec<String>> {
    let items: Vec<String> = match value? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    };
    let items: Vec<String> = items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

/// Treat a blank optional string as absent.
pub fn coerce_opt_string(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse raw tool arguments; `null` is accepted as `{}`.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArgs(format!("{tool}: {e}")))
}

/// JSON Schema for an argument struct.
pub fn schema_of<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| json!({ "type": "object" }));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    schema
}

fn require_non_empty(tool: &str, field: &str, value: String) -> Result<String, ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::InvalidArgs(format!(
            "{tool}: `{field}` must not be empty"
        )));
    }
    Ok(value)
}

// ── File tools ───────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileArgs {
    /// Workspace-relative path of the file to create or overwrite.
    pub path: String,
    /// Full file content.
    pub content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileArgs {
    /// Workspace-relative path of the file.
    pub path: String,
    /// Optional 1-based first line (inclusive).
    pub start_line: Option<usize>,
    /// Optional 1-based last line (inclusive).
    pub end_line: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadFilesArgs {
    /// One path or a list of workspace-relative paths.
    pub paths: OneOrMany,
}

impl ReadFilesArgs {
    pub fn normalize(self) -> Result<Vec<String>, ToolError> {
        coerce_list(Some(self.paths))
            .ok_or_else(|| ToolError::InvalidArgs("read_files: `paths` must not be empty".into()))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesArgs {
    /// Workspace-relative directory (default: workspace root).
    pub path: Option<String>,
    /// Glob on entry names, `*` and `?` wildcards.
    pub pattern: Option<String>,
    /// Recurse into subdirectories.
    pub recursive: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFileArgs {
    /// Workspace-relative path of the file to delete.
    pub path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoveFileArgs {
    pub from_path: String,
    pub to_path: String,
}

// ── apply_patch ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PatchOpKind {
    CreateFile,
    UpdateFile,
    DeleteFile,
}

impl PatchOpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateFile => "create_file",
            Self::UpdateFile => "update_file",
            Self::DeleteFile => "delete_file",
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatchOperation {
    #[serde(rename = "type")]
    pub kind: PatchOpKind,
    /// Workspace-relative target path.
    pub path: String,
    /// Unified-diff style hunks (update) or file body (create).
    pub diff: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPatchArgs {
    pub operations: Vec<PatchOperation>,
}

// ── python_exec ──────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PythonExecArgs {
    /// Workspace-relative path of the script to run.
    pub script_path: String,
    /// File whose contents are piped to the script's stdin.
    pub stdin_path: Option<String>,
    /// Where to write stdout; returned inline when omitted.
    pub stdout_path: Option<String>,
    /// Where to write stderr; returned inline when omitted.
    pub stderr_path: Option<String>,
}

impl PythonExecArgs {
    pub fn normalize(self) -> Result<Self, ToolError> {
        Ok(Self {
            script_path: require_non_empty("python_exec", "scriptPath", self.script_path)?,
            stdin_path: coerce_opt_string(self.stdin_path),
            stdout_path: coerce_opt_string(self.stdout_path),
            stderr_path: coerce_opt_string(self.stderr_path),
        })
    }
}

// ── generate_text ────────────────────────────────────────────

/// `generate_text` arguments as the model sends them.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawGenerateTextArgs {
    /// Workspace-relative path of the prompt file.
    pub prompt_path: String,
    /// Workspace-relative path the generated text is written to.
    pub output_path: String,
    /// Extra files given to the model as context.
    pub input_paths: Option<OneOrMany>,
    /// Provider-side tools to enable, e.g. `web-search`.
    pub tools: Option<OneOrMany>,
    /// Model override; the run default is used when omitted.
    pub model_id: Option<String>,
}

/// Normalized `generate_text` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateTextArgs {
    pub prompt_path: String,
    pub output_path: String,
    pub input_paths: Option<Vec<String>>,
    pub tools: Option<Vec<String>>,
    pub model_id: Option<String>,
}

impl RawGenerateTextArgs {
    pub fn normalize(self) -> Result<GenerateTextArgs, ToolError> {
        Ok(GenerateTextArgs {
            prompt_path: require_non_empty("generate_text", "promptPath", self.prompt_path)?,
            output_path: require_non_empty("generate_text", "outputPath", self.output_path)?,
            input_paths: coerce_list(self.input_paths),
            tools: coerce_list(self.tools),
            model_id: coerce_opt_string(self.model_id),
        })
    }
}

// ── publish_lesson ───────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishLessonArgs {
    /// Session whose lesson is published.
    pub session_id: String,
}

impl PublishLessonArgs {
    pub fn normalize(self) -> Result<String, ToolError> {
        let id = self.session_id.trim().to_string();
        if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
            return Err(ToolError::InvalidArgs(format!(
                "publish_lesson: invalid sessionId {:?}",
                self.session_id
            )));
        }
        Ok(id)
    }
}
