//! Built-in `read_file` and `read_files` tools.
//!
//! `read_file` supports an optional `startLine` / `endLine` for partial
//! reads (1-based, inclusive).

use std::sync::Arc;

use serde_json::{json, Value};

use crate::lesson::normalize_rel_path;
use crate::tools::args::{parse_args, schema_of, ReadFileArgs, ReadFilesArgs};
use crate::tools::{read_sandboxed, RunContext, ToolError, ToolMeta};

/// Read a file inside the workspace.
///
/// Args: `{ "path": "…", "startLine?": N, "endLine?": N }`
/// Returns: `{ "path": "…", "content": "…", "startLine?", "endLine?", "totalLines?" }`
pub async fn read_file(ctx: Arc<RunContext>, args: Value) -> Result<Value, ToolError> {
    let args: ReadFileArgs = parse_args("read_file", args)?;
    let full = read_sandboxed(&ctx.root_dir, &args.path).await?;
    let path = normalize_rel_path(&args.path);

    if args.start_line.is_none() && args.end_line.is_none() {
        return Ok(json!({ "path": path, "content": full }));
    }

    let lines: Vec<&str> = full.split('\n').collect();
    let total = lines.len();
    let start = args.start_line.unwrap_or(1);
    let end = args.end_line.unwrap_or(total).min(total);
    if start < 1 || start > total || end < start {
        return Err(ToolError::InvalidArgs(format!(
            "read_file: line range {start}..{end} out of bounds ({path} has {total} lines)"
        )));
    }

    Ok(json!({
        "path": path,
        "content": lines[start - 1..end].join("\n"),
        "startLine": start,
        "endLine": end,
        "totalLines": total,
    }))
}

/// Read several files at once.  Any missing file fails the whole call.
///
/// Args: `{ "paths": "a.md" | ["a.md", "b.md"] }`
/// Returns: `{ "files": [{ "path", "content" }] }`
pub async fn read_files(ctx: Arc<RunContext>, args: Value) -> Result<Value, ToolError> {
    let paths = parse_args::<ReadFilesArgs>("read_files", args)?.normalize()?;
    let mut files = Vec::with_capacity(paths.len());
    for p in &paths {
        let content = read_sandboxed(&ctx.root_dir, p).await?;
        files.push(json!({ "path": normalize_rel_path(p), "content": content }));
    }
    Ok(json!({ "files": files }))
}

pub fn meta() -> ToolMeta {
    ToolMeta {
        name: "read_file".into(),
        description: "Read a file inside the workspace. Supports an optional 1-based line range.".into(),
        args_schema: schema_of::<ReadFileArgs>(),
    }
}

pub fn meta_many() -> ToolMeta {
    ToolMeta {
        name: "read_files".into(),
        description: "Read one or more files inside the workspace in a single call.".into(),
        args_schema: schema_of::<ReadFilesArgs>(),
    }
}
