//! Built-in `write_file` tool: creates or overwrites a file inside the run workspace.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::lesson::normalize_rel_path;
use crate::tools::args::{parse_args, schema_of, WriteFileArgs};
use crate::tools::guard::{check_direct_write, WriteVia};
use crate::tools::{write_sandboxed, RunContext, ToolError, ToolMeta};

/// Write a file inside the workspace.
///
/// Args: `{ "path": "…", "content": "…" }`
/// Returns: `{ "path": "…", "bytes": <n> }`
pub async fn write_file(ctx: Arc<RunContext>, args: Value) -> Result<Value, ToolError> {
    let args: WriteFileArgs = parse_args("write_file", args)?;
    check_direct_write(&ctx, &args.path, WriteVia::WriteFile)?;

    write_sandboxed(&ctx.root_dir, &args.path, &args.content).await?;
    let path = normalize_rel_path(&args.path);
    ctx.notify(&path);

    info!(path = %path, bytes = args.content.len(), "file written");
    Ok(json!({ "path": path, "bytes": args.content.len() }))
}

pub fn meta() -> ToolMeta {
    ToolMeta {
        name: "write_file".into(),
        description: "Create or overwrite a file inside the workspace. JSON files under lesson/output/ \
                      and lesson/feedback/ must be produced with generate_text when the lesson pipeline is enforced."
            .into(),
        args_schema: schema_of::<WriteFileArgs>(),
    }
}
