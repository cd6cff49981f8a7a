//! Built-in `delete_file` and `move_file` tools.
//!
//! Both paths are sandboxed here, then the operation is delegated to the
//! workspace collaborator so it can keep its sync state consistent.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::lesson::normalize_rel_path;
use crate::tools::args::{parse_args, schema_of, DeleteFileArgs, MoveFileArgs};
use crate::tools::{sandbox_path, RunContext, ToolError, ToolMeta};

pub async fn delete_file(ctx: Arc<RunContext>, args: Value) -> Result<Value, ToolError> {
    let args: DeleteFileArgs = parse_args("delete_file", args)?;
    let abs = sandbox_path(&ctx.root_dir, &args.path)?;
    if !abs.exists() {
        return Err(ToolError::NotFound(format!("file not found: {}", args.path)));
    }
    let path = normalize_rel_path(&args.path);

    ctx.workspace
        .delete_file(&path)
        .await
        .map_err(|e| ToolError::Workspace(format!("delete_file: {e:#}")))?;

    info!(path = %path, "file deleted");
    Ok(json!({ "deleted": path }))
}

pub async fn move_file(ctx: Arc<RunContext>, args: Value) -> Result<Value, ToolError> {
    let args: MoveFileArgs = parse_args("move_file", args)?;
    let from_abs = sandbox_path(&ctx.root_dir, &args.from_path)?;
    sandbox_path(&ctx.root_dir, &args.to_path)?;
    if !from_abs.exists() {
        return Err(ToolError::NotFound(format!("file not found: {}", args.from_path)));
    }
    let from = normalize_rel_path(&args.from_path);
    let to = normalize_rel_path(&args.to_path);

    ctx.workspace
        .move_file(&from, &to)
        .await
        .map_err(|e| ToolError::Workspace(format!("move_file: {e:#}")))?;

    info!(from = %from, to = %to, "file moved");
    Ok(json!({ "fromPath": from, "toPath": to }))
}

pub fn delete_meta() -> ToolMeta {
    ToolMeta {
        name: "delete_file".into(),
        description: "Delete a file inside the workspace.".into(),
        args_schema: schema_of::<DeleteFileArgs>(),
    }
}

pub fn move_meta() -> ToolMeta {
    ToolMeta {
        name: "move_file".into(),
        description: "Move or rename a file inside the workspace.".into(),
        args_schema: schema_of::<MoveFileArgs>(),
    }
}
