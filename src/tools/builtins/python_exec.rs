//! Built-in `python_exec` tool: runs a workspace script through the
//! sandboxed [`CodeRunner`](crate::tools::CodeRunner).
//!
//! Script failures are reported as data (`ok: false`), never as tool
//! errors; only bad arguments and unsafe paths fail the call.  Output is
//! passed through verbatim.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::lesson::normalize_rel_path;
use crate::tools::args::{parse_args, schema_of, PythonExecArgs};
use crate::tools::{read_sandboxed, sandbox_path, write_sandboxed, RunContext, ToolError, ToolMeta};

/// Args: `{ "scriptPath", "stdinPath?", "stdoutPath?", "stderrPath?" }`
///
/// Returns `{ ok, written, exitCode?, timedOut?, stdout?, stderr? }`;
/// `stdout` / `stderr` are inlined only when no output path was given.
pub async fn python_exec(ctx: Arc<RunContext>, args: Value) -> Result<Value, ToolError> {
    let args = parse_args::<PythonExecArgs>("python_exec", args)?.normalize()?;

    let script = sandbox_path(&ctx.root_dir, &args.script_path)?;
    if !script.is_file() {
        return Err(ToolError::NotFound(format!(
            "python_exec: script not found: {}",
            args.script_path
        )));
    }
    let stdin = match &args.stdin_path {
        Some(p) => Some(read_sandboxed(&ctx.root_dir, p).await?),
        None => None,
    };
    // Validate output targets before running anything.
    for p in [&args.stdout_path, &args.stderr_path].into_iter().flatten() {
        sandbox_path(&ctx.root_dir, p)?;
    }

    let (ok, stdout, stderr, exit_code, timed_out) =
        match ctx.code_runner.run(&script, stdin).await {
            Ok(out) => (out.success, out.stdout, out.stderr, out.exit_code, out.timed_out),
            Err(e) => (false, String::new(), format!("{e:#}"), None, false),
        };

    let mut written = Vec::new();
    let mut result = json!({ "ok": ok });
    for (target, body, key) in [
        (&args.stdout_path, stdout, "stdout"),
        (&args.stderr_path, stderr, "stderr"),
    ] {
        match target {
            Some(p) => {
                write_sandboxed(&ctx.root_dir, p, &body).await?;
                let rel = normalize_rel_path(p);
                ctx.notify(&rel);
                written.push(rel);
            }
            None => result[key] = json!(body),
        }
    }
    result["written"] = json!(written);
    if let Some(code) = exit_code {
        result["exitCode"] = json!(code);
    }
    if timed_out {
        result["timedOut"] = json!(true);
    }

    info!(script = %args.script_path, ok, ?exit_code, timed_out, "python script finished");
    Ok(result)
}

pub fn meta() -> ToolMeta {
    ToolMeta {
        name: "python_exec".into(),
        description: "Run a Python script from the workspace in a sandbox. Optionally pipe a file to \
                      stdin and write stdout/stderr to workspace files."
            .into(),
        args_schema: schema_of::<PythonExecArgs>(),
    }
}
