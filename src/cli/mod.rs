//! CLI subcommand handlers.
//!
//! Keeps `main.rs` slim: clap parsing stays there, the logic lives here.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::Config;
use crate::lesson::grading::{find_session_grade, GradeLookup};
use crate::lesson::publish::DirectoryPublisher;
use crate::models::HttpGenerator;
use crate::scheduler::CallScheduler;
use crate::tools::{build_tools, PythonProcessRunner, RunContext};
use crate::workspace::LocalWorkspace;

/// Environment variable carrying the publish service-account credentials.
pub const SERVICE_ACCOUNT_ENV: &str = "SPARK_SERVICE_ACCOUNT_JSON";

/// One `spark call` invocation.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub root: PathBuf,
    pub tool: String,
    pub args: Value,
    pub user_id: String,
    pub enforce_lesson_pipeline: bool,
}

/// Wire the shipped collaborators into a run context rooted at `root`.
///
/// Returns the local workspace too so callers can inspect pending syncs.
pub fn build_run_context(
    config: &Config,
    root: &Path,
    user_id: &str,
    enforce_lesson_pipeline: bool,
) -> anyhow::Result<(Arc<RunContext>, Arc<LocalWorkspace>)> {
    let root = root
        .canonicalize()
        .with_context(|| format!("workspace root not found: {}", root.display()))?;

    let generator = HttpGenerator::new(
        config.generation.endpoint.clone(),
        config.generation.resolved_api_key(),
        Duration::from_secs(config.generation.timeout_secs),
    )?;
    let workspace = Arc::new(LocalWorkspace::new(&root));
    let runner = PythonProcessRunner::new(
        config.python.interpreter.clone(),
        &root,
        Duration::from_secs(config.python.timeout_secs),
    );

    let ctx = RunContext {
        root_dir: root,
        user_id: user_id.to_string(),
        service_account_json: std::env::var(SERVICE_ACCOUNT_ENV).ok(),
        enforce_lesson_pipeline: enforce_lesson_pipeline || config.workspace.enforce_lesson_pipeline,
        default_model: config.generation.model.clone(),
        workspace: workspace.clone(),
        scheduler: CallScheduler::new(config.scheduler.to_scheduler_config()),
        generator: Arc::new(generator),
        code_runner: Arc::new(runner),
        publisher: Arc::new(DirectoryPublisher::new(config.publish_dir())),
    };
    debug!(?ctx, "run context built");
    Ok((Arc::new(ctx), workspace))
}

/// Print the tool catalogue as JSON.
pub fn list_tools(config: &Config) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let (ctx, _) = build_run_context(config, &cwd, "", false)?;
    let tools = build_tools(ctx).list();
    println!("{}", serde_json::to_string_pretty(&tools)?);
    Ok(())
}

/// Run one tool call and print its JSON result.
///
/// Returns `Ok(false)` when the tool itself failed; the error is printed
/// as `{ "error": kind, "message": … }`.
pub async fn call_tool(config: &Config, opts: CallOptions) -> anyhow::Result<bool> {
    let (ctx, workspace) =
        build_run_context(config, &opts.root, &opts.user_id, opts.enforce_lesson_pipeline)?;
    let tools = build_tools(ctx);

    let (ok, output) = match tools.call(&opts.tool, opts.args).await {
        Ok(v) => (true, v),
        Err(e) => (false, json!({ "error": e.kind(), "message": e.to_string() })),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    for (path, kind) in workspace.take_pending() {
        info!(path = %path, ?kind, "pending workspace sync");
    }
    Ok(ok)
}

/// Report what the publish gate would decide for `root`.
pub async fn grade_status(root: &Path) -> anyhow::Result<bool> {
    let lookup = find_session_grade(root).await?;
    let (ready, report) = match lookup {
        GradeLookup::Found(r) => (
            r.pass,
            json!({ "status": if r.pass { "pass" } else { "fail" }, "report": r }),
        ),
        GradeLookup::Missing => (false, json!({ "status": "missing" })),
        GradeLookup::Unreadable { raw_path, detail } => (
            false,
            json!({ "status": "unreadable", "path": raw_path, "detail": detail }),
        ),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ready)
}

/// Parse `--args` / `--args-file` input; no input means `null`.
pub fn read_call_args(inline: Option<&str>, file: Option<&Path>) -> anyhow::Result<Value> {
    let raw = match (inline, file) {
        (Some(_), Some(_)) => anyhow::bail!("use either --args or --args-file, not both"),
        (Some(s), None) => s.to_string(),
        (None, Some(p)) => std::fs::read_to_string(p)
            .with_context(|| format!("failed to read args file: {}", p.display()))?,
        (None, None) => return Ok(Value::Null),
    };
    serde_json::from_str(&raw).context("tool arguments are not valid JSON")
}
