//! Tool policy engine.
//!
//! [`build_tools`] assembles the per-run [`ToolSet`]: the fixed catalogue
//! of tools an agent may call, each bound to a shared [`RunContext`].
//! Every path argument is sandboxed to the run root, and while the lesson
//! pipeline is enforced JSON artifacts under the protected lesson zones
//! can only be produced through `generate_text`.
//!
//! Use [`ToolSet::list`] to retrieve the catalogue (e.g. for prompt or
//! function-definition injection) and [`ToolSet::call`] to dispatch.

pub mod args;
pub mod builtins;
pub mod context;
pub mod error;
pub mod guard;
pub mod runner;

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

pub use context::RunContext;
pub use error::ToolError;
pub use runner::{CodeRunner, ExecOutcome, PythonProcessRunner};

// ── Tool metadata ────────────────────────────────────────────

/// Metadata describing a tool available to agents.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolMeta {
    /// Short machine-friendly name (e.g. `"read_file"`).
    pub name: String,
    /// Human-readable one-liner describing what the tool does.
    pub description: String,
    /// JSON Schema object describing the expected `args` value.
    pub args_schema: Value,
}

/// Async handler bound to a run context.
pub type ToolHandler = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>> + Send + Sync,
>;

struct ToolEntry {
    meta: ToolMeta,
    handler: ToolHandler,
}

/// The tool catalogue for one agent run.
#[derive(Default)]
pub struct ToolSet {
    entries: Vec<ToolEntry>,
}

impl ToolSet {
    /// Register a tool.  Duplicate names are ignored (first wins).
    pub fn register(&mut self, meta: ToolMeta, handler: ToolHandler) {
        if self.entries.iter().any(|e| e.meta.name == meta.name) {
            return;
        }
        self.entries.push(ToolEntry { meta, handler });
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.meta.name.as_str()).collect()
    }

    pub fn list(&self) -> Vec<ToolMeta> {
        self.entries.iter().map(|e| e.meta.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolMeta> {
        self.entries.iter().find(|e| e.meta.name == name).map(|e| &e.meta)
    }

    /// Dispatch a call by name.
    pub async fn call(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let handler = self
            .entries
            .iter()
            .find(|e| e.meta.name == name)
            .map(|e| e.handler.clone())
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        info!(tool = name, "tool call");
        let result = handler(args).await;
        if let Err(ref e) = result {
            warn!(tool = name, kind = e.kind(), error = %e, "tool call failed");
        }
        result
    }
}

/// Bind a builtin implementation to the run context.
fn bind<F, Fut>(ctx: &Arc<RunContext>, f: F) -> ToolHandler
where
    F: Fn(Arc<RunContext>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    let ctx = ctx.clone();
    Arc::new(
        move |args: Value| -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>> {
            Box::pin(f(ctx.clone(), args))
        },
    )
}

/// Build the tool set for one run.
///
/// The catalogue is the same whether or not the lesson pipeline is
/// enforced; enforcement only changes what individual calls accept.
/// Construction has no side effects.
pub fn build_tools(ctx: Arc<RunContext>) -> ToolSet {
    use builtins::*;

    let mut set = ToolSet::default();
    set.register(publish_lesson::meta(), bind(&ctx, publish_lesson::publish_lesson));
    set.register(python_exec::meta(), bind(&ctx, python_exec::python_exec));
    set.register(generate_text::meta(), bind(&ctx, generate_text::generate_text));
    set.register(list_files::meta(), bind(&ctx, list_files::list_files));
    set.register(read_file::meta(), bind(&ctx, read_file::read_file));
    set.register(read_file::meta_many(), bind(&ctx, read_file::read_files));
    set.register(write_file::meta(), bind(&ctx, write_file::write_file));
    set.register(move_file::delete_meta(), bind(&ctx, move_file::delete_file));
    set.register(move_file::move_meta(), bind(&ctx, move_file::move_file));
    set.register(apply_patch::meta(), bind(&ctx, apply_patch::apply_patch));

    tracing::debug!(
        tools = ?set.names(),
        enforce_lesson_pipeline = ctx.enforce_lesson_pipeline,
        "tool set built"
    );
    set
}

// ── Workspace sandboxing ─────────────────────────────────────

/// Resolve `raw` against `workspace` and ensure the result lives
/// inside the workspace.  Returns the canonicalized path on success.
///
/// Absolute paths and paths with a `..` component are rejected outright;
/// symlinks pointing outside are caught after canonicalization.
pub fn sandbox_path(workspace: &Path, raw: &str) -> Result<PathBuf, ToolError> {
    let unified = raw.replace('\\', "/");
    if unified.trim().is_empty() {
        return Err(ToolError::PathEscape("empty path is not allowed".into()));
    }
    if unified.starts_with('/') || Path::new(&unified).is_absolute() {
        return Err(ToolError::PathEscape(format!(
            "absolute paths are not allowed: {raw}"
        )));
    }
    if Path::new(&unified)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(ToolError::PathEscape(format!(
            "path traversal ('..') is not allowed: {raw}"
        )));
    }

    let ws_canon = workspace
        .canonicalize()
        .map_err(|e| ToolError::io("workspace canonicalize failed", e))?;

    // The file may not exist yet (writes), so resolve through the
    // nearest existing ancestor.
    let resolved = canon_or_resolve(&workspace.join(&unified))?;

    if !resolved.starts_with(&ws_canon) {
        return Err(ToolError::PathEscape(format!(
            "path escapes workspace: {raw}"
        )));
    }
    Ok(resolved)
}

/// Symlink hops followed by hand before giving up.
const MAX_LINK_DEPTH: usize = 40;

/// Best-effort canonicalize: if the full path doesn't exist yet,
/// canonicalize the longest existing prefix and append the rest.
///
/// Dangling symlinks count as existing entries and are followed to
/// their target, since a later write through them lands there.
fn canon_or_resolve(p: &Path) -> Result<PathBuf, ToolError> {
    resolve_at_depth(p, 0)
}

fn resolve_at_depth(p: &Path, depth: usize) -> Result<PathBuf, ToolError> {
    let unresolvable = || ToolError::PathEscape(format!("cannot resolve path: {}", p.display()));

    let mut existing = p.to_path_buf();
    let mut tail = Vec::new();
    let meta = loop {
        match std::fs::symlink_metadata(&existing) {
            Ok(meta) => break meta,
            Err(_) => {
                tail.push(existing.file_name().ok_or_else(unresolvable)?.to_os_string());
                existing = existing.parent().ok_or_else(unresolvable)?.to_path_buf();
            }
        }
    };

    let mut resolved = if meta.file_type().is_symlink() && !existing.exists() {
        if depth >= MAX_LINK_DEPTH {
            return Err(ToolError::PathEscape(format!(
                "too many levels of symbolic links: {}",
                p.display()
            )));
        }
        let target = std::fs::read_link(&existing)
            .map_err(|e| ToolError::io(format!("cannot read link {}", existing.display()), e))?;
        // A relative target is relative to the link's directory; an
        // absolute one replaces it on join.
        let target = match existing.parent() {
            Some(dir) => dir.join(target),
            None => target,
        };
        resolve_at_depth(&target, depth + 1)?
    } else {
        existing
            .canonicalize()
            .map_err(|e| ToolError::io(format!("cannot resolve {}", existing.display()), e))?
    };
    for component in tail.into_iter().rev() {
        resolved.push(component);
    }
    Ok(resolved)
}

/// Truncate a UTF-8 `String` to at most `max_bytes` on a char boundary.
pub(crate) fn truncate_utf8_owned(mut s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    s
}

/// Write `content` to a sandboxed path, creating parent directories.
pub(crate) async fn write_sandboxed(
    root: &Path,
    rel: &str,
    content: &str,
) -> Result<PathBuf, ToolError> {
    let abs = sandbox_path(root, rel)?;
    if let Some(parent) = abs.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ToolError::io(format!("cannot create parent directory for {rel}"), e))?;
    }
    tokio::fs::write(&abs, content)
        .await
        .map_err(|e| ToolError::io(format!("cannot write {rel}"), e))?;
    Ok(abs)
}

/// Read a sandboxed file as UTF-8; a missing file is [`ToolError::NotFound`].
pub(crate) async fn read_sandboxed(root: &Path, rel: &str) -> Result<String, ToolError> {
    let abs = sandbox_path(root, rel)?;
    match tokio::fs::read_to_string(&abs).await {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ToolError::NotFound(format!("file not found: {rel}")))
        }
        Err(e) => Err(ToolError::io(format!("cannot read {rel}"), e)),
    }
}
