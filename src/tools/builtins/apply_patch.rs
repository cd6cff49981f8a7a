//! Built-in `apply_patch` tool.
//!
//! Applies a batch of file operations all-or-nothing: every new file body
//! is computed in memory first, and disk is only touched once the whole
//! batch has been validated.
//!
//! `update_file` diffs are unified-diff-like hunks:
//!
//! ```text
//! @@ -3,2 +3,2 @@ ## Objectives
//!  context line
//! -removed line
//! +added line
//! ```
//!
//! `@@` headers are optional and any text after them is used as an
//! anchor to locate the hunk.  `---` / `+++` file headers and `*** `
//! envelope lines are ignored.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::lesson::normalize_rel_path;
use crate::tools::args::{parse_args, schema_of, ApplyPatchArgs, PatchOpKind};
use crate::tools::guard::{check_direct_write, WriteVia};
use crate::tools::{sandbox_path, write_sandboxed, RunContext, ToolError, ToolMeta};

/// Planned end state of one file.
struct Staged {
    rel: String,
    /// `None` means the file is deleted.
    content: Option<String>,
    existed: bool,
}

pub async fn apply_patch(ctx: Arc<RunContext>, args: Value) -> Result<Value, ToolError> {
    let args: ApplyPatchArgs = parse_args("apply_patch", args)?;
    if args.operations.is_empty() {
        return Err(ToolError::InvalidArgs(
            "apply_patch: `operations` must not be empty".into(),
        ));
    }
    for op in &args.operations {
        check_direct_write(&ctx, &op.path, WriteVia::ApplyPatch)?;
    }

    // Phase 1: compute every result without touching disk.
    let mut staged: BTreeMap<PathBuf, Staged> = BTreeMap::new();
    let mut applied = Vec::with_capacity(args.operations.len());
    for op in &args.operations {
        let abs = sandbox_path(&ctx.root_dir, &op.path)?;
        let rel = normalize_rel_path(&op.path);
        let current = match staged.get(&abs) {
            Some(s) => s.content.clone(),
            None => read_existing(&abs, &rel).await?,
        };
        let fail = |msg: String| ToolError::InvalidArgs(format!("apply_patch: {rel}: {msg}"));

        let next = match op.kind {
            PatchOpKind::CreateFile => {
                if current.is_some() {
                    return Err(fail("file already exists".into()));
                }
                Some(create_body(op.diff.as_deref().unwrap_or("")))
            }
            PatchOpKind::UpdateFile => {
                let Some(original) = current else {
                    return Err(ToolError::NotFound(format!("apply_patch: {rel}: file not found")));
                };
                let diff = op
                    .diff
                    .as_deref()
                    .ok_or_else(|| fail("update_file requires a diff".into()))?;
                Some(apply_hunks(&original, diff).map_err(fail)?)
            }
            PatchOpKind::DeleteFile => {
                if current.is_none() {
                    return Err(ToolError::NotFound(format!("apply_patch: {rel}: file not found")));
                }
                None
            }
        };

        let existed = staged.get(&abs).map_or(abs.is_file(), |s| s.existed);
        staged.insert(
            abs,
            Staged {
                rel: rel.clone(),
                content: next,
                existed,
            },
        );
        applied.push(json!({ "type": op.kind.as_str(), "path": rel }));
    }

    // Phase 2: commit.
    for state in staged.values() {
        match &state.content {
            Some(body) => {
                write_sandboxed(&ctx.root_dir, &state.rel, body).await?;
                ctx.notify(&state.rel);
            }
            None if state.existed => {
                ctx.workspace
                    .delete_file(&state.rel)
                    .await
                    .map_err(|e| ToolError::Workspace(format!("apply_patch: {e:#}")))?;
            }
            None => {}
        }
    }

    info!(operations = applied.len(), files = staged.len(), "patch applied");
    Ok(json!({ "applied": applied }))
}

async fn read_existing(abs: &std::path::Path, rel: &str) -> Result<Option<String>, ToolError> {
    if !abs.exists() {
        return Ok(None);
    }
    if !abs.is_file() {
        return Err(ToolError::InvalidArgs(format!("apply_patch: {rel} is not a file")));
    }
    tokio::fs::read_to_string(abs)
        .await
        .map(Some)
        .map_err(|e| ToolError::io(format!("cannot read {rel}"), e))
}

fn is_envelope(line: &str) -> bool {
    line.starts_with("*** ") || line.starts_with("\\ No newline")
}

fn is_file_header(line: &str) -> bool {
    line.starts_with("--- ") || line.starts_with("+++ ") || line == "---" || line == "+++"
}

/// Body of a `create_file` operation: the `+` lines if there are any,
/// otherwise the diff verbatim.
pub(crate) fn create_body(diff: &str) -> String {
    let normalized = diff.replace("\r\n", "\n");
    let lines: Vec<&str> = normalized
        .lines()
        .filter(|l| !is_envelope(l) && !is_file_header(l) && !l.starts_with("@@"))
        .collect();
    if !lines.iter().any(|l| l.starts_with('+')) {
        return diff.to_string();
    }
    let mut body = lines
        .iter()
        .filter_map(|l| l.strip_prefix('+'))
        .collect::<Vec<_>>()
        .join("\n");
    body.push('\n');
    body
}

#[derive(Debug, Default)]
struct Hunk {
    anchor: Option<String>,
    old: Vec<String>,
    new: Vec<String>,
}

fn parse_hunks(diff: &str) -> Vec<Hunk> {
    let normalized = diff.replace("\r\n", "\n");
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in normalized.lines() {
        if is_envelope(line) {
            continue;
        }
        // File headers only appear before the first hunk line.
        if current.is_none() && is_file_header(line) {
            continue;
        }
        if let Some(header) = line.strip_prefix("@@") {
            if let Some(h) = current.take() {
                hunks.push(h);
            }
            current = Some(Hunk {
                anchor: hunk_anchor(header),
                ..Hunk::default()
            });
            continue;
        }
        let hunk = current.get_or_insert_with(Hunk::default);
        if let Some(rest) = line.strip_prefix('+') {
            hunk.new.push(rest.to_string());
        } else if let Some(rest) = line.strip_prefix('-') {
            hunk.old.push(rest.to_string());
        } else {
            let rest = line.strip_prefix(' ').unwrap_or(line);
            hunk.old.push(rest.to_string());
            hunk.new.push(rest.to_string());
        }
    }
    if let Some(h) = current {
        hunks.push(h);
    }
    hunks
        .into_iter()
        .filter(|h| !h.old.is_empty() || !h.new.is_empty())
        .collect()
}

/// Anchor text from a `@@` header: `@@ -1,2 +1,3 @@ text` or `@@ text`.
fn hunk_anchor(header: &str) -> Option<String> {
    let rest = header.trim();
    let text = if rest.starts_with('-') {
        rest.find("@@").map_or("", |i| &rest[i + 2..])
    } else {
        rest.trim_end_matches('@')
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn find_block(lines: &[String], block: &[String], from: usize) -> Option<usize> {
    if block.is_empty() || block.len() > lines.len() {
        return None;
    }
    let last = lines.len() - block.len();
    let matches_at = |p: usize, eq: &dyn Fn(&str, &str) -> bool| {
        lines[p..p + block.len()]
            .iter()
            .zip(block)
            .all(|(a, b)| eq(a, b))
    };
    let exact = |a: &str, b: &str| a == b;
    let loose = |a: &str, b: &str| a.trim_end() == b.trim_end();
    for eq in [&exact as &dyn Fn(&str, &str) -> bool, &loose] {
        for start in [from, 0] {
            if start > last {
                continue;
            }
            if let Some(p) = (start..=last).find(|&p| matches_at(p, eq)) {
                return Some(p);
            }
        }
    }
    None
}

/// Apply unified-diff-like hunks to `original`.
pub(crate) fn apply_hunks(original: &str, diff: &str) -> Result<String, String> {
    let hunks = parse_hunks(diff);
    if hunks.is_empty() {
        return Err("diff contains no hunks".into());
    }
    let trailing_newline = original.is_empty() || original.ends_with('\n');
    let mut lines: Vec<String> = original.lines().map(String::from).collect();
    let mut cursor = 0;

    for hunk in &hunks {
        let mut from = cursor;
        if let Some(anchor) = &hunk.anchor {
            match lines
                .iter()
                .enumerate()
                .skip(cursor)
                .chain(lines.iter().enumerate().take(cursor))
                .find(|(_, l)| l.contains(anchor.as_str()))
            {
                Some((i, _)) => from = i,
                None => return Err(format!("anchor not found: {anchor:?}")),
            }
        }

        let at = if hunk.old.is_empty() {
            // Pure insertion: after the anchor line, or at end of file.
            if hunk.anchor.is_some() {
                (from + 1).min(lines.len())
            } else {
                lines.len()
            }
        } else {
            find_block(&lines, &hunk.old, from).ok_or_else(|| {
                format!(
                    "hunk context not found: {:?}",
                    hunk.old.first().map(String::as_str).unwrap_or("")
                )
            })?
        };

        lines.splice(at..at + hunk.old.len(), hunk.new.iter().cloned());
        cursor = at + hunk.new.len();
    }

    let mut out = lines.join("\n");
    if trailing_newline && !out.is_empty() {
        out.push('\n');
    }
    Ok(out)
}

pub fn meta() -> ToolMeta {
    ToolMeta {
        name: "apply_patch".into(),
        description: "Apply create_file / update_file / delete_file operations atomically. \
                      update_file takes unified-diff style hunks (' ' context, '-' removed, '+' added)."
            .into(),
        args_schema: schema_of::<ApplyPatchArgs>(),
    }
}
