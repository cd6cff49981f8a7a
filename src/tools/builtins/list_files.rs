//! Built-in `list_files` tool: list directory contents inside the run
//! workspace with optional glob filtering and recursive traversal.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::tools::args::{parse_args, schema_of, ListFilesArgs};
use crate::tools::{sandbox_path, RunContext, ToolError, ToolMeta};

const MAX_ENTRIES: usize = 1000;

/// List files in a directory, optionally with glob pattern and recursion.
///
/// Args: `{ "path": ".", "pattern": "*.md", "recursive": false }`
pub async fn list_files(ctx: Arc<RunContext>, args: Value) -> Result<Value, ToolError> {
    let args: ListFilesArgs = parse_args("list_files", args)?;
    let raw = args.path.as_deref().filter(|p| !p.trim().is_empty()).unwrap_or(".");

    let dir = sandbox_path(&ctx.root_dir, raw)?;
    if !dir.is_dir() {
        return Err(ToolError::NotFound(format!("list_files: '{raw}' is not a directory")));
    }
    let root = sandbox_path(&ctx.root_dir, ".")?;

    let mut entries: Vec<Value> = Vec::new();
    collect_entries(
        &dir,
        &root,
        args.pattern.as_deref(),
        args.recursive.unwrap_or(false),
        &mut entries,
    )
    .await?;

    // Directories first, then by path.
    entries.sort_by(|a, b| {
        let a_dir = a["type"].as_str() == Some("directory");
        let b_dir = b["type"].as_str() == Some("directory");
        b_dir
            .cmp(&a_dir)
            .then_with(|| a["path"].as_str().cmp(&b["path"].as_str()))
    });

    let truncated = entries.len() >= MAX_ENTRIES;
    Ok(json!({
        "entries": entries,
        "count": entries.len(),
        "truncated": truncated,
    }))
}

async fn collect_entries(
    dir: &Path,
    root: &Path,
    pattern: Option<&str>,
    recursive: bool,
    entries: &mut Vec<Value>,
) -> Result<(), ToolError> {
    let mut rd = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ToolError::io(format!("list_files: cannot read {}", dir.display()), e))?;

    while let Some(entry) = rd
        .next_entry()
        .await
        .map_err(|e| ToolError::io(format!("list_files: cannot read {}", dir.display()), e))?
    {
        if entries.len() >= MAX_ENTRIES {
            break;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') && !pattern.is_some_and(|p| p.starts_with('.')) {
            continue;
        }

        let is_dir = entry.file_type().await.map(|f| f.is_dir()).unwrap_or(false);
        let rel_path = entry
            .path()
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or(name.clone());

        // Directories are always listed so the agent can see where to recurse.
        if is_dir || pattern.map_or(true, |pat| glob_match(pat, &name)) {
            entries.push(json!({
                "name": name,
                "path": rel_path,
                "type": if is_dir { "directory" } else { "file" },
            }));
        }

        if recursive && is_dir && entries.len() < MAX_ENTRIES {
            Box::pin(collect_entries(&entry.path(), root, pattern, recursive, entries)).await?;
        }
    }
    Ok(())
}

/// Simple glob matching supporting `*` (any chars) and `?` (single char).
pub(crate) fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = name.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    let mut star_pi = None;
    let mut star_ti = 0;

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == text[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < pattern.len() && pattern[pi] == '*' {
            star_pi = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(sp) = star_pi {
            pi = sp + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }
    while pi < pattern.len() && pattern[pi] == '*' {
        pi += 1;
    }
    pi == pattern.len()
}

pub fn meta() -> ToolMeta {
    ToolMeta {
        name: "list_files".into(),
        description: "List files and directories inside the workspace. Supports glob patterns \
                      (e.g. '*.md') and recursive traversal."
            .into(),
        args_schema: schema_of::<ListFilesArgs>(),
    }
}
