//! Lesson publish sink.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::grading::GradeReport;
use super::LESSON_DIR;

/// Name of the manifest written next to published lesson files.
pub const MANIFEST_FILE: &str = "published.json";

/// What `publish_lesson` hands to the sink once the gate has passed.
#[derive(Debug, Clone)]
pub struct LessonBundle {
    pub session_id: String,
    pub user_id: String,
    /// Run root; the lesson lives under `<root_dir>/lesson/`.
    pub root_dir: PathBuf,
    pub grade: GradeReport,
}

#[async_trait]
pub trait LessonPublisher: Send + Sync {
    async fn publish(&self, bundle: &LessonBundle) -> anyhow::Result<()>;
}

/// Publishes lessons by copying them into a local directory tree,
/// `<dir>/<user_id>/<session_id>/`.  Republishing replaces the copy.
pub struct DirectoryPublisher {
    dir: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Destination directory for a bundle.
    pub fn destination(&self, bundle: &LessonBundle) -> anyhow::Result<PathBuf> {
        let user = if bundle.user_id.trim().is_empty() {
            "anonymous"
        } else {
            bundle.user_id.trim()
        };
        for (label, part) in [("user id", user), ("session id", bundle.session_id.as_str())] {
            if part.is_empty() || part.contains(['/', '\\']) || part.contains("..") {
                anyhow::bail!("invalid {label} for publish: {part:?}");
            }
        }
        Ok(self.dir.join(user).join(&bundle.session_id))
    }
}

#[async_trait]
impl LessonPublisher for DirectoryPublisher {
    async fn publish(&self, bundle: &LessonBundle) -> anyhow::Result<()> {
        let src = bundle.root_dir.join(LESSON_DIR);
        if !src.is_dir() {
            anyhow::bail!("nothing to publish: {} is missing", src.display());
        }
        let dest = self.destination(bundle)?;
        if dest.exists() {
            tokio::fs::remove_dir_all(&dest)
                .await
                .with_context(|| format!("cannot clear {}", dest.display()))?;
        }

        let files = copy_tree(&src, &dest).await?;

        let manifest = json!({
            "sessionId": bundle.session_id,
            "userId": bundle.user_id,
            "publishedAt": chrono::Utc::now().to_rfc3339(),
            "gradeReport": bundle.grade,
            "files": files,
        });
        let body = serde_json::to_string_pretty(&manifest)?;
        tokio::fs::write(dest.join(MANIFEST_FILE), body)
            .await
            .with_context(|| format!("cannot write manifest in {}", dest.display()))?;

        info!(
            session_id = %bundle.session_id,
            user_id = %bundle.user_id,
            files = files.len(),
            dest = %dest.display(),
            "lesson published"
        );
        Ok(())
    }
}

/// Copy `src` into `dest`, skipping hidden entries.  Returns the copied
/// file paths relative to `src`, sorted.
async fn copy_tree(src: &Path, dest: &Path) -> anyhow::Result<Vec<String>> {
    let mut copied = Vec::new();
    let mut stack = vec![src.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let rel_dir = dir.strip_prefix(src).unwrap_or(Path::new(""));
        let target_dir = dest.join(rel_dir);
        tokio::fs::create_dir_all(&target_dir)
            .await
            .with_context(|| format!("cannot create {}", target_dir.display()))?;

        let mut rd = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("cannot read {}", dir.display()))?;
        while let Some(entry) = rd.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            let ft = entry.file_type().await?;
            if ft.is_dir() {
                stack.push(path);
            } else if ft.is_file() {
                tokio::fs::copy(&path, target_dir.join(&name))
                    .await
                    .with_context(|| format!("cannot copy {}", path.display()))?;
                let rel = path.strip_prefix(src).unwrap_or(&path);
                copied.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    copied.sort();
    Ok(copied)
}
