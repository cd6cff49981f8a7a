//! Workspace sync collaborator.
//!
//! Tools never persist anything upstream themselves; after every effect
//! they notify a [`WorkspaceSync`] implementation.  `schedule_update` is a
//! one-way, fire-and-forget marker so tool execution is decoupled from
//! persistence timing.
//!
//! [`LocalWorkspace`] is the on-disk implementation: it performs deletes
//! and moves under the run root, keeps a set of paths pending upstream
//! sync, and optionally publishes [`SyncEvent`]s on a bounded channel.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::tools::sandbox_path;

/// Collaborator notified about every workspace mutation.
#[async_trait]
pub trait WorkspaceSync: Send + Sync {
    /// Mark `path` as changed.  Must not block.
    fn schedule_update(&self, path: &str);

    async fn delete_file(&self, path: &str) -> anyhow::Result<()>;

    async fn move_file(&self, from_path: &str, to_path: &str) -> anyhow::Result<()>;
}

/// A change waiting to be persisted upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingSync {
    Write,
    Delete,
}

/// Notification emitted by [`LocalWorkspace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Updated(String),
    Deleted(String),
    Moved { from: String, to: String },
}

/// On-disk workspace rooted at one directory.
pub struct LocalWorkspace {
    root: PathBuf,
    pending: Mutex<BTreeMap<String, PendingSync>>,
    events: Option<mpsc::Sender<SyncEvent>>,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pending: Mutex::new(BTreeMap::new()),
            events: None,
        }
    }

    /// Like [`new`](Self::new), also returning a receiver for sync events.
    ///
    /// Events are dropped (with a warning) when the channel is full.
    pub fn with_events(root: impl Into<PathBuf>, capacity: usize) -> (Self, mpsc::Receiver<SyncEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let mut ws = Self::new(root);
        ws.events = Some(tx);
        (ws, rx)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot of paths awaiting upstream sync, sorted by path.
    pub fn pending(&self) -> Vec<(String, PendingSync)> {
        self.lock_pending()
            .iter()
            .map(|(p, k)| (p.clone(), *k))
            .collect()
    }

    /// Drain and return the pending set.
    pub fn take_pending(&self) -> Vec<(String, PendingSync)> {
        std::mem::take(&mut *self.lock_pending()).into_iter().collect()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, PendingSync>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mark(&self, path: &str, kind: PendingSync) {
        self.lock_pending().insert(path.to_string(), kind);
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.try_send(event) {
                warn!(error = %e, "workspace sync event dropped");
            }
        }
    }
}

#[async_trait]
impl WorkspaceSync for LocalWorkspace {
    fn schedule_update(&self, path: &str) {
        debug!(path, "workspace update scheduled");
        self.mark(path, PendingSync::Write);
        self.emit(SyncEvent::Updated(path.to_string()));
    }

    async fn delete_file(&self, path: &str) -> anyhow::Result<()> {
        let abs = sandbox_path(&self.root, path)?;
        let meta = tokio::fs::metadata(&abs)
            .await
            .with_context(|| format!("cannot delete {path}"))?;
        if meta.is_dir() {
            anyhow::bail!("cannot delete {path}: is a directory");
        }
        tokio::fs::remove_file(&abs)
            .await
            .with_context(|| format!("cannot delete {path}"))?;
        self.mark(path, PendingSync::Delete);
        self.emit(SyncEvent::Deleted(path.to_string()));
        Ok(())
    }

    async fn move_file(&self, from_path: &str, to_path: &str) -> anyhow::Result<()> {
        let from = sandbox_path(&self.root, from_path)?;
        let to = sandbox_path(&self.root, to_path)?;
        if !from.is_file() {
            anyhow::bail!("cannot move {from_path}: no such file");
        }
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create parent directory for {to_path}"))?;
        }
        tokio::fs::rename(&from, &to)
            .await
            .with_context(|| format!("cannot move {from_path} to {to_path}"))?;
        self.mark(from_path, PendingSync::Delete);
        self.mark(to_path, PendingSync::Write);
        self.emit(SyncEvent::Moved {
            from: from_path.to_string(),
            to: to_path.to_string(),
        });
        Ok(())
    }
}
