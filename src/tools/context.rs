//! Per-run state shared by every tool handler.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::lesson::normalize_rel_path;
use crate::lesson::publish::LessonPublisher;
use crate::models::TextGenerator;
use crate::scheduler::CallScheduler;
use crate::tools::runner::CodeRunner;
use crate::workspace::WorkspaceSync;

/// Everything a tool call may touch during one agent run.
///
/// Built by the caller and handed to [`build_tools`](super::build_tools);
/// the collaborators are injected so tests can substitute stubs.
#[derive(Clone)]
pub struct RunContext {
    pub root_dir: PathBuf,
    pub user_id: String,
    /// Service-account credentials supplied by the host.  Never logged.
    pub service_account_json: Option<String>,
    pub enforce_lesson_pipeline: bool,
    /// Model used by `generate_text` when no `modelId` is given.
    pub default_model: String,
    pub workspace: Arc<dyn WorkspaceSync>,
    pub scheduler: CallScheduler,
    pub generator: Arc<dyn TextGenerator>,
    pub code_runner: Arc<dyn CodeRunner>,
    pub publisher: Arc<dyn LessonPublisher>,
}

impl RunContext {
    /// Tell the workspace collaborator that `path` changed.
    pub(crate) fn notify(&self, path: &str) {
        self.workspace.schedule_update(&normalize_rel_path(path));
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("root_dir", &self.root_dir)
            .field("user_id", &self.user_id)
            .field(
                "service_account_json",
                &self.service_account_json.as_ref().map(|_| "<redacted>"),
            )
            .field("enforce_lesson_pipeline", &self.enforce_lesson_pipeline)
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}
