//! Lesson pipeline guard and grading gate.

use std::path::Path;

use tracing::warn;

use super::{RunContext, ToolError};
use crate::lesson::grading::{find_session_grade, GradeLookup, GradeReport, SESSION_GRADE_JSON, SESSION_GRADE_MD};
use crate::lesson::{normalize_rel_path, protected_zone};

/// How a tool is trying to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteVia {
    WriteFile,
    ApplyPatch,
}

/// Refuse direct writes to protected lesson JSON while enforcement is on.
pub fn check_direct_write(ctx: &RunContext, path: &str, via: WriteVia) -> Result<(), ToolError> {
    if !ctx.enforce_lesson_pipeline {
        return Ok(());
    }
    let Some(zone) = protected_zone(path) else {
        return Ok(());
    };
    let path = normalize_rel_path(path);
    warn!(path = %path, zone, ?via, "direct write to protected lesson zone refused");
    let message = match via {
        WriteVia::WriteFile => format!(
            "Direct writes to {path} are blocked while the lesson pipeline is enforced. \
             Use generate_text to produce JSON under {zone}."
        ),
        WriteVia::ApplyPatch => format!(
            "Direct patch writes to {path} are blocked while the lesson pipeline is enforced. \
             Use generate_text to produce JSON under {zone}."
        ),
    };
    Err(ToolError::Policy(message))
}

/// Require a passing session grading report under `root`.
pub async fn require_passing_grade(root: &Path) -> Result<GradeReport, ToolError> {
    let lookup = find_session_grade(root)
        .await
        .map_err(|e| ToolError::Policy(format!("cannot read session grading report: {e:#}")))?;
    match lookup {
        GradeLookup::Found(report) if report.pass => Ok(report),
        GradeLookup::Found(report) => {
            let reason = report
                .reason
                .as_deref()
                .map(|r| format!(" Reason: {r}"))
                .unwrap_or_default();
            Err(ToolError::Policy(format!(
                "Session grading report {} has pass=false; fix the lesson and re-grade before publishing.{reason}",
                report.raw_path
            )))
        }
        GradeLookup::Missing => Err(ToolError::Policy(format!(
            "Missing required session grading report. Write {SESSION_GRADE_JSON} \
             (or {SESSION_GRADE_MD}) with a pass verdict before publishing."
        ))),
        GradeLookup::Unreadable { raw_path, detail } => Err(ToolError::Policy(format!(
            "Session grading report {raw_path} could not be read: {detail}"
        ))),
    }
}
