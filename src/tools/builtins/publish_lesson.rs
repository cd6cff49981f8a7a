//! Built-in `publish_lesson` tool, gated on a passing session grade.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::lesson::publish::LessonBundle;
use crate::tools::args::{parse_args, schema_of, PublishLessonArgs};
use crate::tools::guard::require_passing_grade;
use crate::tools::{RunContext, ToolError, ToolMeta};

/// Args: `{ "sessionId": "…" }`
/// Returns: `{ "published": true, "sessionId", "gradeReport" }`
pub async fn publish_lesson(ctx: Arc<RunContext>, args: Value) -> Result<Value, ToolError> {
    let session_id = parse_args::<PublishLessonArgs>("publish_lesson", args)?.normalize()?;
    let grade = require_passing_grade(&ctx.root_dir).await?;

    let bundle = LessonBundle {
        session_id: session_id.clone(),
        user_id: ctx.user_id.clone(),
        root_dir: ctx.root_dir.clone(),
        grade: grade.clone(),
    };
    ctx.publisher
        .publish(&bundle)
        .await
        .map_err(|e| ToolError::Publish(format!("publish_lesson: {e:#}")))?;

    info!(session_id = %session_id, user_id = %ctx.user_id, report = %grade.raw_path, "lesson published");
    Ok(json!({
        "published": true,
        "sessionId": session_id,
        "gradeReport": grade,
    }))
}

pub fn meta() -> ToolMeta {
    ToolMeta {
        name: "publish_lesson".into(),
        description: "Publish the finished lesson. Requires lesson/feedback/session-grade.json (or .md) \
                      reporting a pass."
            .into(),
        args_schema: schema_of::<PublishLessonArgs>(),
    }
}
