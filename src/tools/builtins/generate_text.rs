//! Built-in `generate_text` tool.
//!
//! The only sanctioned way to produce JSON artifacts in the protected
//! lesson zones, so it is never subject to the direct-write guard.  The
//! outbound call goes through the shared [`CallScheduler`] for spacing
//! and retries.
//!
//! [`CallScheduler`]: crate::scheduler::CallScheduler

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_stream::StreamExt as _;
use tracing::{debug, info};

use crate::lesson::normalize_rel_path;
use crate::models::{GenerationError, GenerationRequest, InputFile};
use crate::tools::args::{parse_args, schema_of, RawGenerateTextArgs};
use crate::tools::{read_sandboxed, sandbox_path, write_sandboxed, RunContext, ToolError, ToolMeta};

/// Args: `{ promptPath, outputPath, inputPaths?, tools?, modelId? }`
/// Returns: `{ outputPath, bytes, modelId }`
pub async fn generate_text(ctx: Arc<RunContext>, args: Value) -> Result<Value, ToolError> {
    let args = parse_args::<RawGenerateTextArgs>("generate_text", args)?.normalize()?;

    sandbox_path(&ctx.root_dir, &args.output_path)?;
    let prompt = read_sandboxed(&ctx.root_dir, &args.prompt_path).await?;
    let mut inputs = Vec::new();
    for p in args.input_paths.iter().flatten() {
        inputs.push(InputFile {
            path: normalize_rel_path(p),
            content: read_sandboxed(&ctx.root_dir, p).await?,
        });
    }

    let request = Arc::new(GenerationRequest {
        model: args.model_id.clone().unwrap_or_else(|| ctx.default_model.clone()),
        prompt,
        inputs,
        tools: args.tools.clone().unwrap_or_default(),
    });
    debug!(
        model = %request.model,
        inputs = request.inputs.len(),
        tools = ?request.tools,
        "scheduling generation"
    );

    let generator = ctx.generator.clone();
    let req = request.clone();
    let text = ctx
        .scheduler
        .schedule(move || {
            let generator = generator.clone();
            let req = req.clone();
            async move {
                let mut stream = generator.generate_stream(&req);
                let mut out = String::new();
                while let Some(chunk) = stream.next().await {
                    out.push_str(&chunk?);
                }
                Ok::<_, GenerationError>(out)
            }
        })
        .await?;

    let output_path = normalize_rel_path(&args.output_path);
    let body = if output_path.to_ascii_lowercase().ends_with(".json") {
        let inner = strip_code_fence(&text);
        if let Err(e) = serde_json::from_str::<Value>(inner) {
            return Err(ToolError::InvalidOutput(format!(
                "generate_text: model output for {output_path} is not valid JSON: {e}"
            )));
        }
        let mut inner = inner.to_string();
        inner.push('\n');
        inner
    } else {
        text
    };

    write_sandboxed(&ctx.root_dir, &output_path, &body).await?;
    ctx.notify(&output_path);

    info!(output = %output_path, model = %request.model, bytes = body.len(), "text generated");
    Ok(json!({
        "outputPath": output_path,
        "bytes": body.len(),
        "modelId": request.model,
    }))
}

/// Strip one surrounding markdown code fence (```` ```json ```` or bare
/// ```` ``` ````) from a model reply.  Unfenced text is returned trimmed.
pub(crate) fn strip_code_fence(reply: &str) -> &str {
    let text = reply.trim();
    let Some(after_open) = text.strip_prefix("```") else {
        return text;
    };
    let Some(nl) = after_open.find('\n') else {
        return text;
    };
    let inner = &after_open[nl + 1..];
    match inner.rfind("```") {
        Some(close) => inner[..close].trim(),
        None => text,
    }
}

pub fn meta() -> ToolMeta {
    ToolMeta {
        name: "generate_text".into(),
        description: "Generate text with the language model from a prompt file (plus optional input files) \
                      and write it to outputPath. Required for JSON under lesson/output/ and lesson/feedback/. \
                      For a .json outputPath, one surrounding markdown code fence is stripped, the reply must \
                      parse as JSON (otherwise the call fails with invalid_output and nothing is written), \
                      and a trailing newline is added."
            .into(),
        args_schema: schema_of::<RawGenerateTextArgs>(),
    }
}
