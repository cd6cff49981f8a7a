//! Text-generation capability.
//!
//! Defines the [`TextGenerator`] trait consumed by the `generate_text`
//! tool, the [`GenerationRequest`] it receives, and the
//! [`GenerationError`] shape the call scheduler classifies for retry.
//! [`HttpGenerator`] is the concrete OpenAI-compatible backend.

pub mod http;

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use thiserror::Error;

pub use http::HttpGenerator;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A workspace file handed to the model as extra context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Workspace-relative path, shown to the model as the file label.
    pub path: String,
    pub content: String,
}

/// Everything one outbound generation call needs.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub inputs: Vec<InputFile>,
    /// Provider-side tool names (e.g. `"web-search"`).
    pub tools: Vec<String>,
}

impl GenerationRequest {
    /// Render prompt plus input files as a single user message.
    ///
    /// Each input is appended under a `### <path>` heading inside a
    /// fenced block so the model can cite files by name.
    pub fn render_user_message(&self) -> String {
        if self.inputs.is_empty() {
            return self.prompt.clone();
        }
        let mut out = self.prompt.trim_end().to_string();
        out.push_str("\n\n## Input files\n");
        for input in &self.inputs {
            out.push_str(&format!(
                "\n### {}\n```\n{}\n```\n",
                input.path,
                input.content.trim_end_matches('\n')
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Transport error codes recognised as transient by the scheduler.
pub const CODE_CONNECTION_RESET: &str = "ECONNRESET";
pub const CODE_TIMED_OUT: &str = "ETIMEDOUT";
pub const CODE_DNS_RETRY: &str = "EAI_AGAIN";
pub const CODE_SOCKET_TIMED_OUT: &str = "ESOCKETTIMEDOUT";
/// Set by the scheduler when a job task died before reporting.
pub const CODE_SCHEDULER_ABORTED: &str = "SCHEDULER_ABORTED";

/// Failure of an outbound generation call.
///
/// Carries whatever the backend could extract: an HTTP status, a
/// provider reason code (`RESOURCE_EXHAUSTED`, …), a transport error
/// code (`ECONNRESET`, …) and a human-readable message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GenerationError {
    pub status: Option<u16>,
    pub reason: Option<String>,
    pub code: Option<String>,
    pub message: String,
}

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            reason: None,
            code: None,
            message: message.into(),
        }
    }

    /// Error carrying an HTTP status.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(message)
        }
    }

    /// Error carrying a transport error code.
    pub fn transport(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.to_string()),
            ..Self::new(message)
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

// ---------------------------------------------------------------------------
// TextGenerator trait
// ---------------------------------------------------------------------------

/// Trait implemented by every text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate the full reply for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Generate the reply as a stream of content deltas.
    ///
    /// The default implementation calls [`generate`](Self::generate) and
    /// yields the whole reply as a single chunk.  Backends with real SSE
    /// streaming override this.
    fn generate_stream<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send + 'a>> {
        Box::pin(async_stream::stream! {
            yield self.generate(request).await;
        })
    }
}
