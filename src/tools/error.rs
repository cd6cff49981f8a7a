//! Typed tool failures.

use thiserror::Error;

use crate::models::GenerationError;

/// Every way a tool call can fail.
///
/// [`kind`](ToolError::kind) gives callers a stable tag so schema errors
/// can be told apart from policy denials without string matching.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments did not match the tool's schema.
    #[error("{0}")]
    InvalidArgs(String),

    /// The lesson pipeline guard or the grading gate refused the call.
    #[error("{0}")]
    Policy(String),

    /// Absolute path, `..` component or symlink escape.
    #[error("{0}")]
    PathEscape(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The workspace collaborator failed a delete or move.
    #[error("{0}")]
    Workspace(String),

    #[error("text generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Generated output was rejected before being written.
    #[error("{0}")]
    InvalidOutput(String),

    #[error("{0}")]
    Publish(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgs(_) => "validation",
            Self::Policy(_) => "policy",
            Self::PathEscape(_) => "path",
            Self::NotFound(_) => "not_found",
            Self::Io { .. } => "io",
            Self::Workspace(_) => "workspace",
            Self::Generation(_) => "generation",
            Self::InvalidOutput(_) => "invalid_output",
            Self::Publish(_) => "publish",
            Self::UnknownTool(_) => "unknown_tool",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(ToolError::InvalidArgs("x".into()).kind(), "validation");
        assert_eq!(ToolError::Policy("x".into()).kind(), "policy");
        assert_eq!(
            ToolError::from(GenerationError::http(500, "boom")).kind(),
            "generation"
        );
    }

    #[test]
    fn io_display_includes_context() {
        let e = ToolError::io(
            "cannot read a.md",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(e.to_string(), "cannot read a.md: gone");
    }
}
