//! Built-in tool implementations.
//!
//! Each sub-module implements one (or a small family of) tool(s) the
//! agent can invoke, plus the [`ToolMeta`](super::ToolMeta) it is
//! advertised with.

pub mod apply_patch;
pub mod generate_text;
pub mod list_files;
pub mod move_file;
pub mod publish_lesson;
pub mod python_exec;
pub mod read_file;
pub mod write_file;
