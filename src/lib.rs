//! spark_agent: tool policy engine and outbound call scheduler for the
//! Spark lesson-building agent.
//!
//! This library crate re-exports modules so integration tests
//! (under `tests/`) can access them.

pub mod cli;
pub mod config;
pub mod lesson;
pub mod models;
pub mod scheduler;
pub mod tools;
pub mod workspace;

/// Return the Spark home directory.
///
/// Resolution order:
/// 1. `SPARK_HOME` environment variable
/// 2. `$HOME/.spark`
pub fn spark_home() -> std::path::PathBuf {
    if let Ok(p) = std::env::var("SPARK_HOME") {
        std::path::PathBuf::from(p)
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".spark")
    }
}
