//! Lesson pipeline rules.
//!
//! Generated lesson content lives under `lesson/output/` and grading
//! reports under `lesson/feedback/`.  JSON artifacts in those two zones
//! may only be produced by `generate_text`; see [`protected_zone`].

pub mod grading;
pub mod publish;

pub const LESSON_DIR: &str = "lesson";
pub const LESSON_OUTPUT_ZONE: &str = "lesson/output/";
pub const LESSON_FEEDBACK_ZONE: &str = "lesson/feedback/";

/// Zones whose `.json` files are reserved for the generation tool.
pub const PROTECTED_ZONES: &[&str] = &[LESSON_OUTPUT_ZONE, LESSON_FEEDBACK_ZONE];

/// Normalize an agent-supplied workspace path for comparison and
/// notification: backslashes become `/`, empty and `.` segments are
/// dropped.  `..` segments are kept so the sandbox can still reject them.
pub fn normalize_rel_path(raw: &str) -> String {
    raw.replace('\\', "/")
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Return the protected zone `path` falls into, if it names a JSON file
/// inside one.  Nested directories inside a zone are covered too.
pub fn protected_zone(path: &str) -> Option<&'static str> {
    let normalized = normalize_rel_path(path);
    if !normalized.to_ascii_lowercase().ends_with(".json") {
        return None;
    }
    PROTECTED_ZONES
        .iter()
        .copied()
        .find(|zone| normalized.starts_with(zone))
}
