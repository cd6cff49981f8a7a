//! Session grading report reader.
//!
//! The publish gate requires `lesson/feedback/session-grade.json` (checked
//! first) or `lesson/feedback/session-grade.md` to exist and to report a
//! pass.  JSON reports carry a `pass` boolean; markdown reports carry a
//! textual marker such as `pass: false` or `**Pass:** true`.

use std::path::Path;

use anyhow::Context;
use serde_json::Value;

pub const SESSION_GRADE_JSON: &str = "lesson/feedback/session-grade.json";
pub const SESSION_GRADE_MD: &str = "lesson/feedback/session-grade.md";

/// A parsed grading report.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReport {
    pub pass: bool,
    /// Workspace-relative path of the report file.
    pub raw_path: String,
    /// Explanation carried by the report, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of looking up the session grading report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradeLookup {
    Found(GradeReport),
    Missing,
    /// The report exists but carries no recognisable pass/fail marker.
    Unreadable { raw_path: String, detail: String },
}

/// Locate and parse the grading report under `root`.
pub async fn find_session_grade(root: &Path) -> anyhow::Result<GradeLookup> {
    for (rel, parse) in [
        (SESSION_GRADE_JSON, parse_json_report as fn(&str, &str) -> Result<GradeReport, String>),
        (SESSION_GRADE_MD, parse_markdown_report),
    ] {
        let abs = root.join(rel);
        if !abs.is_file() {
            continue;
        }
        let text = tokio::fs::read_to_string(&abs)
            .await
            .with_context(|| format!("cannot read grading report {rel}"))?;
        return Ok(match parse(rel, &text) {
            Ok(report) => GradeLookup::Found(report),
            Err(detail) => GradeLookup::Unreadable {
                raw_path: rel.to_string(),
                detail,
            },
        });
    }
    Ok(GradeLookup::Missing)
}

/// Parse a JSON report: `{ "pass": bool, "reason"?: string }`.
///
/// `pass` may also be the string `"true"` / `"false"`.  The reason is
/// taken from `reason`, `summary` or `feedback`, first match wins.
pub fn parse_json_report(raw_path: &str, text: &str) -> Result<GradeReport, String> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;
    let pass = match value.get("pass") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
        _ => return Err("missing boolean `pass` field".into()),
    };
    let reason = ["reason", "summary", "feedback"]
        .iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    Ok(GradeReport {
        pass,
        raw_path: raw_path.to_string(),
        reason,
    })
}

/// Parse a markdown report by scanning for a `pass` marker line.
pub fn parse_markdown_report(raw_path: &str, text: &str) -> Result<GradeReport, String> {
    let mut pass = None;
    let mut reason = None;
    for line in text.lines() {
        if pass.is_none() {
            if let Some(value) = marker_value(line, &["passed", "pass"]) {
                pass = match value.split_whitespace().next().unwrap_or("") {
                    "true" | "yes" | "pass" | "passed" => Some(true),
                    "false" | "no" | "fail" | "failed" => Some(false),
                    _ => None,
                };
            }
        }
        if reason.is_none() {
            if let Some(value) = marker_value_raw(line, &["reason", "summary"]) {
                if !value.is_empty() {
                    reason = Some(value);
                }
            }
        }
    }
    let pass = pass.ok_or_else(|| "no `pass: true|false` marker found".to_string())?;
    Ok(GradeReport {
        pass,
        raw_path: raw_path.to_string(),
        reason,
    })
}

const MARKUP: &[char] = &['#', '-', '*', '_', '`', '>', ' ', '\t'];

/// Lower-cased value after `<key>:` / `<key>=` on `line`, if present.
fn marker_value(line: &str, keys: &[&str]) -> Option<String> {
    marker_value_raw(&line.to_lowercase(), keys).map(|v| v.to_lowercase())
}

/// Value (original case) after `<key>:` / `<key>=`, markup stripped.
fn marker_value_raw(line: &str, keys: &[&str]) -> Option<String> {
    let body = line.trim_start_matches(MARKUP);
    let lower = body.to_lowercase();
    let key = keys.iter().find(|k| lower.starts_with(*k))?;
    let rest = body[key.len()..].trim_start_matches(MARKUP);
    let rest = rest.strip_prefix(':').or_else(|| rest.strip_prefix('='))?;
    Some(
        rest.trim_start_matches(MARKUP)
            .trim_end_matches(MARKUP)
            .trim()
            .to_string(),
    )
}
