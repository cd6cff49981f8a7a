//! Integration tests for the tool catalogue and the file tools.

mod common;

use common::harness;
use serde_json::{json, Value};
use spark_agent::workspace::PendingSync;

const EXPECTED_TOOLS: [&str; 10] = [
    "publish_lesson",
    "python_exec",
    "generate_text",
    "list_files",
    "read_file",
    "read_files",
    "write_file",
    "delete_file",
    "move_file",
    "apply_patch",
];

// ── Catalogue ────────────────────────────────────────────────

#[test]
fn catalogue_is_identical_with_and_without_enforcement() {
    let on = harness(true);
    let off = harness(false);
    assert_eq!(on.tools.names(), EXPECTED_TOOLS);
    assert_eq!(off.tools.names(), EXPECTED_TOOLS);
}

#[test]
fn every_tool_has_an_object_schema_and_description() {
    let h = harness(false);
    for meta in h.tools.list() {
        assert!(!meta.description.is_empty(), "{} has no description", meta.name);
        assert_eq!(meta.args_schema["type"], "object", "{}", meta.name);
        assert!(meta.args_schema["properties"].is_object(), "{}", meta.name);
    }
    let gen = h.tools.get("generate_text").unwrap();
    let required: Vec<&str> = gen.args_schema["required"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(required.contains(&"promptPath"));
    assert!(required.contains(&"outputPath"));
}

#[tokio::test]
async fn unknown_tool_is_rejected() {
    let h = harness(false);
    let err = h.tools.call("exec_shell", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), "unknown_tool");
}

#[tokio::test]
async fn malformed_args_fail_before_any_effect() {
    let h = harness(false);
    let err = h.tools.call("write_file", Value::Null).await.unwrap_err();
    assert_eq!(err.kind(), "validation");
    let err = h
        .tools
        .call("write_file", json!({ "path": "a.txt", "content": 5 }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(!h.path("a.txt").exists());
    assert!(h.pending().is_empty());
}

// ── write_file ───────────────────────────────────────────────

#[tokio::test]
async fn write_file_creates_parents_and_schedules_sync() {
    let h = harness(false);
    let out = h
        .tools
        .call("write_file", json!({ "path": "./notes//draft.md", "content": "hello" }))
        .await
        .expect("write_file should succeed");

    assert_eq!(out["path"], "notes/draft.md");
    assert_eq!(out["bytes"], 5);
    assert_eq!(h.read("notes/draft.md"), "hello");
    assert!(h.is_pending_write("notes/draft.md"));
}

#[tokio::test]
async fn write_file_overwrites() {
    let h = harness(false);
    h.write("a.txt", "old");
    h.tools
        .call("write_file", json!({ "path": "a.txt", "content": "new" }))
        .await
        .unwrap();
    assert_eq!(h.read("a.txt"), "new");
}

// ── read_file / read_files ───────────────────────────────────

#[tokio::test]
async fn read_file_full_and_range() {
    let h = harness(false);
    h.write("doc.md", "one\ntwo\nthree\nfour");

    let full = h.tools.call("read_file", json!({ "path": "doc.md" })).await.unwrap();
    assert_eq!(full["content"], "one\ntwo\nthree\nfour");

    let part = h
        .tools
        .call("read_file", json!({ "path": "doc.md", "startLine": 2, "endLine": 3 }))
        .await
        .unwrap();
    assert_eq!(part["content"], "two\nthree");
    assert_eq!(part["totalLines"], 4);

    let err = h
        .tools
        .call("read_file", json!({ "path": "doc.md", "startLine": 9 }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn read_file_missing_is_not_found() {
    let h = harness(false);
    let err = h.tools.call("read_file", json!({ "path": "nope.txt" })).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn read_files_accepts_string_or_array() {
    let h = harness(false);
    h.write("a.md", "A");
    h.write("b.md", "B");

    let one = h.tools.call("read_files", json!({ "paths": "a.md" })).await.unwrap();
    assert_eq!(one["files"], json!([{ "path": "a.md", "content": "A" }]));

    let many = h
        .tools
        .call("read_files", json!({ "paths": ["a.md", "b.md"] }))
        .await
        .unwrap();
    assert_eq!(many["files"].as_array().unwrap().len(), 2);
    assert_eq!(many["files"][1]["content"], "B");
}

#[tokio::test]
async fn read_files_fails_on_any_missing_file() {
    let h = harness(false);
    h.write("a.md", "A");
    let err = h
        .tools
        .call("read_files", json!({ "paths": ["a.md", "missing.md"] }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");

    let err = h.tools.call("read_files", json!({ "paths": [] })).await.unwrap_err();
    assert_eq!(err.kind(), "validation");
}

// ── list_files ───────────────────────────────────────────────

#[tokio::test]
async fn list_files_dirs_first_and_hidden_skipped() {
    let h = harness(false);
    h.write("b.md", "");
    h.write("a.txt", "");
    h.write(".secret", "");
    h.write("lesson/output/x.json", "{}");

    let out = h.tools.call("list_files", Value::Null).await.unwrap();
    let paths: Vec<&str> = out["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, ["lesson", "a.txt", "b.md"]);
    assert_eq!(out["truncated"], false);
}

#[tokio::test]
async fn list_files_recursive_with_pattern() {
    let h = harness(false);
    h.write("lesson/output/session.json", "{}");
    h.write("lesson/output/notes.md", "");
    h.write("top.json", "{}");

    let out = h
        .tools
        .call("list_files", json!({ "pattern": "*.json", "recursive": true }))
        .await
        .unwrap();
    let files: Vec<&str> = out["entries"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["type"] == "file")
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert_eq!(files, ["lesson/output/session.json", "top.json"]);
}

// ── delete_file / move_file ──────────────────────────────────

#[tokio::test]
async fn delete_file_goes_through_workspace() {
    let h = harness(false);
    h.write("old.md", "x");
    let out = h.tools.call("delete_file", json!({ "path": "old.md" })).await.unwrap();
    assert_eq!(out["deleted"], "old.md");
    assert!(!h.path("old.md").exists());
    assert_eq!(h.pending(), vec![("old.md".to_string(), PendingSync::Delete)]);

    let err = h.tools.call("delete_file", json!({ "path": "old.md" })).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn move_file_renames_and_marks_both_paths() {
    let h = harness(false);
    h.write("draft.md", "content");
    h.tools
        .call("move_file", json!({ "fromPath": "draft.md", "toPath": "lesson/final.md" }))
        .await
        .unwrap();
    assert_eq!(h.read("lesson/final.md"), "content");
    assert!(!h.path("draft.md").exists());
    assert!(h.is_pending_write("lesson/final.md"));
}
