//! Tests for the `publish_lesson` grading gate.

mod common;

use common::{builder, harness, RecordingPublisher};
use serde_json::json;

fn publish_args() -> serde_json::Value {
    json!({ "sessionId": "session-42" })
}

#[tokio::test]
async fn missing_report_blocks_publish() {
    let h = harness(false);
    let err = h.tools.call("publish_lesson", publish_args()).await.unwrap_err();
    assert_eq!(err.kind(), "policy");
    assert!(err.to_string().contains("Missing required session grading report"));
    assert!(h.publisher.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failing_json_report_blocks_publish() {
    let h = harness(true);
    h.write(
        "lesson/feedback/session-grade.json",
        r#"{ "pass": false, "reason": "quiz answers disagree with the explanation" }"#,
    );
    let err = h.tools.call("publish_lesson", publish_args()).await.unwrap_err();
    let msg = err.to_string();
    assert_eq!(err.kind(), "policy");
    assert!(msg.contains("pass=false"), "{msg}");
    assert!(msg.contains("quiz answers disagree"), "{msg}");
    assert!(h.publisher.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failing_markdown_report_blocks_publish() {
    let h = harness(false);
    h.write(
        "lesson/feedback/session-grade.md",
        "# Session grade\n\n**Pass:** false\n\nReason: objectives are not covered\n",
    );
    let err = h.tools.call("publish_lesson", publish_args()).await.unwrap_err();
    assert_eq!(err.kind(), "policy");
    assert!(err.to_string().contains("session-grade.md has pass=false"));
}

#[tokio::test]
async fn json_report_takes_precedence_over_markdown() {
    let h = harness(false);
    h.write("lesson/feedback/session-grade.json", r#"{ "pass": true }"#);
    h.write("lesson/feedback/session-grade.md", "pass: false\n");
    let out = h.tools.call("publish_lesson", publish_args()).await.unwrap();
    assert_eq!(out["gradeReport"]["rawPath"], "lesson/feedback/session-grade.json");
}

#[tokio::test]
async fn unreadable_report_blocks_publish() {
    let h = harness(false);
    h.write("lesson/feedback/session-grade.json", "{ not json");
    let err = h.tools.call("publish_lesson", publish_args()).await.unwrap_err();
    assert_eq!(err.kind(), "policy");
    assert!(err.to_string().contains("could not be read"));
}

#[tokio::test]
async fn passing_report_publishes_bundle() {
    let h = harness(true);
    h.write("lesson/output/session.json", "{}");
    h.write(
        "lesson/feedback/session-grade.md",
        "## Verdict\n- passed: yes\n- summary: ready to ship\n",
    );

    let out = h.tools.call("publish_lesson", publish_args()).await.unwrap();
    assert_eq!(out["published"], true);
    assert_eq!(out["sessionId"], "session-42");
    assert_eq!(out["gradeReport"]["pass"], true);
    assert_eq!(out["gradeReport"]["reason"], "ready to ship");

    let published = h.publisher.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].session_id, "session-42");
    assert_eq!(published[0].user_id, "user-1");
    assert!(published[0].grade.pass);
}

#[tokio::test]
async fn invalid_session_id_is_a_validation_error() {
    let h = harness(false);
    h.write("lesson/feedback/session-grade.json", r#"{ "pass": true }"#);
    for bad in [json!({ "sessionId": "../x" }), json!({ "sessionId": " " }), json!({})] {
        let err = h.tools.call("publish_lesson", bad.clone()).await.unwrap_err();
        assert_eq!(err.kind(), "validation", "{bad}");
    }
    assert!(h.publisher.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn publisher_failure_surfaces_as_publish_error() {
    let h = builder(false)
        .publisher(RecordingPublisher {
            fail: true,
            ..RecordingPublisher::default()
        })
        .build();
    h.write("lesson/feedback/session-grade.json", r#"{ "pass": "true" }"#);
    let err = h.tools.call("publish_lesson", publish_args()).await.unwrap_err();
    assert_eq!(err.kind(), "publish");
    assert!(err.to_string().contains("lesson store unavailable"));
}
