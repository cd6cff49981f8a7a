//! HTTP backend tests against a mock OpenAI-compatible server.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use spark_agent::models::{GenerationRequest, HttpGenerator, InputFile, TextGenerator};
use spark_agent::scheduler::is_retryable;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMPLETIONS: &str = "/v1beta/openai/chat/completions";

fn generator(server: &MockServer) -> HttpGenerator {
    HttpGenerator::new(
        format!("{}{COMPLETIONS}", server.uri()),
        "test-key".into(),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn request() -> GenerationRequest {
    GenerationRequest {
        model: "gemini-2.5-pro".into(),
        prompt: "Write a quiz.".into(),
        inputs: vec![],
        tools: vec![],
    }
}

#[tokio::test]
async fn generate_posts_chat_completion_with_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gemini-2.5-pro",
            "messages": [{ "role": "user", "content": "Write a quiz." }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"questions\": []}" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = generator(&server).generate(&request()).await.unwrap();
    assert_eq!(reply, "{\"questions\": []}");
}

#[tokio::test]
async fn inputs_and_tools_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "tools": [{ "type": "web-search" }] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "ok" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut req = request();
    req.tools = vec!["web-search".into()];
    req.inputs = vec![InputFile {
        path: "notes/a.md".into(),
        content: "alpha".into(),
    }];
    assert_eq!(generator(&server).generate(&req).await.unwrap(), "ok");

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let content = body["messages"][0]["content"].as_str().unwrap();
    assert!(content.contains("### notes/a.md"));
}

#[tokio::test]
async fn stream_collects_sse_deltas() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\", world\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;

    let gen = generator(&server);
    let req = request();
    let chunks: Vec<String> = gen
        .generate_stream(&req)
        .map(|c| c.unwrap())
        .collect()
        .await;
    assert_eq!(chunks, vec!["Hello".to_string(), ", world".to_string()]);
}

#[tokio::test]
async fn stream_keeps_multibyte_text_intact_across_chunks() {
    let server = MockServer::start().await;
    // Large enough that the body arrives in several chunks, so chunk
    // boundaries land inside two-byte characters.
    let text = "\u{e9}".repeat(20_000);
    let sse = format!(
        "data: {}\n\ndata: [DONE]\n\n",
        json!({ "choices": [{ "delta": { "content": text } }] })
    );
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;

    let gen = generator(&server);
    let req = request();
    let chunks: Vec<String> = gen
        .generate_stream(&req)
        .map(|c| c.unwrap())
        .collect()
        .await;
    let joined = chunks.concat();
    assert!(!joined.contains('\u{fffd}'), "replacement characters in output");
    assert_eq!(joined, text);
}

#[tokio::test]
async fn google_rate_limit_envelope_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {
                "code": 429,
                "message": "Resource has been exhausted.",
                "status": "RESOURCE_EXHAUSTED"
            }
        })))
        .mount(&server)
        .await;

    let err = generator(&server).generate(&request()).await.unwrap_err();
    assert_eq!(err.status, Some(429));
    assert_eq!(err.reason.as_deref(), Some("RESOURCE_EXHAUSTED"));
    assert!(err.message.contains("Resource has been exhausted"));
    assert!(is_retryable(&err));
}

#[tokio::test]
async fn openai_error_envelope_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "message": "Unknown model",
                "type": "invalid_request_error",
                "code": null
            }
        })))
        .mount(&server)
        .await;

    let err = generator(&server).generate(&request()).await.unwrap_err();
    assert_eq!(err.status, Some(400));
    assert_eq!(err.reason.as_deref(), Some("invalid_request_error"));
    assert!(err.message.contains("Unknown model"));
    assert!(!is_retryable(&err));
}

#[tokio::test]
async fn stream_surfaces_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let gen = generator(&server);
    let req = request();
    let first = gen.generate_stream(&req).next().await.unwrap();
    let err = first.unwrap_err();
    assert_eq!(err.status, Some(503));
    assert!(err.message.contains("upstream down"));
}

#[tokio::test]
async fn missing_content_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = generator(&server).generate(&request()).await.unwrap_err();
    assert!(err.status.is_none());
    assert!(err.message.contains("no message content"));
}
