//! OpenAI-compatible chat-completions backend.
//!
//! Works with any endpoint that speaks the chat completions protocol,
//! including the Gemini OpenAI-compatibility surface.
//!
//! Config example:
//! ```yaml
//! generation:
//!   endpoint: https://generativelanguage.googleapis.com/v1beta/openai/chat/completions
//!   api_key: $GEMINI_API_KEY
//!   model: gemini-2.5-pro
//! ```

use std::error::Error as _;
use std::pin::Pin;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_core::Stream;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    GenerationError, GenerationRequest, TextGenerator, CODE_CONNECTION_RESET, CODE_DNS_RETRY,
    CODE_TIMED_OUT,
};

/// Backend that posts to an OpenAI-compatible chat completions API.
pub struct HttpGenerator {
    api_key: String,
    endpoint: String,
    client: Client,
}

impl HttpGenerator {
    /// Create a backend with explicit configuration.
    ///
    /// `api_key` may be empty for local servers that don't require auth.
    pub fn new(endpoint: String, api_key: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_key,
            endpoint,
            client,
        })
    }

    fn body(&self, request: &GenerationRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": [
                { "role": "user", "content": request.render_user_message() }
            ],
        });
        if stream {
            body["stream"] = json!(true);
        }
        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|t| json!({ "type": t }))
                .collect::<Vec<_>>()
                .into();
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, GenerationError> {
        let mut req = self.client.post(&self.endpoint).json(body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req.send().await.map_err(|e| transport_error(&e))?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(resp)
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let resp = self.post(&self.body(request, false)).await?;
        let json: Value = resp.json().await.map_err(|e| transport_error(&e))?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| GenerationError::new("generation API response has no message content"))?
            .to_string();
        debug!(model = %request.model, bytes = content.len(), "generation complete");
        Ok(content)
    }

    fn generate_stream<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send + 'a>> {
        Box::pin(async_stream::try_stream! {
            let resp = self.post(&self.body(request, true)).await?;

            use tokio_stream::StreamExt as _;
            let mut byte_stream = resp.bytes_stream();
            // Raw bytes: a multi-byte character may straddle two chunks,
            // so decode only whole lines.
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk.map_err(|e| transport_error(&e))?;
                buffer.extend_from_slice(&chunk);

                while let Some(newline_pos) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim_end();

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        return;
                    }
                    if let Ok(json) = serde_json::from_str::<Value>(data) {
                        if let Some(content) = json["choices"][0]["delta"]["content"].as_str() {
                            if !content.is_empty() {
                                yield content.to_string();
                            }
                        }
                    }
                }
            }
        })
    }
}

/// Map a reqwest transport failure onto a [`GenerationError`] code.
fn transport_error(e: &reqwest::Error) -> GenerationError {
    let mut detail = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        detail.push_str(": ");
        detail.push_str(&s.to_string());
        source = s.source();
    }
    let message = format!("generation request failed: {detail}");

    if e.is_timeout() {
        GenerationError::transport(CODE_TIMED_OUT, message)
    } else if e.is_connect() && detail.to_lowercase().contains("dns") {
        GenerationError::transport(CODE_DNS_RETRY, message)
    } else if e.is_connect() || e.is_request() || e.is_body() {
        GenerationError::transport(CODE_CONNECTION_RESET, message)
    } else {
        GenerationError::new(message)
    }
}

/// Build a [`GenerationError`] from a non-2xx response.
///
/// Understands both the Google (`error.status`) and OpenAI
/// (`error.code` / `error.type`) error envelopes.
async fn error_from_response(resp: reqwest::Response) -> GenerationError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();

    let parsed: Option<Value> = serde_json::from_str(&text).ok();
    let err_obj = parsed.as_ref().and_then(|v| v.get("error"));
    let detail = err_obj
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(text.as_str());
    let reason = err_obj.and_then(|e| {
        e.get("status")
            .and_then(Value::as_str)
            .or_else(|| e.get("code").and_then(Value::as_str))
            .or_else(|| e.get("type").and_then(Value::as_str))
    });

    let mut err = GenerationError::http(
        status.as_u16(),
        format!("generation API returned {status}: {detail}"),
    );
    if let Some(r) = reason {
        err = err.with_reason(r);
    }
    err
}
