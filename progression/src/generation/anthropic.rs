//! HTTP client for the Anthropic messages API
//!
//! One-shot calls parse the `content` blocks of the response body. Streaming
//! calls set `"stream": true` and decode the server-sent events, forwarding
//! every `text_delta` as a chunk.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

use super::{GenerationError, GenerationRequest, GenerationService, MessageRole, ReplyStream};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";

/// Endpoint configuration
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub api_url: String,
    /// Whole-request timeout for the HTTP client
    pub timeout: Duration,
}

impl AnthropicConfig {
    /// Load from `ANTHROPIC_API_KEY`, `PROGRESSION_MODEL`, `PROGRESSION_API_URL`.
    pub fn from_env() -> Result<Self, GenerationError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| GenerationError::Unavailable("ANTHROPIC_API_KEY is not set".to_string()))?;
        Ok(Self {
            api_key,
            model: std::env::var("PROGRESSION_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            api_url: std::env::var("PROGRESSION_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            timeout: Duration::from_secs(120),
        })
    }
}

/// [`GenerationService`] backed by the messages API.
pub struct AnthropicClient {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self, GenerationError> {
        Self::new(AnthropicConfig::from_env()?)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn body(&self, request: &GenerationRequest, stream: bool) -> Value {
        let (system, messages) = fold_messages(request);
        serde_json::json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": system,
            "messages": messages,
            "stream": stream,
        })
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, GenerationError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.config.timeout)
                } else {
                    GenerationError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerationService for AnthropicClient {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = self.body(request, false);
        debug!(model = %self.config.model, messages = request.messages.len(), "messages call");

        let response = self.send(&body).await?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::ParseError(e.to_string()))?;

        let text = extract_text(&json);
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyReply);
        }
        Ok(text)
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<ReplyStream, GenerationError> {
        let body = self.body(request, true);
        debug!(model = %self.config.model, messages = request.messages.len(), "streaming messages call");

        let response = self.send(&body).await?;
        Ok(sse_text_stream(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Split system-role messages into the system prompt and merge consecutive
/// same-role turns. The API requires alternating roles starting with `user`.
fn fold_messages(request: &GenerationRequest) -> (String, Vec<Value>) {
    let mut system = request.system.clone();
    let mut merged: Vec<(&'static str, String)> = Vec::new();

    for message in &request.messages {
        let role = match message.role {
            MessageRole::System => {
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(&message.content);
                continue;
            }
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        match merged.last_mut() {
            Some((last_role, text)) if *last_role == role => {
                text.push_str("\n\n");
                text.push_str(&message.content);
            }
            _ => merged.push((role, message.content.clone())),
        }
    }

    if merged.first().map(|(role, _)| *role) != Some("user") {
        merged.insert(0, ("user", "Let's begin.".to_string()));
    }

    let messages = merged
        .into_iter()
        .map(|(role, content)| serde_json::json!({ "role": role, "content": content }))
        .collect();
    (system, messages)
}

fn extract_text(json: &Value) -> String {
    json["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect::<Vec<_>>()
                .concat()
        })
        .unwrap_or_default()
}

/// What one SSE line means for the reply.
#[derive(Debug, PartialEq)]
enum SseEvent {
    Text(String),
    Stop,
    Error(String),
    Ignore,
}

fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Ignore;
    };
    let Ok(json) = serde_json::from_str::<Value>(data.trim()) else {
        return SseEvent::Ignore;
    };
    match json["type"].as_str() {
        Some("content_block_delta") if json["delta"]["type"] == "text_delta" => json["delta"]
            ["text"]
            .as_str()
            .map(|t| SseEvent::Text(t.to_string()))
            .unwrap_or(SseEvent::Ignore),
        Some("message_stop") => SseEvent::Stop,
        Some("error") => SseEvent::Error(
            json["error"]["message"]
                .as_str()
                .unwrap_or("stream error")
                .to_string(),
        ),
        _ => SseEvent::Ignore,
    }
}

struct SseState<S> {
    inner: std::pin::Pin<Box<S>>,
    buffer: Vec<u8>,
    eof: bool,
    done: bool,
}

/// Decode an SSE byte stream into text chunks.
pub(crate) fn sse_text_stream<S, B, E>(bytes: S) -> ReplyStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = SseState {
        inner: Box::pin(bytes),
        buffer: Vec::new(),
        eof: false,
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }

            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = state.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                match parse_sse_line(line.trim_end()) {
                    SseEvent::Text(text) => return Some((Ok(text), state)),
                    SseEvent::Stop => return None,
                    SseEvent::Error(message) => {
                        state.done = true;
                        return Some((Err(GenerationError::RequestFailed(message)), state));
                    }
                    SseEvent::Ignore => continue,
                }
            }

            if state.eof {
                if state.buffer.is_empty() {
                    // The body closed without `message_stop`: the reply is truncated.
                    state.done = true;
                    let cut = GenerationError::RequestFailed(
                        "stream ended before message_stop".to_string(),
                    );
                    return Some((Err(cut), state));
                }
                // Flush a final unterminated line.
                state.buffer.push(b'\n');
                continue;
            }

            match state.inner.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(GenerationError::RequestFailed(e.to_string())), state));
                }
                None => state.eof = true,
            }
        }
    }))
}
