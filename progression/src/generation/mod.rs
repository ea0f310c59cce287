//! Generation service: the text-generation backend behind the evaluator,
//! the deliverable generator and the conversational turn path
//!
//! The engine only sees [`GenerationService`]. Two implementations ship here:
//! - [`AnthropicClient`]: HTTP client for the messages API, with SSE streaming
//! - [`ScriptedGenerator`]: canned replies for offline runs and tests

pub mod anthropic;
pub mod scripted;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use scripted::ScriptedGenerator;

/// Error type for generation calls
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    ParseError(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation service unavailable: {0}")]
    Unavailable(String),

    #[error("generation returned no text")]
    EmptyReply,
}

impl GenerationError {
    /// Whether the same request may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed(_) | Self::Timeout(_) | Self::Unavailable(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::ParseError(_) | Self::EmptyReply => false,
        }
    }
}

/// Speaker of a chat message sent to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    /// Folded into the system prompt by backends without inline system turns
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// One generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// System instructions
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system: system.into(),
            messages,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Streamed reply chunks.
pub type ReplyStream = BoxStream<'static, Result<String, GenerationError>>;

/// Text-generation backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produce the full reply in one call.
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Produce the reply as a stream of text chunks.
    ///
    /// The default implementation yields the whole completion as one chunk.
    async fn stream(&self, request: &GenerationRequest) -> Result<ReplyStream, GenerationError> {
        let text = self.complete(request).await?;
        Ok(Box::pin(stream::once(async move { Ok(text) })))
    }

    /// Backend name for logging.
    fn name(&self) -> &str {
        "generation"
    }
}

/// Run a generation future under a deadline.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, GenerationError>
where
    F: Future<Output = Result<T, GenerationError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct Echo;

    #[async_trait]
    impl GenerationService for Echo {
        async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            Ok(request.messages[0].content.clone())
        }
    }

    #[tokio::test]
    async fn test_default_stream_yields_completion() {
        let request = GenerationRequest::new("sys", vec![ChatMessage::user("hello there")]);

        let chunks: Vec<String> = Echo
            .stream(&request)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), "hello there");
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_elapses() {
        let limit = Duration::from_secs(5);
        let result: Result<(), _> = with_timeout(limit, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(GenerationError::Timeout(limit)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GenerationError::Api {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!GenerationError::Api {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!GenerationError::EmptyReply.is_retryable());
    }
}
