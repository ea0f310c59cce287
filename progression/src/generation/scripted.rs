//! Scripted generator: deterministic replies for offline runs and tests
//!
//! Replies are served from a FIFO queue; once it drains, the fallback reply
//! is used. Every request is recorded so callers can inspect the prompts that
//! reached the service.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use super::{GenerationError, GenerationRequest, GenerationService, ReplyStream};

/// Canned-reply [`GenerationService`].
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    fallback: Option<String>,
    delay: Option<Duration>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    /// Serve `replies` in order, then fail with `Unavailable`.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always reply with `reply`.
    pub fn constant(reply: impl Into<String>) -> Self {
        Self::new(Vec::<String>::new()).with_fallback(reply)
    }

    /// Fail every call.
    pub fn failing() -> Self {
        Self::new(Vec::<String>::new())
    }

    /// Reply used once the queue is empty.
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue another reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut queue) = self.replies.lock() {
            queue.push_back(Ok(reply.into()));
        }
    }

    /// Queue a failure.
    pub fn push_error(&self, error: GenerationError) {
        if let Ok(mut queue) = self.replies.lock() {
            queue.push_back(Err(error));
        }
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    async fn next_reply(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self
            .replies
            .lock()
            .map_err(|_| GenerationError::Unavailable("reply queue poisoned".to_string()))?
            .pop_front();
        match (queued, &self.fallback) {
            (Some(reply), _) => reply,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(GenerationError::Unavailable(
                "scripted replies exhausted".to_string(),
            )),
        }
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let reply = self.next_reply(request).await?;
        if reply.is_empty() {
            return Err(GenerationError::EmptyReply);
        }
        Ok(reply)
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<ReplyStream, GenerationError> {
        let reply = self.next_reply(request).await?;
        // Word-sized chunks, keeping the separating whitespace.
        let chunks: Vec<Result<String, GenerationError>> = reply
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ChatMessage;
    use futures::StreamExt;

    fn request() -> GenerationRequest {
        GenerationRequest::new("sys", vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn test_queue_then_fallback() {
        let service = ScriptedGenerator::new(["one", "two"]).with_fallback("rest");
        assert_eq!(service.complete(&request()).await.unwrap(), "one");
        assert_eq!(service.complete(&request()).await.unwrap(), "two");
        assert_eq!(service.complete(&request()).await.unwrap(), "rest");
        assert_eq!(service.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_generator() {
        let service = ScriptedGenerator::failing();
        assert!(matches!(
            service.complete(&request()).await,
            Err(GenerationError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_chunks_rejoin() {
        let service = ScriptedGenerator::constant("what did you notice today");
        let chunks: Vec<String> = service
            .stream(&request())
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks.concat(), "what did you notice today");
    }

    #[tokio::test]
    async fn test_queued_error() {
        let service = ScriptedGenerator::constant("ok");
        service.push_error(GenerationError::EmptyReply);
        assert_eq!(
            service.complete(&request()).await,
            Err(GenerationError::EmptyReply)
        );
        assert_eq!(service.complete(&request()).await.unwrap(), "ok");
    }
}
