//! Scripted generation client for tests and offline runs.
//!
//! Pops canned replies off a queue in order. Deterministic and
//! network-free, which makes pipeline failure paths (schema errors,
//! backend errors, fabricated citations) directly testable.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use coverqa_core::{AppError, AppResult};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted reply: either content or a simulated backend failure.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this text as the completion content
    Text(String),

    /// Fail the call with an LLM error carrying this message
    Error(String),
}

/// Generation client that replays a fixed script.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    prompts_seen: Mutex<Vec<String>>,
    fallback: Option<String>,
}

impl ScriptedClient {
    /// Create a client that will serve the given replies in order.
    ///
    /// Once the queue is exhausted further calls fail, mimicking an
    /// unexpected extra backend call.
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts_seen: Mutex::new(Vec::new()),
            fallback: None,
        }
    }

    /// Convenience constructor: every call succeeds with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            prompts_seen: Mutex::new(Vec::new()),
            fallback: Some(text.into()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts_seen.lock().expect("prompt lock").clone()
    }

    /// Number of calls served.
    pub fn calls(&self) -> usize {
        self.prompts_seen.lock().expect("prompt lock").len()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.prompts_seen
            .lock()
            .expect("prompt lock")
            .push(request.prompt.clone());

        let next = self.replies.lock().expect("reply lock").pop_front();
        match next {
            Some(ScriptedReply::Text(content)) => Ok(LlmResponse {
                content,
                model: request.model.clone(),
                usage: LlmUsage::default(),
            }),
            Some(ScriptedReply::Error(message)) => Err(AppError::Llm(message)),
            None => match &self.fallback {
                Some(content) => Ok(LlmResponse {
                    content: content.clone(),
                    model: request.model.clone(),
                    usage: LlmUsage::default(),
                }),
                None => Err(AppError::Llm("scripted replies exhausted".to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order() {
        let client = ScriptedClient::new(vec![
            ScriptedReply::Text("first".to_string()),
            ScriptedReply::Error("boom".to_string()),
        ]);

        let request = LlmRequest::new("q", "m");
        assert_eq!(client.complete(&request).await.unwrap().content, "first");
        assert!(client.complete(&request).await.is_err());
        // Queue exhausted and no fallback
        assert!(client.complete(&request).await.is_err());
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_always() {
        let client = ScriptedClient::always("same");
        let request = LlmRequest::new("q", "m");
        assert_eq!(client.complete(&request).await.unwrap().content, "same");
        assert_eq!(client.complete(&request).await.unwrap().content, "same");
    }
}
