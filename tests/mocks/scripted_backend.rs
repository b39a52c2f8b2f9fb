use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hftmon_engine::advisor::{ChatMessage, LlmBackend};
use hftmon_engine::error::{AdvisorError, AdvisorResult};

/// LLM backend replaying queued replies and recording every request
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<AdvisorResult<String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply
    pub fn reply(self, text: &str) -> Self {
        self.enqueue(Ok(text.to_string()))
    }

    /// Queue a failed request, as if the service were down
    pub fn unreachable(self) -> Self {
        self.enqueue(Err(AdvisorError::Request {
            url: "http://localhost:11434/api/chat".to_string(),
            reason: "connection refused".to_string(),
        }))
    }

    fn enqueue(self, reply: AdvisorResult<String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Message lists received so far
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn chat(&self, messages: &[ChatMessage]) -> AdvisorResult<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }

        let next = self.replies.lock().ok().and_then(|mut replies| replies.pop_front());
        next.unwrap_or_else(|| {
            Err(AdvisorError::Decode {
                reason: "no scripted reply left".to_string(),
            })
        })
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
