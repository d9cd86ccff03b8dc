//! Scripted text generator for tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::types::{AiError, CompletionRequest};
use super::TextGenerator;

/// Answers completion calls from a script instead of the network.
///
/// Rules match on a substring of the concatenated prompt and are never consumed.
/// Calls that match no rule pop the next queued response.
pub struct MockAiClient {
    rules: Mutex<Vec<(String, Result<String, AiError>)>>,
    queue: Mutex<VecDeque<Result<String, AiError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockAiClient {
    pub fn new(responses: Vec<Result<String, AiError>>) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            queue: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A generator that fails every call, like a provider that is down.
    pub fn failing() -> Self {
        Self::new(Vec::new()).with_rule("", Err(AiError::with_status("service unavailable", 503)))
    }

    pub fn with_rule(self, needle: &str, response: Result<String, AiError>) -> Self {
        self.rules.lock().push((needle.to_string(), response));
        self
    }

    pub fn respond_to(self, needle: &str, response: &str) -> Self {
        self.with_rule(needle, Ok(response.to_string()))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Number of calls whose prompt contained `needle`.
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.messages.iter().any(|m| m.content.contains(needle)))
            .count()
    }
}

#[async_trait]
impl TextGenerator for MockAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AiError> {
        let prompt: String = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.requests.lock().push(request);

        if let Some((_, response)) = self
            .rules
            .lock()
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
        {
            return response.clone();
        }

        self.queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::new("MockAiClient: no scripted response")))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
