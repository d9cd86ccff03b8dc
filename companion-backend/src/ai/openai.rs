//! Client for OpenAI-compatible chat completion APIs (OpenAI, Mistral, OpenRouter).

use crate::ai::retry::{post_json_with_retry, RetryPolicy};
use crate::ai::types::{AiError, CompletionRequest};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

pub const OPENAI_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const MISTRAL_CHAT_ENDPOINT: &str = "https://api.mistral.ai/v1/chat/completions";
pub const OPENROUTER_CHAT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    auth_headers: header::HeaderMap,
    endpoint: String,
    model: String,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct OpenAICompletionRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAICompletionResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIClient {
    pub fn new(api_key: &str, endpoint: Option<&str>, model: Option<&str>) -> Result<Self, String> {
        let mut auth_headers = header::HeaderMap::new();
        auth_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        if !api_key.is_empty() {
            let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?;
            auth_headers.insert(header::AUTHORIZATION, auth_value);
        }

        Ok(Self {
            client: crate::http::shared_client().clone(),
            auth_headers,
            endpoint: endpoint.unwrap_or(OPENAI_CHAT_ENDPOINT).to_string(),
            model: model.unwrap_or("gpt-4o-mini").to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn generate_text(&self, request: CompletionRequest) -> Result<String, AiError> {
        let body = OpenAICompletionRequest {
            model: if request.model.is_empty() { self.model.clone() } else { request.model },
            messages: request
                .messages
                .into_iter()
                .map(|m| OpenAIMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content,
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        log::debug!(
            "Sending request to {}: model={} messages={}",
            self.endpoint,
            body.model,
            body.messages.len()
        );

        let raw = post_json_with_retry(
            &self.client,
            &self.endpoint,
            &self.auth_headers,
            &body,
            &self.retry,
            "OPENAI",
        )
        .await?;

        let response_data: OpenAICompletionResponse = serde_json::from_value(raw)
            .map_err(|e| AiError::new(format!("Failed to parse OpenAI response: {}", e)))?;

        let choice = response_data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::new("OpenAI API returned no choices"))?;

        if choice.finish_reason.as_deref() == Some("length") {
            log::debug!("[OPENAI] Response hit max_tokens, output may be truncated");
        }

        match choice.message.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(AiError::new("OpenAI API returned no content")),
        }
    }
}
