use crate::ai::retry::{post_json_with_retry, RetryPolicy};
use crate::ai::types::{AiError, CompletionRequest};
use crate::ai::MessageRole;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    auth_headers: header::HeaderMap,
    endpoint: String,
    model: String,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct ClaudeCompletionRequest {
    model: String,
    messages: Vec<SimpleClaudeMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct SimpleClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeCompletionResponse {
    content: Vec<ClaudeResponseContent>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponseContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

impl ClaudeClient {
    pub fn new(api_key: &str, endpoint: Option<&str>, model: Option<&str>) -> Result<Self, String> {
        let mut auth_headers = header::HeaderMap::new();
        auth_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let auth_value = header::HeaderValue::from_str(api_key)
            .map_err(|e| format!("Invalid API key format: {}", e))?;
        auth_headers.insert("x-api-key", auth_value);
        auth_headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static("2023-06-01"),
        );

        Ok(Self {
            client: crate::http::shared_client().clone(),
            auth_headers,
            endpoint: endpoint
                .unwrap_or("https://api.anthropic.com/v1/messages")
                .to_string(),
            model: model.unwrap_or("claude-sonnet-4-20250514").to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn generate_text(&self, request: CompletionRequest) -> Result<String, AiError> {
        // Claude takes the system prompt out of band; several system messages are joined.
        let mut system_parts = Vec::new();
        let mut api_messages = Vec::new();
        for m in request.messages {
            if m.role == MessageRole::System {
                system_parts.push(m.content);
            } else {
                api_messages.push(SimpleClaudeMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content,
                });
            }
        }

        let body = ClaudeCompletionRequest {
            model: if request.model.is_empty() { self.model.clone() } else { request.model },
            messages: api_messages,
            max_tokens: request.max_tokens,
            system: if system_parts.is_empty() { None } else { Some(system_parts.join("\n\n")) },
            temperature: request.temperature,
        };

        log::debug!("Sending request to Claude API: model={} messages={}", body.model, body.messages.len());

        let raw = post_json_with_retry(
            &self.client,
            &self.endpoint,
            &self.auth_headers,
            &body,
            &self.retry,
            "CLAUDE",
        )
        .await?;

        let response_data: ClaudeCompletionResponse = serde_json::from_value(raw)
            .map_err(|e| AiError::new(format!("Failed to parse Claude response: {}", e)))?;

        if response_data.stop_reason.as_deref() == Some("max_tokens") {
            log::debug!("[CLAUDE] Response hit max_tokens, output may be truncated");
        }

        // Concatenate all text content from response
        let content: String = response_data
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.clone())
            .collect();

        if content.is_empty() {
            return Err(AiError::new("Claude API returned no content"));
        }

        Ok(content)
    }
}
