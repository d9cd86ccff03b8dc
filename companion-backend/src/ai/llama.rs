use crate::ai::retry::{post_json_with_retry, RetryPolicy};
use crate::ai::types::{AiError, CompletionRequest};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

/// Llama client for the Ollama chat API
#[derive(Clone)]
pub struct LlamaClient {
    client: Client,
    auth_headers: header::HeaderMap,
    endpoint: String,
    model: String,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

impl LlamaClient {
    pub fn new(endpoint: Option<&str>, model: Option<&str>) -> Result<Self, String> {
        let mut auth_headers = header::HeaderMap::new();
        auth_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        Ok(Self {
            client: crate::http::shared_client().clone(),
            auth_headers,
            endpoint: endpoint
                .unwrap_or("http://localhost:11434/api/chat")
                .to_string(),
            model: model.unwrap_or("llama3.3").to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn generate_text(&self, request: CompletionRequest) -> Result<String, AiError> {
        let body = OllamaChatRequest {
            model: if request.model.is_empty() { self.model.clone() } else { request.model },
            messages: request
                .messages
                .into_iter()
                .map(|m| OllamaMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content,
                })
                .collect(),
            stream: false,
            options: OllamaOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
            },
        };

        let raw = post_json_with_retry(
            &self.client,
            &self.endpoint,
            &self.auth_headers,
            &body,
            &self.retry,
            "OLLAMA",
        )
        .await?;

        let response_data: OllamaChatResponse = serde_json::from_value(raw)
            .map_err(|e| AiError::new(format!("Failed to parse Ollama response: {}", e)))?;

        if response_data.done_reason.as_deref() == Some("length") {
            log::debug!("[OLLAMA] Response hit num_predict, output may be truncated");
        }

        if response_data.message.content.trim().is_empty() {
            return Err(AiError::new("Ollama returned no content"));
        }
        Ok(response_data.message.content)
    }
}
