pub mod claude;
pub mod json_repair;
pub mod llama;
pub mod openai;
pub mod retry;
pub mod types;

#[cfg(test)]
pub mod mock;

pub use claude::ClaudeClient;
pub use llama::LlamaClient;
pub use openai::OpenAIClient;
pub use retry::RetryPolicy;
pub use types::{AiError, CompletionRequest};

#[cfg(test)]
pub use mock::MockAiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// Text generation capability. Everything in the memory layer talks to this
/// trait, never to a concrete provider.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AiError>;

    /// Short provider tag used in logs.
    fn provider_name(&self) -> &'static str;
}

/// Unified AI client that works with any configured provider
pub enum AiClient {
    Claude(ClaudeClient),
    OpenAI(OpenAIClient),
    Llama(LlamaClient),
}

impl AiClient {
    /// Create an AI client from the environment configuration
    pub fn from_config(config: &Config) -> Result<Self, String> {
        let policy = RetryPolicy::default().with_max_retries(config.llm_max_retries);
        let endpoint = config.llm_endpoint.as_deref();
        let model = Some(config.models.chat.as_str()).filter(|m| !m.is_empty());

        match config.llm_provider.to_lowercase().as_str() {
            "claude" | "anthropic" => Ok(AiClient::Claude(
                ClaudeClient::new(&config.llm_api_key, endpoint, model)?.with_retry_policy(policy),
            )),
            "openai" => Ok(AiClient::OpenAI(
                OpenAIClient::new(&config.llm_api_key, endpoint, model)?.with_retry_policy(policy),
            )),
            "mistral" => Ok(AiClient::OpenAI(
                OpenAIClient::new(
                    &config.llm_api_key,
                    Some(endpoint.unwrap_or(openai::MISTRAL_CHAT_ENDPOINT)),
                    model,
                )?
                .with_retry_policy(policy),
            )),
            "openrouter" => Ok(AiClient::OpenAI(
                OpenAIClient::new(
                    &config.llm_api_key,
                    Some(endpoint.unwrap_or(openai::OPENROUTER_CHAT_ENDPOINT)),
                    model,
                )?
                .with_retry_policy(policy),
            )),
            "ollama" | "llama" => Ok(AiClient::Llama(
                LlamaClient::new(endpoint, model)?.with_retry_policy(policy),
            )),
            other => Err(format!("Unknown provider: {}", other)),
        }
    }
}

#[async_trait]
impl TextGenerator for AiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AiError> {
        match self {
            AiClient::Claude(client) => client.generate_text(request).await,
            AiClient::OpenAI(client) => client.generate_text(request).await,
            AiClient::Llama(client) => client.generate_text(request).await,
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            AiClient::Claude(_) => "claude",
            AiClient::OpenAI(_) => "openai",
            AiClient::Llama(_) => "ollama",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_selects_provider() {
        let mut config = Config::default();
        config.llm_api_key = "sk-test".to_string();

        config.llm_provider = "claude".to_string();
        assert_eq!(AiClient::from_config(&config).unwrap().provider_name(), "claude");

        config.llm_provider = "Mistral".to_string();
        assert_eq!(AiClient::from_config(&config).unwrap().provider_name(), "openai");

        config.llm_provider = "ollama".to_string();
        assert_eq!(AiClient::from_config(&config).unwrap().provider_name(), "ollama");

        config.llm_provider = "carrier-pigeon".to_string();
        assert!(AiClient::from_config(&config).is_err());
    }
}
