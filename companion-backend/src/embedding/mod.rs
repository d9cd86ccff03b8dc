//! Embedding capability: one trait, one implementation per provider.
//!
//! ```text
//! EmbeddingProvider (trait)
//! ├── OpenAICompatibleEmbedder  (openai, mistral, jina)
//! ├── CohereEmbedder
//! └── OllamaEmbedder
//! ```

pub mod cohere;
pub mod ollama;
pub mod openai;

#[cfg(test)]
pub mod hash;

pub use cohere::CohereEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAICompatibleEmbedder;

#[cfg(test)]
pub use hash::HashEmbedder;

use std::sync::Arc;

use async_trait::async_trait;

use crate::ai::AiError;
use crate::config::Config;

#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    Request(String),

    #[error("Embedding API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding configuration error: {0}")]
    Config(String),

    #[error("Empty input provided")]
    EmptyInput,
}

impl EmbeddingError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Request(_) => true,
            EmbeddingError::Api { status, .. } => crate::ai::types::is_retryable_status(*status),
            _ => false,
        }
    }
}

impl From<AiError> for EmbeddingError {
    fn from(err: AiError) -> Self {
        match err.status_code {
            Some(status) => EmbeddingError::Api { status, message: err.message },
            None => EmbeddingError::Request(err.message),
        }
    }
}

/// Turns text into a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Dimension of every vector this provider returns.
    fn dimension(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Providers we know how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Mistral,
    OpenAI,
    Cohere,
    Jina,
    Ollama,
}

impl EmbeddingBackend {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().trim() {
            "mistral" => Some(EmbeddingBackend::Mistral),
            "openai" => Some(EmbeddingBackend::OpenAI),
            "cohere" => Some(EmbeddingBackend::Cohere),
            "jina" => Some(EmbeddingBackend::Jina),
            "ollama" => Some(EmbeddingBackend::Ollama),
            _ => None,
        }
    }

    /// Guess the provider from the model name. Unknown names go to Mistral,
    /// which is what the default model uses.
    pub fn detect(model: &str) -> Self {
        let model = model.to_lowercase();
        if model.starts_with("mistral") {
            EmbeddingBackend::Mistral
        } else if model.starts_with("text-embedding") {
            EmbeddingBackend::OpenAI
        } else if model.starts_with("embed-") {
            EmbeddingBackend::Cohere
        } else if model.starts_with("jina") {
            EmbeddingBackend::Jina
        } else if ["nomic", "mxbai", "all-minilm", "bge", "snowflake"]
            .iter()
            .any(|prefix| model.starts_with(prefix))
        {
            EmbeddingBackend::Ollama
        } else {
            EmbeddingBackend::Mistral
        }
    }
}

/// Build the configured embedding provider.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    let backend = if config.embedding_provider.eq_ignore_ascii_case("auto") {
        EmbeddingBackend::detect(&config.embedding_model)
    } else {
        EmbeddingBackend::from_str(&config.embedding_provider).ok_or_else(|| {
            EmbeddingError::Config(format!("unknown embedding provider '{}'", config.embedding_provider))
        })?
    };

    let endpoint = config.embedding_endpoint.as_deref();
    let key = config.embedding_api_key.as_str();
    let model = config.embedding_model.as_str();
    let dimension = config.embedding_dimension;
    let retries = config.llm_max_retries;

    log::info!("[EMBED] Using {:?} embeddings with model {} (dim {})", backend, model, dimension);

    let provider: Arc<dyn EmbeddingProvider> = match backend {
        EmbeddingBackend::Mistral => Arc::new(
            OpenAICompatibleEmbedder::mistral(key, endpoint, model, dimension)?.with_max_retries(retries),
        ),
        EmbeddingBackend::OpenAI => Arc::new(
            OpenAICompatibleEmbedder::openai(key, endpoint, model, dimension)?.with_max_retries(retries),
        ),
        EmbeddingBackend::Jina => Arc::new(
            OpenAICompatibleEmbedder::jina(key, endpoint, model, dimension)?.with_max_retries(retries),
        ),
        EmbeddingBackend::Cohere => {
            Arc::new(CohereEmbedder::new(key, endpoint, model, dimension)?.with_max_retries(retries))
        }
        EmbeddingBackend::Ollama => {
            Arc::new(OllamaEmbedder::new(endpoint, model, dimension)?.with_max_retries(retries))
        }
    };
    Ok(provider)
}

/// Reject vectors of the wrong size before they reach the store.
pub(crate) fn check_dimension(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>, EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch { expected, actual: vector.len() });
    }
    Ok(vector)
}
