use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

use super::{check_dimension, EmbeddingError, EmbeddingProvider};
use crate::ai::retry::{post_json_with_retry, RetryPolicy};
use crate::http::EMBEDDING_TIMEOUT;

/// Local embeddings through Ollama's `/api/embed`.
pub struct OllamaEmbedder {
    client: Client,
    auth_headers: header::HeaderMap,
    endpoint: String,
    model: String,
    dimension: usize,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(endpoint: Option<&str>, model: &str, dimension: usize) -> Result<Self, EmbeddingError> {
        let mut auth_headers = header::HeaderMap::new();
        auth_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        Ok(Self {
            client: crate::http::shared_client().clone(),
            auth_headers,
            endpoint: endpoint
                .unwrap_or("http://localhost:11434/api/embed")
                .to_string(),
            model: model.to_string(),
            dimension,
            retry: RetryPolicy::default().with_timeout(EMBEDDING_TIMEOUT),
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry = self.retry.with_max_retries(max_retries);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let body = OllamaEmbedRequest { model: &self.model, input: text };

        let raw = post_json_with_retry(
            &self.client,
            &self.endpoint,
            &self.auth_headers,
            &body,
            &self.retry,
            "EMBED",
        )
        .await?;

        let response: OllamaEmbedResponse = serde_json::from_value(raw)
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        let vector = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding in response".to_string()))?;

        check_dimension(vector, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
