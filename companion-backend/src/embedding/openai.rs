//! Embeddings over the OpenAI `/v1/embeddings` shape, which Mistral and Jina also speak.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

use super::{check_dimension, EmbeddingError, EmbeddingProvider};
use crate::ai::retry::{post_json_with_retry, RetryPolicy};
use crate::http::EMBEDDING_TIMEOUT;

const OPENAI_EMBEDDINGS_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";
const MISTRAL_EMBEDDINGS_ENDPOINT: &str = "https://api.mistral.ai/v1/embeddings";
const JINA_EMBEDDINGS_ENDPOINT: &str = "https://api.jina.ai/v1/embeddings";

pub struct OpenAICompatibleEmbedder {
    client: Client,
    auth_headers: header::HeaderMap,
    endpoint: String,
    model: String,
    dimension: usize,
    /// OpenAI's v3 models and Jina accept a target dimension; Mistral rejects the field.
    send_dimensions: bool,
    name: &'static str,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAICompatibleEmbedder {
    fn build(
        api_key: &str,
        endpoint: &str,
        model: &str,
        dimension: usize,
        send_dimensions: bool,
        name: &'static str,
    ) -> Result<Self, EmbeddingError> {
        if api_key.is_empty() {
            return Err(EmbeddingError::Config(format!("{} embeddings need an API key", name)));
        }
        let mut auth_headers = header::HeaderMap::new();
        auth_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| EmbeddingError::Config(format!("Invalid API key format: {}", e)))?;
        auth_headers.insert(header::AUTHORIZATION, auth_value);

        Ok(Self {
            client: crate::http::shared_client().clone(),
            auth_headers,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            dimension,
            send_dimensions,
            name,
            retry: RetryPolicy::default().with_timeout(EMBEDDING_TIMEOUT),
        })
    }

    pub fn openai(api_key: &str, endpoint: Option<&str>, model: &str, dimension: usize) -> Result<Self, EmbeddingError> {
        let send_dimensions = model.contains("-3-");
        Self::build(api_key, endpoint.unwrap_or(OPENAI_EMBEDDINGS_ENDPOINT), model, dimension, send_dimensions, "openai")
    }

    pub fn mistral(api_key: &str, endpoint: Option<&str>, model: &str, dimension: usize) -> Result<Self, EmbeddingError> {
        Self::build(api_key, endpoint.unwrap_or(MISTRAL_EMBEDDINGS_ENDPOINT), model, dimension, false, "mistral")
    }

    pub fn jina(api_key: &str, endpoint: Option<&str>, model: &str, dimension: usize) -> Result<Self, EmbeddingError> {
        Self::build(api_key, endpoint.unwrap_or(JINA_EMBEDDINGS_ENDPOINT), model, dimension, true, "jina")
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry = self.retry.with_max_retries(max_retries);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAICompatibleEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let body = EmbeddingRequest {
            model: &self.model,
            input: vec![text],
            dimensions: self.send_dimensions.then_some(self.dimension),
        };

        let raw = post_json_with_retry(
            &self.client,
            &self.endpoint,
            &self.auth_headers,
            &body,
            &self.retry,
            "EMBED",
        )
        .await?;

        let response: EmbeddingResponse = serde_json::from_value(raw)
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding in response".to_string()))?;

        check_dimension(vector, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
