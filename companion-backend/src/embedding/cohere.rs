use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

use super::{check_dimension, EmbeddingError, EmbeddingProvider};
use crate::ai::retry::{post_json_with_retry, RetryPolicy};
use crate::http::EMBEDDING_TIMEOUT;

const COHERE_EMBED_ENDPOINT: &str = "https://api.cohere.com/v2/embed";

pub struct CohereEmbedder {
    client: Client,
    auth_headers: header::HeaderMap,
    endpoint: String,
    model: String,
    dimension: usize,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct CohereEmbedRequest<'a> {
    model: &'a str,
    texts: Vec<&'a str>,
    input_type: &'static str,
    embedding_types: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct CohereEmbedResponse {
    embeddings: CohereEmbeddings,
}

#[derive(Debug, Deserialize)]
struct CohereEmbeddings {
    #[serde(default)]
    float: Vec<Vec<f32>>,
}

impl CohereEmbedder {
    pub fn new(api_key: &str, endpoint: Option<&str>, model: &str, dimension: usize) -> Result<Self, EmbeddingError> {
        if api_key.is_empty() {
            return Err(EmbeddingError::Config("cohere embeddings need an API key".to_string()));
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
            endpoint: endpoint.unwrap_or(COHERE_EMBED_ENDPOINT).to_string(),
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
impl EmbeddingProvider for CohereEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        // Memories are stored and queried with the same text shape, so one input type serves both.
        let body = CohereEmbedRequest {
            model: &self.model,
            texts: vec![text],
            input_type: "search_document",
            embedding_types: vec!["float"],
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

        let response: CohereEmbedResponse = serde_json::from_value(raw)
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        let vector = response
            .embeddings
            .float
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding in response".to_string()))?;

        check_dimension(vector, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "cohere"
    }
}
