//! [`EmbeddingDriver`] – OpenAI-compatible text embeddings.
//!
//! The engine depends only on the [`Embedder`] trait. [`EmbeddingDriver`]
//! calls `/v1/embeddings` on the same kind of model server the
//! [`LlmDriver`][crate::llm_driver::LlmDriver] uses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can arise while embedding text.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
    #[error("Embedding backend returned an empty vector")]
    Empty,
}

/// The external embedding collaborator.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// An async client for an OpenAI-compatible embeddings endpoint.
pub struct EmbeddingDriver {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl EmbeddingDriver {
    /// Create a driver for `model` (e.g. `"nomic-embed-text"`) at `base_url`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }
}

#[async_trait]
impl Embedder for EmbeddingDriver {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: EmbeddingResponse = request.send().await?.error_for_status()?.json().await?;
        first_embedding(response)
    }
}

fn first_embedding(response: EmbeddingResponse) -> Result<Vec<f32>, EmbeddingError> {
    let embedding = response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| EmbeddingError::BadResponse("empty data array".into()))?;
    if embedding.is_empty() {
        return Err(EmbeddingError::Empty);
    }
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Vec<f32>, EmbeddingError> {
        first_embedding(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn first_embedding_is_extracted() {
        let v = parse(r#"{"object":"list","data":[{"index":0,"embedding":[0.25,-0.5]}]}"#).unwrap();
        assert_eq!(v, vec![0.25, -0.5]);
    }

    #[test]
    fn missing_data_is_bad_response() {
        assert!(matches!(parse(r#"{"data":[]}"#), Err(EmbeddingError::BadResponse(_))));
    }

    #[test]
    fn empty_vector_is_rejected() {
        assert!(matches!(parse(r#"{"data":[{"embedding":[]}]}"#), Err(EmbeddingError::Empty)));
    }

    #[tokio::test]
    async fn embed_returns_http_error_when_server_unavailable() {
        let driver = EmbeddingDriver::new("http://127.0.0.1:9", "nomic-embed-text");
        assert!(matches!(driver.embed("hello").await, Err(EmbeddingError::Http(_))));
    }
}
