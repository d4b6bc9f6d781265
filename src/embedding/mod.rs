//! Embedding client abstraction and adapters.
//!
//! The gateway contract: one fixed-length vector per input text, in input
//! order. Inputs are submitted in bounded-size batches to stay under provider
//! request limits; a failure in any batch fails the whole call, since partial
//! embedding results cannot be safely upserted by the caller.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// HTTP layer failed before receiving a response.
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with an unexpected status code.
    #[error("unexpected embedding response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider returned a different number of vectors than inputs.
    #[error("provider returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of texts submitted in the batch.
        expected: usize,
        /// Number of vectors the provider returned.
        actual: usize,
    },
    /// Returned vector does not match the configured dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality configured for the collection.
        expected: usize,
        /// Dimensionality of the vector the provider produced.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text, preserving order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// HTTP embedding client speaking the common `/embeddings` JSON shape.
pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    batch_size: usize,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingObject>,
}

#[derive(Deserialize)]
struct EmbeddingObject {
    embedding: Vec<f32>,
}

impl HttpEmbeddingClient {
    /// Construct a client for the given provider endpoint and model.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        dimension: usize,
        batch_size: usize,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder().user_agent("cortex-rag/0.1").build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            dimension,
            batch_size: batch_size.max(1),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&json!({
                "model": self.model,
                "input": batch,
            }));
        if let Some(api_key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = EmbeddingError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Embedding request failed");
            return Err(error);
        }

        let payload: EmbeddingsResponse = response.json().await?;
        if payload.data.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: batch.len(),
                actual: payload.data.len(),
            });
        }

        let mut vectors = Vec::with_capacity(payload.data.len());
        for object in payload.data {
            if object.embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: object.embedding.len(),
                });
            }
            vectors.push(object.embedding);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            model = %self.model,
            texts = texts.len(),
            batch_size = self.batch_size,
            "Generating embeddings"
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

/// Deterministic local embedding client.
///
/// Folds input bytes into a normalized vector of the configured dimension.
/// Useful for tests and offline development where no provider is reachable;
/// identical texts always map to identical vectors.
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Construct a deterministic embedding client with the given dimensionality.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        if text.is_empty() || self.dimension == 0 {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % self.dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn vector_of(dimension: usize, value: f32) -> Vec<f32> {
        vec![value; dimension]
    }

    #[tokio::test]
    async fn batches_inputs_and_preserves_order() {
        let server = MockServer::start_async().await;

        let first = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .json_body(json!({ "model": "embed-test", "input": ["a", "b"] }));
                then.status(200).json_body(json!({
                    "data": [
                        { "embedding": vector_of(3, 0.1) },
                        { "embedding": vector_of(3, 0.2) }
                    ]
                }));
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .json_body(json!({ "model": "embed-test", "input": ["c"] }));
                then.status(200).json_body(json!({
                    "data": [
                        { "embedding": vector_of(3, 0.3) }
                    ]
                }));
            })
            .await;

        let client = HttpEmbeddingClient::new(&server.base_url(), None, "embed-test", 3, 2)
            .expect("client");
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let vectors = client.embed(&texts).await.expect("embeddings");

        first.assert();
        second.assert();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vector_of(3, 0.1));
        assert_eq!(vectors[1], vector_of(3, 0.2));
        assert_eq!(vectors[2], vector_of(3, 0.3));
    }

    #[tokio::test]
    async fn batch_failure_fails_whole_call() {
        let server = MockServer::start_async().await;

        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .json_body(json!({ "model": "embed-test", "input": ["a", "b"] }));
                then.status(200).json_body(json!({
                    "data": [
                        { "embedding": vector_of(3, 0.1) },
                        { "embedding": vector_of(3, 0.2) }
                    ]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .json_body(json!({ "model": "embed-test", "input": ["c"] }));
                then.status(500).body("provider exploded");
            })
            .await;

        let client = HttpEmbeddingClient::new(&server.base_url(), None, "embed-test", 3, 2)
            .expect("client");
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let error = client.embed(&texts).await.unwrap_err();
        assert!(matches!(error, EmbeddingError::UnexpectedStatus { .. }));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let server = MockServer::start_async().await;

        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [
                        { "embedding": vector_of(2, 0.5) }
                    ]
                }));
            })
            .await;

        let client = HttpEmbeddingClient::new(&server.base_url(), None, "embed-test", 3, 10)
            .expect("client");
        let error = client.embed(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(
            error,
            EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn empty_input_skips_the_provider() {
        let client = HttpEmbeddingClient::new("http://127.0.0.1:1", None, "embed-test", 3, 10)
            .expect("client");
        let vectors = client.embed(&[]).await.expect("empty");
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn hash_client_is_deterministic_and_normalized() {
        let client = HashEmbeddingClient::new(8);
        let texts = vec!["stable input".to_string()];
        let first = client.embed(&texts).await.expect("first");
        let second = client.embed(&texts).await.expect("second");
        assert_eq!(first, second);

        let norm: f32 = first[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
