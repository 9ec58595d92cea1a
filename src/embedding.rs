//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and two concrete implementations:
//! - **[`DisabledProvider`]**: fails every call; used when embeddings are
//!   not configured.
//! - **[`HttpProvider`]**: calls an OpenAI-compatible embeddings endpoint
//!   with retry and exponential backoff.
//!
//! Also provides the vector utilities shared by the store and ranker:
//! [`cosine_similarity`], [`vec_to_blob`], and [`blob_to_vec`]
//! (little-endian f32 bytes for SQLite BLOB storage).
//!
//! # Retry Strategy
//!
//! The HTTP provider retries transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! All failures surface as [`RagError::EmbeddingUnavailable`] so callers
//! can tell an embedding outage apart from validation or storage errors.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

/// Contract for turning text into a fixed-length dense vector.
///
/// Providers are stateless per call, potentially slow (tens to hundreds
/// of milliseconds), and potentially unavailable. The engine embeds
/// before taking any collection lock, so a slow provider never blocks
/// concurrent reads.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text. Must return a vector of [`dims`](Self::dims) length.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier (e.g. `"all-MiniLM-L6-v2"`).
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;
}

// ============ Disabled Provider ============

/// Provider used when embeddings are not configured.
///
/// Every call fails with [`RagError::EmbeddingUnavailable`]; the engine
/// stays honest instead of silently degrading to sparse-only ranking.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::embedding_unavailable(
            "embedding provider is disabled; set [embedding] provider in config",
        ))
    }

    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }
}

// ============ HTTP Provider ============

/// Embedding provider backed by an OpenAI-compatible HTTP endpoint.
///
/// Posts `{"model": ..., "input": [text]}` to the configured endpoint.
/// If the `SYNRAG_EMBEDDING_API_KEY` environment variable is set, it is
/// sent as a bearer token (local model servers usually need none).
pub struct HttpProvider {
    endpoint: String,
    model: String,
    dims: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| RagError::validation("embedding.endpoint required for http provider"))?;
        let model = config
            .model
            .clone()
            .ok_or_else(|| RagError::validation("embedding.model required for http provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| RagError::validation("embedding.dims required for http provider"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::embedding_unavailable(format!("http client init: {}", e)))?;

        Ok(Self {
            endpoint,
            model,
            dims,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn request_once(&self, text: &str) -> std::result::Result<Vec<f32>, (bool, RagError)> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Ok(key) = std::env::var("SYNRAG_EMBEDDING_API_KEY") {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.send().await.map_err(|e| {
            (
                true,
                RagError::embedding_unavailable(format!("network error: {}", e)),
            )
        })?;

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response.json().await.map_err(|e| {
                (
                    false,
                    RagError::embedding_unavailable(format!("invalid response body: {}", e)),
                )
            })?;
            return parse_embedding_response(&json, self.dims).map_err(|e| (false, e));
        }

        let retryable = status.as_u16() == 429 || status.is_server_error();
        let body_text = response.text().await.unwrap_or_default();
        Err((
            retryable,
            RagError::embedding_unavailable(format!("endpoint returned {}: {}", status, body_text)),
        ))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(attempt, "retrying embedding request after {:?}", delay);
                tokio::time::sleep(delay).await;
            }

            match self.request_once(text).await {
                Ok(vec) => {
                    debug!(dims = vec.len(), "embedding computed");
                    return Ok(vec);
                }
                Err((retryable, e)) => {
                    if !retryable {
                        return Err(e);
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::embedding_unavailable("embedding failed after retries")))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Extract `data[0].embedding` from an OpenAI-shaped response.
fn parse_embedding_response(json: &serde_json::Value, expected_dims: usize) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RagError::embedding_unavailable("invalid response: missing data[0].embedding")
        })?;

    let vec: Vec<f32> = embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect();

    if vec.len() != expected_dims {
        return Err(RagError::embedding_unavailable(format!(
            "endpoint returned {} dims, expected {}",
            vec.len(),
            expected_dims
        )));
    }

    Ok(vec)
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "http" => Ok(Arc::new(HttpProvider::new(config)?)),
        other => Err(RagError::validation(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        // Exact f32 values (powers of two and their sums) so equality
        // holds bit-for-bit through the BLOB encoding.
        let vec = vec![0.5f32, -6.25, 1.125, 0.0, 384.0];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), vec.len() * 4);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_is_scale_invariant() {
        let v = vec![0.3, 0.6, 0.9];
        let scaled: Vec<f32> = v.iter().map(|x| x * 7.0).collect();
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&v, &scaled) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![0.0, 2.0, 0.0];
        let b = vec![0.0, 0.0, 5.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![0.5, 0.5];
        let b = vec![-0.5, -0.5];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.4, 0.8], &[0.4]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_disabled_provider_fails_loudly() {
        let provider = DisabledProvider;
        let err = provider.embed("anything").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable { .. }));
    }

    #[test]
    fn test_parse_embedding_response() {
        let json = serde_json::json!({
            "data": [{"embedding": [0.1, 0.2, 0.3]}]
        });
        let vec = parse_embedding_response(&json, 3).unwrap();
        assert_eq!(vec.len(), 3);

        let err = parse_embedding_response(&json, 4).unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable { .. }));

        let bad = serde_json::json!({"data": []});
        assert!(parse_embedding_response(&bad, 3).is_err());
    }
}
