use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Path to the public collection database file.
    #[serde(default = "default_public_path")]
    pub public_path: PathBuf,
    /// Path to the private collection database file. Kept physically
    /// separate so a bulk export of public data can never include
    /// private bytes.
    #[serde(default = "default_private_path")]
    pub private_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_path: default_public_path(),
            private_path: default_private_path(),
        }
    }
}

fn default_public_path() -> PathBuf {
    PathBuf::from("synthesis_knowledge.db")
}
fn default_private_path() -> PathBuf {
    PathBuf::from("synthesis_knowledge_private.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// BM25 term-frequency saturation parameter.
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,
    /// BM25 length-normalization parameter.
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,
    /// Reciprocal rank fusion constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    /// Results returned when the caller does not pass a limit.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Each channel (sparse/dense) fetches `limit * candidate_multiplier`
    /// candidates before fusion.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
            rrf_k: default_rrf_k(),
            default_limit: default_limit(),
            candidate_multiplier: default_candidate_multiplier(),
        }
    }
}

fn default_bm25_k1() -> f64 {
    1.5
}
fn default_bm25_b() -> f64 {
    0.75
}
fn default_rrf_k() -> f64 {
    60.0
}
fn default_limit() -> usize {
    5
}
fn default_candidate_multiplier() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"disabled"` or `"http"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// OpenAI-compatible embeddings endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: None,
            model: None,
            dims: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Content larger than this is rejected rather than truncated;
    /// truncation would silently corrupt the embedding's meaning, so the
    /// caller must chunk before inserting.
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: default_max_content_bytes(),
        }
    }
}

fn default_max_content_bytes() -> usize {
    32 * 1024
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| RagError::validation(format!("failed to read config {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| RagError::validation(format!("failed to parse config: {}", e)))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.bm25_k1 <= 0.0 {
        return Err(RagError::validation("retrieval.bm25_k1 must be > 0"));
    }
    if !(0.0..=1.0).contains(&config.retrieval.bm25_b) {
        return Err(RagError::validation("retrieval.bm25_b must be in [0.0, 1.0]"));
    }
    if config.retrieval.rrf_k <= 0.0 {
        return Err(RagError::validation("retrieval.rrf_k must be > 0"));
    }
    if config.retrieval.default_limit == 0 {
        return Err(RagError::validation("retrieval.default_limit must be >= 1"));
    }
    if config.retrieval.candidate_multiplier == 0 {
        return Err(RagError::validation(
            "retrieval.candidate_multiplier must be >= 1",
        ));
    }
    if config.limits.max_content_bytes == 0 {
        return Err(RagError::validation("limits.max_content_bytes must be > 0"));
    }
    if config.storage.public_path == config.storage.private_path {
        return Err(RagError::validation(
            "storage.public_path and storage.private_path must be distinct files",
        ));
    }

    match config.embedding.provider.as_str() {
        "disabled" | "http" => {}
        other => {
            return Err(RagError::validation(format!(
                "unknown embedding provider: '{}'. Must be disabled or http.",
                other
            )))
        }
    }

    if config.embedding.is_enabled() {
        if config.embedding.endpoint.is_none() {
            return Err(RagError::validation(
                "embedding.endpoint must be set when provider is 'http'",
            ));
        }
        if config.embedding.model.is_none() {
            return Err(RagError::validation(
                "embedding.model must be set when provider is 'http'",
            ));
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            return Err(RagError::validation(
                "embedding.dims must be > 0 when provider is 'http'",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.retrieval.default_limit, 5);
        assert!((config.retrieval.rrf_k - 60.0).abs() < f64::EPSILON);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_rejects_same_path_for_both_collections() {
        let mut config = Config::default();
        config.storage.private_path = config.storage.public_path.clone();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_http_provider_requires_endpoint_and_dims() {
        let mut config = Config::default();
        config.embedding.provider = "http".to_string();
        assert!(validate(&config).is_err());

        config.embedding.endpoint = Some("http://localhost:8080/v1/embeddings".to_string());
        config.embedding.model = Some("all-MiniLM-L6-v2".to_string());
        config.embedding.dims = Some(384);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [retrieval]
            default_limit = 10

            [limits]
            max_content_bytes = 1024
            "#,
        )
        .unwrap();
        assert_eq!(config.retrieval.default_limit, 10);
        assert_eq!(config.limits.max_content_bytes, 1024);
        assert!((config.retrieval.bm25_k1 - 1.5).abs() < f64::EPSILON);
    }
}
