//! The retrieval facade: the only surface external callers talk to.
//!
//! [`RagEngine`] owns both collection stores and the embedding provider,
//! enforces the safe-default visibility policy (everything defaults to
//! private to prevent accidental leaks), and merges per-collection
//! rankings into a single source-tagged result list.
//!
//! Construct one engine per process and pass it by reference to whatever
//! hosts it; there is no ambient global instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audit::{self, LeakWarning};
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::models::{CollectionStats, FragmentMetadata, RankedResult, Scope, Visibility};
use crate::ranker::{self, RankerParams};
use crate::store::{content_hash, normalize_content, FragmentStore};

/// Facade availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Both collections open, provider healthy as of the last call.
    Ready,
    /// The embedding provider failed on the last call; embedding-dependent
    /// operations fail fast until it recovers.
    Degraded,
}

/// A suspected leak found in the public collection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PublicLeakWarning {
    pub fragment_id: String,
    pub pattern: &'static str,
    pub excerpt: String,
}

/// Combined statistics for both collections.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    pub public: CollectionStats,
    pub private: CollectionStats,
}

pub struct RagEngine {
    public: FragmentStore,
    private: FragmentStore,
    provider: Arc<dyn EmbeddingProvider>,
    ranker_params: RankerParams,
    default_limit: usize,
    candidate_multiplier: usize,
    max_content_bytes: usize,
    degraded: AtomicBool,
}

impl RagEngine {
    /// Open both collections and construct the facade.
    ///
    /// Collections are created at first use and persist for the lifetime
    /// of the installation. There is no close step: every write is
    /// flushed durably as it commits.
    pub async fn open(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let public =
            FragmentStore::open(config.storage.public_path.clone(), Visibility::Public).await?;
        let private =
            FragmentStore::open(config.storage.private_path.clone(), Visibility::Private).await?;

        info!(
            public = %config.storage.public_path.display(),
            private = %config.storage.private_path.display(),
            model = provider.model_name(),
            "retrieval engine ready"
        );

        Ok(Self {
            public,
            private,
            provider,
            ranker_params: RankerParams {
                bm25_k1: config.retrieval.bm25_k1,
                bm25_b: config.retrieval.bm25_b,
                rrf_k: config.retrieval.rrf_k,
                candidates: config.retrieval.default_limit * config.retrieval.candidate_multiplier,
            },
            default_limit: config.retrieval.default_limit,
            candidate_multiplier: config.retrieval.candidate_multiplier,
            max_content_bytes: config.limits.max_content_bytes,
            degraded: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> EngineState {
        if self.degraded.load(Ordering::Relaxed) {
            EngineState::Degraded
        } else {
            EngineState::Ready
        }
    }

    /// Add a fragment to the **private** collection.
    ///
    /// Private is the deliberate safe default; there is no visibility
    /// parameter here, so a typo or omitted argument can never leak
    /// content. Publishing requires the separate [`add_public`] call.
    ///
    /// Idempotent: re-adding identical normalized content returns the
    /// existing fragment id without re-embedding.
    ///
    /// [`add_public`]: RagEngine::add_public
    pub async fn add(
        &self,
        text: &str,
        metadata: FragmentMetadata,
        timeout: Option<Duration>,
    ) -> Result<String> {
        with_deadline(timeout, self.add_to(&self.private, text, metadata)).await
    }

    /// Add a fragment to the **public** collection.
    ///
    /// Deliberately a separate method rather than a flag on [`add`]:
    /// the public path must be visibly distinct at every call site.
    ///
    /// [`add`]: RagEngine::add
    pub async fn add_public(
        &self,
        text: &str,
        metadata: FragmentMetadata,
        timeout: Option<Duration>,
    ) -> Result<String> {
        with_deadline(timeout, self.add_to(&self.public, text, metadata)).await
    }

    async fn add_to(
        &self,
        store: &FragmentStore,
        text: &str,
        metadata: FragmentMetadata,
    ) -> Result<String> {
        let normalized = self.validate_content(text)?;
        let hash = content_hash(&normalized);

        // Embedding is the expensive step; skip it when the content is
        // already stored. The store re-checks under its write lock.
        if let Some(existing) = store.find_by_hash(&hash).await? {
            debug!(collection = %store.visibility(), id = %existing, "duplicate add");
            return Ok(existing);
        }

        let embedding = self.embed_checked(&normalized).await?;
        store.insert(&normalized, &hash, &embedding, &metadata).await
    }

    /// Search one or both collections, returning source-tagged results
    /// ordered by descending fused relevance.
    ///
    /// Each collection is ranked independently over its own snapshot;
    /// results are merged only at this presentation step, so fragments
    /// are never mixed across collections during scoring.
    pub async fn search(
        &self,
        query: &str,
        scope: Scope,
        limit: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<Vec<RankedResult>> {
        with_deadline(timeout, self.search_scoped(query, scope, limit)).await
    }

    async fn search_scoped(
        &self,
        query: &str,
        scope: Scope,
        limit: Option<usize>,
    ) -> Result<Vec<RankedResult>> {
        let limit = limit.unwrap_or(self.default_limit);
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self.embed_checked(query).await?;

        let params = RankerParams {
            candidates: limit * self.candidate_multiplier,
            ..self.ranker_params.clone()
        };

        // Merge order is fixed (public then private); the stable sort
        // below makes equal-score ordering deterministic.
        let mut merged: Vec<RankedResult> = Vec::new();
        for &visibility in scope.visibilities() {
            let store = self.store(visibility);
            let fragments = store.get_all().await?;
            let ranked = ranker::rank(&fragments, query, &query_vec, &params, limit);
            debug!(
                collection = %visibility,
                corpus = fragments.len(),
                hits = ranked.len(),
                "collection ranked"
            );

            for (idx, score) in ranked {
                let fragment = &fragments[idx];
                merged.push(RankedResult {
                    fragment_id: fragment.id.clone(),
                    content: fragment.content.clone(),
                    score,
                    source: visibility,
                });
            }
        }

        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(limit);
        Ok(merged)
    }

    /// Remove a fragment from the given collection; returns whether it
    /// existed. Deletion is always an explicit administrative action.
    pub async fn delete(&self, visibility: Visibility, fragment_id: &str) -> Result<bool> {
        self.store(visibility).delete(fragment_id).await
    }

    /// Scan the public collection for content that looks like a private
    /// artifact.
    ///
    /// Advisory only: it never blocks an add and runs after the fact.
    pub async fn audit_public(&self) -> Result<Vec<PublicLeakWarning>> {
        let fragments = self.public.get_all().await?;
        let mut warnings = Vec::new();

        for fragment in &fragments {
            for LeakWarning { pattern, excerpt } in audit::scan_content(&fragment.content) {
                warnings.push(PublicLeakWarning {
                    fragment_id: fragment.id.clone(),
                    pattern,
                    excerpt,
                });
            }
        }

        if !warnings.is_empty() {
            warn!(count = warnings.len(), "suspected leaks in public collection");
        }
        Ok(warnings)
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            public: self.public.stats().await?,
            private: self.private.stats().await?,
        })
    }

    fn store(&self, visibility: Visibility) -> &FragmentStore {
        match visibility {
            Visibility::Public => &self.public,
            Visibility::Private => &self.private,
        }
    }

    fn validate_content(&self, text: &str) -> Result<String> {
        let normalized = normalize_content(text);
        if normalized.is_empty() {
            return Err(RagError::validation("content is empty"));
        }
        if normalized.len() > self.max_content_bytes {
            return Err(RagError::validation(format!(
                "content is {} bytes, maximum is {}; chunk before inserting",
                normalized.len(),
                self.max_content_bytes
            )));
        }
        Ok(normalized)
    }

    /// Embed one text, tracking provider health.
    async fn embed_checked(&self, text: &str) -> Result<Vec<f32>> {
        match self.provider.embed(text).await {
            Ok(vec) => {
                if self.degraded.swap(false, Ordering::Relaxed) {
                    info!("embedding provider recovered");
                }
                Ok(vec)
            }
            Err(e @ RagError::EmbeddingUnavailable { .. }) => {
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    warn!("embedding provider unavailable, engine degraded");
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

/// Run a whole operation under the caller's optional deadline.
///
/// On expiry the in-flight future is dropped. The only write in any
/// operation is a single atomic INSERT, so a cancelled call either
/// committed the full fragment or nothing; the dedup hash makes a retry
/// safe in both cases.
async fn with_deadline<T>(
    timeout: Option<Duration>,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(deadline) => match tokio::time::timeout(deadline, fut).await {
            Ok(inner) => inner,
            Err(_) => Err(RagError::Timeout {
                millis: deadline.as_millis() as u64,
            }),
        },
        None => fut.await,
    }
}
