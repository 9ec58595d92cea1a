//! Hybrid ranking: BM25 lexical scoring, dense cosine similarity, and
//! reciprocal rank fusion.
//!
//! # Algorithm
//!
//! 1. Tokenize the query and every fragment into lowercase terms.
//! 2. Score each fragment with BM25 (term-frequency saturation, inverse
//!    document frequency, length normalization) over the collection
//!    snapshot.
//! 3. Score each fragment by cosine similarity between the query
//!    embedding and its stored embedding.
//! 4. Convert each channel into a ranked list and fuse with
//!    `score = Σ 1/(k + rank)`. Rank fusion sidesteps the fact that BM25
//!    scores and cosine similarities live on incomparable scales.
//! 5. Sort by fused score descending, ties broken by insertion order.
//!
//! Ranking is a pure computation over an immutable snapshot: no
//! mutation, safe to retry.

use std::collections::HashMap;

use crate::embedding::cosine_similarity;
use crate::models::Fragment;

/// BM25 tuning parameters. Standard defaults; not a bit-exact
/// compatibility surface.
#[derive(Debug, Clone)]
pub struct RankerParams {
    /// Term-frequency saturation (k1).
    pub bm25_k1: f64,
    /// Length normalization strength (b).
    pub bm25_b: f64,
    /// Reciprocal rank fusion constant.
    pub rrf_k: f64,
    /// Candidates fetched per channel before fusion.
    pub candidates: usize,
}

impl Default for RankerParams {
    fn default() -> Self {
        Self {
            bm25_k1: 1.5,
            bm25_b: 0.75,
            rrf_k: 60.0,
            candidates: 10,
        }
    }
}

/// Split text into lowercase alphanumeric terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// BM25 score per fragment for the given query terms.
///
/// Document count and average length come from the corpus slice passed
/// in, a consistent snapshot taken at query time.
fn bm25_scores(
    corpus_tokens: &[Vec<String>],
    query_terms: &[String],
    k1: f64,
    b: f64,
) -> Vec<f64> {
    let n = corpus_tokens.len();
    if n == 0 || query_terms.is_empty() {
        return vec![0.0; n];
    }

    let avgdl: f64 = corpus_tokens.iter().map(|d| d.len() as f64).sum::<f64>() / n as f64;

    let mut distinct_terms: Vec<&str> = query_terms.iter().map(String::as_str).collect();
    distinct_terms.sort_unstable();
    distinct_terms.dedup();

    // Document frequency per distinct query term
    let mut idf: HashMap<&str, f64> = HashMap::with_capacity(distinct_terms.len());
    for &term in &distinct_terms {
        let df = corpus_tokens
            .iter()
            .filter(|doc| doc.iter().any(|t| t == term))
            .count() as f64;
        // Lucene-style smoothed IDF, always non-negative
        let value = ((n as f64 - df + 0.5) / (df + 0.5) + 1.0).ln();
        idf.insert(term, value);
    }

    corpus_tokens
        .iter()
        .map(|doc| {
            let dl = doc.len() as f64;
            let mut score = 0.0;
            for &term in &distinct_terms {
                let tf = doc.iter().filter(|t| t.as_str() == term).count() as f64;
                if tf == 0.0 {
                    continue;
                }
                let norm = tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * dl / avgdl));
                score += idf[term] * norm;
            }
            score
        })
        .collect()
}

/// Ranked list of corpus indices, best first.
///
/// Only indices with a positive score participate: a fragment with zero
/// lexical overlap (or zero/negative cosine) contributes no signal in
/// that channel rather than a spurious reciprocal-rank bonus. Ties break
/// by insertion order.
fn ranked_indices(scores: &[f64], take: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).filter(|&i| scores[i] > 0.0).collect();
    indices.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    indices.truncate(take);
    indices
}

/// Produce the fused ranking over a collection snapshot.
///
/// Returns `(corpus_index, fused_score)` pairs, best first, truncated to
/// `limit`. An empty corpus yields an empty list. A query that tokenizes
/// to zero terms ranks on the dense channel alone. Fragments with no
/// positive signal in either channel are omitted entirely.
pub fn rank(
    fragments: &[Fragment],
    query: &str,
    query_vec: &[f32],
    params: &RankerParams,
    limit: usize,
) -> Vec<(usize, f64)> {
    if fragments.is_empty() || limit == 0 {
        return Vec::new();
    }

    let corpus_tokens: Vec<Vec<String>> =
        fragments.iter().map(|f| tokenize(&f.content)).collect();
    let query_terms = tokenize(query);

    let sparse =
        bm25_scores(&corpus_tokens, &query_terms, params.bm25_k1, params.bm25_b);
    let dense: Vec<f64> = fragments
        .iter()
        .map(|f| cosine_similarity(query_vec, &f.embedding) as f64)
        .collect();

    let take = params.candidates.max(limit);
    let sparse_list = ranked_indices(&sparse, take);
    let dense_list = ranked_indices(&dense, take);

    let mut fused: HashMap<usize, f64> = HashMap::new();
    for list in [&sparse_list, &dense_list] {
        for (rank0, &idx) in list.iter().enumerate() {
            *fused.entry(idx).or_insert(0.0) += 1.0 / (params.rrf_k + (rank0 + 1) as f64);
        }
    }

    let mut results: Vec<(usize, f64)> = fused.into_iter().collect();
    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FragmentMetadata;

    fn make_fragment(content: &str, embedding: Vec<f32>) -> Fragment {
        Fragment {
            id: format!("frag-{}", content.len()),
            content: content.to_string(),
            content_hash: crate::store::content_hash(content),
            embedding,
            metadata: FragmentMetadata::default(),
            added_at: 0,
        }
    }

    #[test]
    fn test_tokenize_lowercases_and_strips_punctuation() {
        assert_eq!(
            tokenize("Unity uses C#, right?"),
            vec!["unity", "uses", "c", "right"]
        );
        assert!(tokenize("!!! ...").is_empty());
    }

    #[test]
    fn test_bm25_prefers_matching_document() {
        let corpus = vec![
            tokenize("the quick brown fox jumps over the lazy dog"),
            tokenize("a fast cat runs across the street"),
        ];
        let query = tokenize("fox jumps");
        let scores = bm25_scores(&corpus, &query, 1.5, 0.75);
        assert!(scores[0] > scores[1]);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn test_bm25_term_frequency_saturates() {
        let corpus = vec![
            tokenize("fox fox fox fox fox fox fox fox"),
            tokenize("fox dog cat bird mouse deer wolf bear"),
        ];
        let query = tokenize("fox");
        let scores = bm25_scores(&corpus, &query, 1.5, 0.75);
        // More occurrences score higher, but not 8x higher
        assert!(scores[0] > scores[1]);
        assert!(scores[0] < scores[1] * 8.0);
    }

    #[test]
    fn test_bm25_empty_query_is_uniform_zero() {
        let corpus = vec![tokenize("alpha beta"), tokenize("gamma delta")];
        let scores = bm25_scores(&corpus, &[], 1.5, 0.75);
        assert_eq!(scores, vec![0.0, 0.0]);
    }

    #[test]
    fn test_rank_empty_corpus() {
        let results = rank(&[], "anything", &[1.0, 0.0], &RankerParams::default(), 5);
        assert!(results.is_empty());
    }

    #[test]
    fn test_rank_is_deterministic() {
        let fragments = vec![
            make_fragment("unity scripting basics", vec![1.0, 0.0, 0.0]),
            make_fragment("unity scene management", vec![0.9, 0.1, 0.0]),
            make_fragment("python machine learning", vec![0.0, 1.0, 0.0]),
        ];
        let params = RankerParams::default();
        let first = rank(&fragments, "unity scripting", &[1.0, 0.0, 0.0], &params, 3);
        for _ in 0..5 {
            let again = rank(&fragments, "unity scripting", &[1.0, 0.0, 0.0], &params, 3);
            let a: Vec<usize> = first.iter().map(|(i, _)| *i).collect();
            let b: Vec<usize> = again.iter().map(|(i, _)| *i).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_fusion_top_in_both_channels_wins() {
        // Fragment 0 wins lexically (exact terms) and semantically
        // (identical vector); it must top the fused ranking.
        let fragments = vec![
            make_fragment("api key rotation policy", vec![1.0, 0.0]),
            make_fragment("null check pattern", vec![0.0, 1.0]),
            make_fragment("coroutine usage notes", vec![0.5, 0.5]),
        ];
        let results = rank(
            &fragments,
            "api key rotation",
            &[1.0, 0.0],
            &RankerParams::default(),
            3,
        );
        assert_eq!(results[0].0, 0);
    }

    #[test]
    fn test_punctuation_only_query_uses_dense_channel() {
        let fragments = vec![
            make_fragment("alpha", vec![0.0, 1.0]),
            make_fragment("beta", vec![1.0, 0.0]),
        ];
        let results = rank(&fragments, "???", &[1.0, 0.0], &RankerParams::default(), 2);
        // No lexical signal at all; the semantically closer fragment wins.
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let fragments = vec![
            make_fragment("same words here", vec![1.0, 0.0]),
            make_fragment("same words here too maybe", vec![1.0, 0.0]),
        ];
        // Identical embeddings; dense ranks tie and fall back to index.
        let results = rank(&fragments, "", &[1.0, 0.0], &RankerParams::default(), 2);
        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 1);
    }

    #[test]
    fn test_rank_respects_limit() {
        let fragments: Vec<Fragment> = (0..10)
            .map(|i| make_fragment(&format!("fragment number {}", i), vec![1.0, i as f32]))
            .collect();
        let results = rank(
            &fragments,
            "fragment",
            &[1.0, 0.0],
            &RankerParams::default(),
            3,
        );
        assert_eq!(results.len(), 3);
    }
}
