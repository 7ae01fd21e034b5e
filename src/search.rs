//! Hybrid retrieval: BM25 text hits and cosine vector hits, fused with
//! weighted reciprocal-rank fusion.
//!
//! RRF was chosen over score-normalized weighted sums because BM25 values
//! and cosine similarities live on incomparable scales; rank-based fusion
//! needs no per-query normalization, which makes the determinism guarantee
//! (identical input over an unchanged index => byte-identical output,
//! including tie order) trivial to uphold. Ties break by ascending chunk id.

use std::collections::BTreeMap;

use crate::embedder::Embedder;
use crate::errors::{EmberError, Result};
use crate::store::{SearchFilters, Store};
use crate::types::{Query, SearchResult};

/// RRF dampening constant; the conventional value.
const RRF_K: f64 = 60.0;
/// Signal weights. Equal by default — BM25 and embeddings earn their rank.
const TEXT_WEIGHT: f64 = 1.0;
const VECTOR_WEIGHT: f64 = 1.0;

pub struct HybridSearch<'a> {
    store: &'a Store,
    embedder: &'a dyn Embedder,
    /// Each signal fetches `topk * overfetch` candidates before fusion.
    overfetch: usize,
}

impl<'a> HybridSearch<'a> {
    pub fn new(store: &'a Store, embedder: &'a dyn Embedder, overfetch: usize) -> Self {
        Self {
            store,
            embedder,
            overfetch: overfetch.max(1),
        }
    }

    pub fn search(&self, query: &Query) -> Result<Vec<SearchResult>> {
        let filters = SearchFilters {
            path_glob: query.path_filter.clone(),
            lang: query.lang_filter.clone(),
        };
        let fetch = query.topk.max(1) * self.overfetch;

        let query_vector = self
            .embedder
            .embed_texts(std::slice::from_ref(&query.text))?
            .into_iter()
            .next()
            .ok_or_else(|| EmberError::Embedding("empty embedding batch for query".into()))?;

        let text_ids: Vec<String> = self
            .store
            .text_search(&query.text, fetch, &filters)?
            .into_iter()
            .map(|h| h.chunk_id)
            .collect();
        let vector_ids: Vec<String> = self
            .store
            .vector_search(&query_vector, fetch, &filters)?
            .into_iter()
            .map(|h| h.chunk_id)
            .collect();

        let fused = fuse_rankings(&text_ids, &vector_ids);

        let mut results = Vec::new();
        for candidate in fused.into_iter().take(query.topk) {
            // A chunk deleted between ranking and hydration just drops out.
            let Some(chunk) = self.store.get_chunk(&candidate.chunk_id)? else {
                continue;
            };
            let preview = chunk.preview_line().to_string();
            results.push(SearchResult {
                rank: results.len() + 1,
                score: candidate.score as f32,
                chunk,
                preview,
                explanation: candidate.explanation(),
            });
        }
        Ok(results)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Fused {
    chunk_id: String,
    score: f64,
    text_rank: Option<usize>,
    vector_rank: Option<usize>,
}

impl Fused {
    fn explanation(&self) -> String {
        match (self.text_rank, self.vector_rank) {
            (Some(t), Some(v)) => format!("text #{t} + semantic #{v}"),
            (Some(t), None) => format!("text #{t}"),
            (None, Some(v)) => format!("semantic #{v}"),
            (None, None) => String::new(),
        }
    }
}

/// Weighted RRF over the two rankings: `score = Σ w / (K + rank)`, ranks
/// 1-based. Output is strictly ordered: score descending, then chunk id
/// ascending.
fn fuse_rankings(text_ids: &[String], vector_ids: &[String]) -> Vec<Fused> {
    let mut by_id: BTreeMap<&str, (Option<usize>, Option<usize>)> = BTreeMap::new();
    for (i, id) in text_ids.iter().enumerate() {
        by_id.entry(id).or_default().0 = Some(i + 1);
    }
    for (i, id) in vector_ids.iter().enumerate() {
        by_id.entry(id).or_default().1 = Some(i + 1);
    }

    let mut fused: Vec<Fused> = by_id
        .into_iter()
        .map(|(id, (text_rank, vector_rank))| {
            let mut score = 0.0;
            if let Some(r) = text_rank {
                score += TEXT_WEIGHT / (RRF_K + r as f64);
            }
            if let Some(r) = vector_rank {
                score += VECTOR_WEIGHT / (RRF_K + r as f64);
            }
            Fused {
                chunk_id: id.to_string(),
                score,
                text_rank,
                vector_rank,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused
}
