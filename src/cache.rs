//! Result cache: the ranked list from the most recent `find`, persisted to
//! `.ember/.last_search.json` so `cat 3` and `open 3` can resolve numeric
//! references. Id-prefix lookups bypass the cache and hit the store.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{EmberError, Result};
use crate::store::Store;
use crate::types::{Chunk, Query, SearchResult};

/// One cached hit — the chunk fields flattened, plus rank and explanation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedResult {
    pub rank: usize,
    pub score: f32,
    pub path: String,
    pub lang: String,
    pub symbol: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub chunk_id: String,
    pub tree_sha: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedSearch {
    pub query: Query,
    pub results: Vec<CachedResult>,
}

impl CachedResult {
    pub fn from_search(result: &SearchResult) -> Self {
        Self {
            rank: result.rank,
            score: result.score,
            path: result.chunk.path.clone(),
            lang: result.chunk.lang.clone(),
            symbol: result.chunk.symbol.clone(),
            start_line: result.chunk.start_line,
            end_line: result.chunk.end_line,
            content: result.chunk.content.clone(),
            chunk_id: result.chunk.id.clone(),
            tree_sha: result.chunk.tree_sha.clone(),
            explanation: result.explanation.clone(),
        }
    }

    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            rank: 0,
            score: 0.0,
            path: chunk.path.clone(),
            lang: chunk.lang.clone(),
            symbol: chunk.symbol.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            content: chunk.content.clone(),
            chunk_id: chunk.id.clone(),
            tree_sha: chunk.tree_sha.clone(),
            explanation: String::new(),
        }
    }
}

/// Persist the ranked list. Called after every successful search.
pub fn write_cache(path: &Path, query: &Query, results: &[SearchResult]) -> Result<()> {
    let cached = CachedSearch {
        query: query.clone(),
        results: results.iter().map(CachedResult::from_search).collect(),
    };
    let text = serde_json::to_string_pretty(&cached)
        .map_err(|e| EmberError::Unknown(format!("failed to serialize search cache: {e}")))?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Load the cache, insisting it exists and holds at least one result.
pub fn load_cache(path: &Path) -> Result<CachedSearch> {
    if !path.exists() {
        return Err(EmberError::NoSearchResults);
    }
    let text = std::fs::read_to_string(path)?;
    let cached: CachedSearch = serde_json::from_str(&text).map_err(|_| {
        EmberError::Unknown("Corrupted search cache; run 'ember find <query>' to refresh it".into())
    })?;
    if cached.results.is_empty() {
        return Err(EmberError::NoSearchResults);
    }
    Ok(cached)
}

/// The i-th result, 1-based.
pub fn lookup_by_index(cached: &CachedSearch, index: usize) -> Result<&CachedResult> {
    if index < 1 || index > cached.results.len() {
        return Err(EmberError::IndexOutOfRange {
            index,
            max: cached.results.len(),
        });
    }
    Ok(&cached.results[index - 1])
}

/// Resolve an id prefix against the whole store: exactly one match wins;
/// ambiguity lists up to five candidates.
pub fn lookup_by_prefix(store: &Store, prefix: &str) -> Result<Chunk> {
    let mut matches = store.find_by_id_prefix(prefix)?;
    if matches.is_empty() {
        return Err(EmberError::ChunkNotFound(prefix.to_string()));
    }
    if matches.len() == 1 {
        return Ok(matches.remove(0));
    }
    let count = matches.len();
    let mut listing: String = matches
        .iter()
        .take(5)
        .map(|c| format!("  {}", c.id))
        .collect::<Vec<_>>()
        .join("\n");
    if count > 5 {
        listing.push_str(&format!("\n  ... and {} more", count - 5));
    }
    Err(EmberError::AmbiguousIdPrefix {
        prefix: prefix.to_string(),
        count,
        listing,
    })
}
