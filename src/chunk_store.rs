//! Chunk storage service: persist one file's chunks and vectors together,
//! or not at all.
//!
//! Order matters. Embeddings are computed for the whole file in one batch
//! *before* any write, so an embedding failure leaves the store untouched.
//! Writes then interleave chunk + vector per chunk, tracking every inserted
//! id; any failure triggers a compensating delete of everything tracked.
//! The deletes are idempotent (removing a missing id is a no-op) and a
//! failed individual delete is logged without short-circuiting the rest of
//! the rollback.

use std::path::Path;

use tracing::{error, warn};

use crate::embedder::Embedder;
use crate::errors::Result;
use crate::store::Store;
use crate::types::Chunk;

/// Counts from storing one file. `failed` is 0 or 1 — the unit of failure
/// is the whole file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageResult {
    pub chunks_created: usize,
    pub chunks_updated: usize,
    pub vectors_stored: usize,
    pub failed: usize,
}

impl StorageResult {
    fn success(chunks_created: usize, chunks_updated: usize, vectors_stored: usize) -> Self {
        Self {
            chunks_created,
            chunks_updated,
            vectors_stored,
            failed: 0,
        }
    }

    fn failure() -> Self {
        Self {
            failed: 1,
            ..Self::default()
        }
    }
}

pub struct ChunkStorage<'a> {
    store: &'a Store,
    embedder: &'a dyn Embedder,
}

impl<'a> ChunkStorage<'a> {
    pub fn new(store: &'a Store, embedder: &'a dyn Embedder) -> Self {
        Self { store, embedder }
    }

    /// Delete all existing chunks for a path, giving replacement semantics
    /// to the store step that follows. Returns how many chunks went away.
    /// This only ever fails at the store level, which poisons the whole
    /// sync, so the error propagates instead of being downgraded to a
    /// per-file failure.
    pub fn delete_old_chunks(&self, rel_path: &str) -> Result<usize> {
        self.store.delete_all_for_path(rel_path)
    }

    /// Store `chunks` (all belonging to `rel_path`) with their embeddings.
    ///
    /// Per-file failures (embedding, count mismatch) come back as a
    /// [`StorageResult`] with `failed = 1` so the caller can move on to the
    /// next file. Store-level failures (corruption, schema, permissions)
    /// propagate as `Err` after the rollback — they poison the whole sync,
    /// not just this file.
    pub fn store_chunks_and_embeddings(
        &self,
        chunks: &[Chunk],
        rel_path: &Path,
    ) -> Result<StorageResult> {
        if chunks.is_empty() {
            return Ok(StorageResult::success(0, 0, 0));
        }

        let mut added_ids: Vec<String> = Vec::new();
        match self.try_store(chunks, &mut added_ids) {
            Ok(result) => Ok(result),
            Err(e) => {
                error!(
                    "error storing chunks for {}: {e}; rolling back {} insert(s)",
                    rel_path.display(),
                    added_ids.len()
                );
                self.rollback(&added_ids);
                match e {
                    crate::errors::EmberError::Database(_) => Err(e),
                    _ => Ok(StorageResult::failure()),
                }
            }
        }
    }

    fn try_store(&self, chunks: &[Chunk], added_ids: &mut Vec<String>) -> Result<StorageResult> {
        // Step 1: embed the whole batch before any database write, so a
        // model failure can't leave orphaned chunks behind.
        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_texts(&contents)?;

        // Step 2: the contract is one vector per chunk.
        if embeddings.len() != chunks.len() {
            return Err(crate::errors::EmberError::Embedding(format!(
                "embedding count mismatch: got {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let fingerprint = self.embedder.fingerprint();

        // Step 3: classify new vs. updated by content hash (read-only).
        let mut is_new = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let existing = self.store.find_by_content_hash(&chunk.content_hash)?;
            is_new.push(existing.is_empty());
        }

        // Step 4: insert chunk, then its vector, tracking ids for rollback.
        let mut chunks_created = 0;
        let mut chunks_updated = 0;
        let mut vectors_stored = 0;
        for ((chunk, embedding), new) in chunks.iter().zip(&embeddings).zip(&is_new) {
            self.store.add_chunk(chunk)?;
            added_ids.push(chunk.id.clone());
            if *new {
                chunks_created += 1;
            } else {
                chunks_updated += 1;
            }
            self.store.add_vector(&chunk.id, embedding, &fingerprint)?;
            vectors_stored += 1;
        }

        Ok(StorageResult::success(
            chunks_created,
            chunks_updated,
            vectors_stored,
        ))
    }

    /// Compensating delete of everything inserted during a failed store.
    /// Best-effort: individual failures are logged and don't stop the rest.
    fn rollback(&self, chunk_ids: &[String]) {
        for id in chunk_ids {
            if let Err(e) = self.store.delete_chunk(id) {
                warn!("failed to rollback chunk {id}: {e}");
            }
            if let Err(e) = self.store.delete_vector(id) {
                warn!("failed to rollback vector {id}: {e}");
            }
        }
    }
}
