//! Indexing orchestrator: drives detection, deletion, chunking, embedding,
//! and persistence across files, then finalizes metadata.
//!
//! Phases, in order:
//!   1. verify the embedder fingerprint against the stored one
//!   2. detect files to (re)index from the tree-SHA diff
//!   3. apply deletions for paths that left the tree
//!   4. load the model (visible to progress UI before the long part)
//!   5. index files — preprocess+chunk in parallel, write sequentially
//!   6. finalize: `last_tree_sha` is written strictly last, so a failed
//!      sync leaves it untouched and the next sync re-detects from the
//!      previous good state
//!
//! Failure policy: a per-file preprocess/chunk/embed failure marks the file
//! failed and moves on; a store-level failure aborts the whole sync.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::chunk_store::ChunkStorage;
use crate::chunker;
use crate::config::Config;
use crate::detect::{FileDetection, LAST_TREE_SHA_KEY};
use crate::embedder::Embedder;
use crate::errors::{EmberError, Result};
use crate::filter;
use crate::git::Vcs;
use crate::preprocess::{self, PreprocessedFile};
use crate::state::{self, EMBER_VERSION};
use crate::store::Store;
use crate::types::{Chunk, FileState, IndexRequest, IndexResponse, RepoState, SyncMode};
use crate::workspace::Workspace;

pub const MODEL_FINGERPRINT_KEY: &str = "model_fingerprint";
pub const LAST_SYNC_MODE_KEY: &str = "last_sync_mode";

/// Cooperative cancellation: the orchestrator checks this at every file
/// boundary, so the in-flight file is always fully committed or fully
/// rolled back, never partial.
pub type CancelFlag = Arc<AtomicBool>;

/// Progress callbacks at per-file granularity.
pub trait SyncProgress {
    fn begin(&self, _total: usize) {}
    fn file_done(&self, _done: usize, _total: usize, _path: &str) {}
    fn model_loading(&self) {}
}

/// Silent progress for tests and `--quiet`.
impl SyncProgress for () {}

pub struct Indexer<'a> {
    store: &'a Store,
    vcs: &'a dyn Vcs,
    embedder: &'a dyn Embedder,
    config: &'a Config,
    workspace: &'a Workspace,
    project_id: String,
    cancel: CancelFlag,
}

impl<'a> Indexer<'a> {
    pub fn new(
        store: &'a Store,
        vcs: &'a dyn Vcs,
        embedder: &'a dyn Embedder,
        config: &'a Config,
        workspace: &'a Workspace,
        cancel: CancelFlag,
    ) -> Self {
        let project_id = crate::types::project_id(&workspace.repo_root);
        Self {
            store,
            vcs,
            embedder,
            config,
            workspace,
            project_id,
            cancel,
        }
    }

    pub fn run(&self, request: &IndexRequest, progress: &dyn SyncProgress) -> Result<IndexResponse> {
        // Phase 1: a changed model invalidates every stored vector.
        self.verify_model(request.force_reindex)?;

        // Phase 2: what changed?
        let detection = FileDetection::new(self.vcs, self.store);
        let tree_sha = detection.tree_sha(&request.sync_mode)?;
        debug!("tree SHA for indexing: {tree_sha}");

        let Some(found) = detection.files_to_sync(&tree_sha, &request.sync_mode, request.force_reindex)?
        else {
            // Nothing changed since the last sync.
            return Ok(IndexResponse {
                tree_sha,
                is_incremental: true,
                ..IndexResponse::default()
            });
        };
        let is_incremental = found.is_incremental;

        let mut files = filter::apply_path_filters(
            filter::filter_code_files(found.files),
            &request.path_filters,
            &self.workspace.repo_root,
        );
        files.sort();
        files.dedup();
        info!(
            "indexing {} file(s) ({} sync)",
            files.len(),
            if is_incremental { "incremental" } else { "full" }
        );

        // Phase 3: drop chunks for paths that left the tree.
        let mut chunks_deleted = 0;
        if is_incremental {
            for path in detection.deleted_files(&tree_sha)? {
                let key = path_key(&path);
                chunks_deleted += self.store.delete_all_for_path(&key)?;
                self.store.untrack_file(&key)?;
            }
            if chunks_deleted > 0 {
                info!("deleted {chunks_deleted} chunk(s) from removed files");
            }
        }

        // Phase 4: load the model while the UI can still show it.
        if !files.is_empty() {
            progress.model_loading();
            self.embedder.ensure_loaded()?;
        }

        // Phase 5: index.
        let mut response = self.index_files(&files, &tree_sha, &request.sync_mode, progress)?;
        response.chunks_deleted = chunks_deleted;
        response.tree_sha = tree_sha.clone();
        response.is_incremental = is_incremental;

        // Phase 6: finalize. last_tree_sha goes last, after every file-level
        // write, so interrupted syncs never claim this tree.
        self.store
            .meta_set(LAST_SYNC_MODE_KEY, request.sync_mode.label())?;
        self.store
            .meta_set(MODEL_FINGERPRINT_KEY, &self.embedder.fingerprint())?;
        self.store.meta_set(LAST_TREE_SHA_KEY, &tree_sha)?;
        self.write_state_snapshot(&tree_sha, &request.sync_mode)?;

        Ok(response)
    }

    fn verify_model(&self, force_reindex: bool) -> Result<()> {
        let current = self.embedder.fingerprint();
        match self.store.meta_get(MODEL_FINGERPRINT_KEY)? {
            Some(stored) if stored != current && !force_reindex => Err(EmberError::ModelMismatch {
                stored,
                current,
            }),
            _ => Ok(()),
        }
    }

    fn index_files(
        &self,
        files: &[PathBuf],
        tree_sha: &str,
        mode: &SyncMode,
        progress: &dyn SyncProgress,
    ) -> Result<IndexResponse> {
        let rev = match mode {
            SyncMode::Worktree | SyncMode::Staged => "worktree".to_string(),
            SyncMode::Rev(reference) => self.vcs.resolve_commit(reference)?,
        };

        progress.begin(files.len());

        // Preprocess + chunk in parallel; the store and the embedder are
        // only touched from this thread, in path order, so counters and
        // write order stay deterministic.
        let prepared = self.prepare_files(files, tree_sha, mode, &rev);

        let storage = ChunkStorage::new(self.store, self.embedder);
        let mut response = IndexResponse::default();

        for (done, (path, prep)) in prepared.into_iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(EmberError::Cancelled);
            }
            let key = path_key(&path);

            let (file, chunks) = match prep {
                Ok(ok) => ok,
                Err(e) => {
                    warn!("skipping {key}: {e}");
                    response.files_failed += 1;
                    progress.file_done(done + 1, files.len(), &key);
                    continue;
                }
            };

            // Replacement semantics: old chunks for the path go first. A
            // failure here is a store-level failure and aborts the sync.
            storage.delete_old_chunks(&key)?;

            let result = storage.store_chunks_and_embeddings(&chunks, &path)?;
            if result.failed > 0 {
                response.files_failed += 1;
            } else {
                response.files_indexed += 1;
                response.chunks_created += result.chunks_created;
                response.chunks_updated += result.chunks_updated;
                response.vectors_stored += result.vectors_stored;
                self.store.track_file(
                    &key,
                    &FileState {
                        file_hash: file.file_hash.clone(),
                        size: file.file_size,
                        mtime: file.mtime,
                    },
                )?;
            }
            progress.file_done(done + 1, files.len(), &key);
        }

        Ok(response)
    }

    /// Read, hash, decode, and chunk every file. Worktree content comes off
    /// the filesystem on the rayon pool; ref content is read from blobs
    /// up front (libgit2 handles stay on this thread) and only the chunking
    /// runs in parallel. The parallel closures capture owned data only —
    /// neither the store connection nor the repository handle is `Sync`.
    #[allow(clippy::type_complexity)]
    fn prepare_files(
        &self,
        files: &[PathBuf],
        tree_sha: &str,
        mode: &SyncMode,
        rev: &str,
    ) -> Vec<(PathBuf, Result<(PreprocessedFile, Vec<Chunk>)>)> {
        let ctx = ChunkContext {
            project_id: self.project_id.clone(),
            chunking: self.config.chunking.clone(),
            tree_sha: tree_sha.to_string(),
            rev: rev.to_string(),
        };
        match mode {
            SyncMode::Worktree | SyncMode::Staged => {
                let repo_root = self.workspace.repo_root.clone();
                files
                    .par_iter()
                    .map(|path| {
                        let prep = preprocess::preprocess(&repo_root, path)
                            .map(|file| ctx.chunk_file(file));
                        (path.clone(), prep)
                    })
                    .collect()
            }
            SyncMode::Rev(reference) => {
                let blobs: Vec<(PathBuf, Result<Vec<u8>>)> = files
                    .iter()
                    .map(|path| (path.clone(), self.vcs.file_content(path, reference)))
                    .collect();
                blobs
                    .into_par_iter()
                    .map(|(path, bytes)| {
                        let prep = bytes.map(|b| {
                            let file = preprocess::preprocess_bytes(&path, &b, 0);
                            ctx.chunk_file(file)
                        });
                        (path, prep)
                    })
                    .collect()
            }
        }
    }

    fn write_state_snapshot(&self, tree_sha: &str, mode: &SyncMode) -> Result<()> {
        state::save_state(
            &RepoState {
                last_tree_sha: tree_sha.to_string(),
                last_sync_mode: mode.label().to_string(),
                model_fingerprint: self.embedder.fingerprint(),
                version: EMBER_VERSION.to_string(),
                indexed_at: state::now_iso(),
            },
            &self.workspace.state_path(),
        )
    }
}

/// Everything the parallel chunking stage needs, owned so it can cross
/// threads freely.
struct ChunkContext {
    project_id: String,
    chunking: crate::config::ChunkingConfig,
    tree_sha: String,
    rev: String,
}

impl ChunkContext {
    fn chunk_file(&self, file: PreprocessedFile) -> (PreprocessedFile, Vec<Chunk>) {
        let key = path_key(&file.rel_path);
        let chunks = chunker::chunk_source(file.lang, &file.content, &self.chunking)
            .into_iter()
            .map(|raw| {
                Chunk::new(
                    &self.project_id,
                    &key,
                    file.lang,
                    raw.symbol,
                    raw.start_line,
                    raw.end_line,
                    raw.content,
                    file.file_hash.clone(),
                    self.tree_sha.clone(),
                    self.rev.clone(),
                )
            })
            .collect();
        (file, chunks)
    }
}

/// Repo-relative path as stored: forward slashes on every platform.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
