//! Core data model: chunks, queries, results, and sync state.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// One searchable unit of source code.
///
/// The id is content-addressed: identical `{project, path, lang, symbol,
/// lines, content}` always produces the identical 64-hex-char BLAKE3 id,
/// across runs and platforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Repository-relative path with forward slashes.
    pub path: String,
    /// Semantic language code from the registry ("py", "ts", "rs", ...).
    pub lang: String,
    /// Enclosing identifier (function/class name), when the chunker knows it.
    pub symbol: Option<String>,
    /// 1-based, inclusive.
    pub start_line: u32,
    /// 1-based, inclusive. Always >= start_line.
    pub end_line: u32,
    pub content: String,
    /// BLAKE3 of the content bytes — the deduplication key.
    pub content_hash: String,
    /// BLAKE3 of the whole source file at time of chunking.
    pub file_hash: String,
    /// Tree SHA under which the chunk was captured.
    pub tree_sha: String,
    /// "worktree" or a commit SHA.
    pub rev: String,
}

impl Chunk {
    /// Build a chunk, deriving `id` and `content_hash`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_id: &str,
        path: &str,
        lang: &str,
        symbol: Option<String>,
        start_line: u32,
        end_line: u32,
        content: String,
        file_hash: String,
        tree_sha: String,
        rev: String,
    ) -> Self {
        let id = compute_chunk_id(
            project_id,
            path,
            lang,
            symbol.as_deref(),
            start_line,
            end_line,
            &content,
        );
        let content_hash = blake3::hash(content.as_bytes()).to_hex().to_string();
        Self {
            id,
            path: path.to_string(),
            lang: lang.to_string(),
            symbol,
            start_line,
            end_line,
            content,
            content_hash,
            file_hash,
            tree_sha,
            rev,
        }
    }

    /// First non-blank line of the chunk, for compact display.
    pub fn preview_line(&self) -> &str {
        self.content
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
    }
}

/// Content-addressed chunk identity.
///
/// Fields are joined with NUL separators (none of them can contain NUL:
/// paths and content are decoded text, line numbers are decimal ASCII) so
/// the encoding is unambiguous.
pub fn compute_chunk_id(
    project_id: &str,
    path: &str,
    lang: &str,
    symbol: Option<&str>,
    start_line: u32,
    end_line: u32,
    content: &str,
) -> String {
    let mut hasher = blake3::Hasher::new();
    for field in [
        project_id,
        path,
        lang,
        symbol.unwrap_or(""),
        &start_line.to_string(),
        &end_line.to_string(),
        content,
    ] {
        hasher.update(field.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

/// BLAKE3 of the absolute repository root path. Scopes chunk ids so two
/// checkouts of the same code get distinct identities.
pub fn project_id(repo_root: &Path) -> String {
    blake3::hash(repo_root.to_string_lossy().as_bytes())
        .to_hex()
        .to_string()
}

/// A search request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    pub text: String,
    pub topk: usize,
    pub path_filter: Option<String>,
    pub lang_filter: Option<String>,
}

/// One ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// 1-based rank; what `cat`/`open` accept.
    pub rank: usize,
    pub score: f32,
    pub chunk: Chunk,
    pub preview: String,
    /// Which retrieval signal dominated ("text", "semantic", "text+semantic").
    pub explanation: String,
}

/// What to hash and index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Current worktree contents, including uncommitted and untracked files.
    Worktree,
    /// Staged changes. Currently resolves to the worktree tree SHA, matching
    /// the behavior `is_stale` checks against.
    Staged,
    /// A specific commit/branch/tag.
    Rev(String),
}

impl SyncMode {
    pub fn label(&self) -> &str {
        match self {
            Self::Worktree => "worktree",
            Self::Staged => "staged",
            Self::Rev(r) => r,
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Request to index (or re-index) files.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub sync_mode: SyncMode,
    /// Glob patterns limiting which repo-relative paths get indexed.
    pub path_filters: Vec<String>,
    /// Reindex everything, overwriting a changed model fingerprint.
    pub force_reindex: bool,
}

impl IndexRequest {
    pub fn worktree() -> Self {
        Self {
            sync_mode: SyncMode::Worktree,
            path_filters: Vec::new(),
            force_reindex: false,
        }
    }
}

/// Statistics from a completed sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexResponse {
    pub files_indexed: usize,
    pub files_failed: usize,
    pub chunks_created: usize,
    pub chunks_updated: usize,
    pub chunks_deleted: usize,
    pub vectors_stored: usize,
    pub tree_sha: String,
    pub is_incremental: bool,
}

/// Last-seen metadata for an indexed file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileState {
    pub file_hash: String,
    pub size: u64,
    /// Unix seconds.
    pub mtime: i64,
}

/// Persisted human-inspectable snapshot (`.ember/state.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoState {
    pub last_tree_sha: String,
    pub last_sync_mode: String,
    pub model_fingerprint: String,
    pub version: String,
    pub indexed_at: String,
}
