//! File preprocessing: read bytes, hash, decode, detect language.
//!
//! Hash and size are computed on the raw bytes; decoding to UTF-8 uses
//! replacement on invalid sequences so one odd byte can't fail a whole file.

use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::languages;

/// A file ready for the chunker.
#[derive(Debug, Clone)]
pub struct PreprocessedFile {
    /// Repo-relative, forward slashes.
    pub rel_path: PathBuf,
    pub content: String,
    /// BLAKE3 of the raw bytes.
    pub file_hash: String,
    pub file_size: u64,
    /// Semantic language code ("py", "rs", ..., default "txt").
    pub lang: &'static str,
    /// Unix mtime seconds; 0 when the source has no filesystem timestamp
    /// (blobs read from a ref).
    pub mtime: i64,
}

/// Preprocess a worktree file, reading it from disk.
pub fn preprocess(repo_root: &Path, rel_path: &Path) -> Result<PreprocessedFile> {
    let abs = repo_root.join(rel_path);
    let bytes = std::fs::read(&abs)?;
    let mtime = std::fs::metadata(&abs)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(preprocess_bytes(rel_path, &bytes, mtime))
}

/// Preprocess content that was already read (worktree bytes or a blob at a
/// ref).
pub fn preprocess_bytes(rel_path: &Path, bytes: &[u8], mtime: i64) -> PreprocessedFile {
    let file_hash = blake3::hash(bytes).to_hex().to_string();
    let content = String::from_utf8_lossy(bytes).into_owned();
    PreprocessedFile {
        rel_path: rel_path.to_path_buf(),
        content,
        file_hash,
        file_size: bytes.len() as u64,
        lang: languages::semantic_language(rel_path),
        mtime,
    }
}
