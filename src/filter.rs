//! File filtering: keep only indexable code files, optionally narrowed by
//! user glob patterns. The registry whitelist is the gate — config, data,
//! and documentation extensions never reach the chunker.

use std::path::{Component, Path, PathBuf};

use glob::Pattern;

use crate::errors::{EmberError, Result};
use crate::languages;

/// Whether the path's extension is indexable source code.
pub fn is_code_file(path: &Path) -> bool {
    languages::is_code_file(path)
}

/// Keep only code files.
pub fn filter_code_files(files: Vec<PathBuf>) -> Vec<PathBuf> {
    files.into_iter().filter(|f| is_code_file(f)).collect()
}

/// Keep files whose repo-relative path matches at least one pattern.
///
/// Accepts absolute or repo-relative inputs and always returns repo-relative
/// paths. Anything that cannot be expressed relative to `repo_root` is
/// silently dropped — paths outside the repository are never indexed, no
/// matter what the globs say. An empty pattern list keeps everything.
pub fn apply_path_filters(
    files: Vec<PathBuf>,
    patterns: &[String],
    repo_root: &Path,
) -> Vec<PathBuf> {
    let compiled: Vec<Pattern> = patterns
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect();

    let mut kept = Vec::new();
    for file in files {
        let rel = if file.is_absolute() {
            match file.strip_prefix(repo_root) {
                Ok(r) => r.to_path_buf(),
                Err(_) => continue,
            }
        } else {
            file
        };
        // Relative paths that climb out of the repository are just as
        // out-of-bounds as foreign absolute ones.
        if rel.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            continue;
        }
        if compiled.is_empty() || compiled.iter().any(|p| p.matches_path(&rel)) {
            kept.push(rel);
        }
    }
    kept
}

/// Combine a positional PATH argument with an `--in` filter into one glob.
///
/// A PATH argument scopes the search to a directory subtree; it must live
/// inside the repository and is mutually exclusive with `--in`. Returns
/// `None` when no narrowing applies (no PATH, or PATH is the repo root).
pub fn normalize_path_filter(
    path: Option<&str>,
    existing_filter: Option<String>,
    repo_root: &Path,
    cwd: &Path,
) -> Result<Option<String>> {
    let Some(path) = path else {
        return Ok(existing_filter);
    };
    if let Some(filter) = existing_filter {
        return Err(EmberError::ConflictingFilters {
            path: path.to_string(),
            filter,
        });
    }

    let absolute = if Path::new(path).is_absolute() {
        normalize_lexically(Path::new(path))
    } else {
        normalize_lexically(&cwd.join(path))
    };
    let rel = absolute
        .strip_prefix(repo_root)
        .map_err(|_| EmberError::PathNotInRepository(path.to_string()))?;

    if rel.as_os_str().is_empty() {
        return Ok(None);
    }
    Ok(Some(format!(
        "{}/**",
        rel.to_string_lossy().replace('\\', "/")
    )))
}

/// Resolve `.` and `..` components without touching the filesystem, so a
/// not-yet-existing path can still be classified as inside or outside the
/// repository.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
