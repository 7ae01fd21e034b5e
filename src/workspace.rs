//! Repository discovery: find the directory that owns the `.ember/` index.
//!
//! Commands other than `init` may run from any subdirectory. Discovery walks
//! up from the starting directory looking for `.ember/`, but never crosses a
//! git repository boundary: the walk stops at the first directory containing
//! `.git`, so a parent project's index is never picked up by accident.

use std::path::{Path, PathBuf};

use crate::errors::{EmberError, Result};

/// Name of the index directory ember creates next to the repository root.
pub const EMBER_DIR: &str = ".ember";

/// A located ember workspace.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Absolute repository root (the directory containing `.ember/`).
    pub repo_root: PathBuf,
    /// Absolute path of `.ember/`.
    pub ember_dir: PathBuf,
}

impl Workspace {
    pub fn db_path(&self) -> PathBuf {
        self.ember_dir.join("index.db")
    }

    pub fn state_path(&self) -> PathBuf {
        self.ember_dir.join("state.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.ember_dir.join("config.toml")
    }

    pub fn last_search_path(&self) -> PathBuf {
        self.ember_dir.join(".last_search.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.ember_dir.join(".lock")
    }
}

/// Walk up from `start` looking for `.ember/`.
///
/// Stops (returning `None`) past the first enclosing git repository root, so
/// the search never leaks into an unrelated parent checkout.
pub fn find_ember_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(EMBER_DIR).is_dir() {
            return Some(current);
        }
        // A .git here makes this the repository root; an index above it would
        // belong to a different project.
        if current.join(".git").exists() {
            return None;
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Locate the workspace for a command that requires an initialized index.
pub fn discover(start: &Path) -> Result<Workspace> {
    let repo_root = find_ember_root(start).ok_or(EmberError::NotInitialized)?;
    let ember_dir = repo_root.join(EMBER_DIR);
    Ok(Workspace {
        repo_root,
        ember_dir,
    })
}

/// Where `init` should create `.ember/`: the enclosing git root if there is
/// one, otherwise the starting directory itself.
pub fn init_root(start: &Path) -> PathBuf {
    match git2::Repository::discover(start) {
        Ok(repo) => repo
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| start.to_path_buf()),
        Err(_) => start.to_path_buf(),
    }
}
