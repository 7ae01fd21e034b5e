//! Change detection: decide which files a sync must (re)index and which
//! have disappeared, from the current tree SHA and the stored last one.

use std::path::PathBuf;

use crate::errors::Result;
use crate::git::{FileStatus, Vcs};
use crate::store::Store;
use crate::types::SyncMode;

/// Meta key holding the tree SHA of the last successful sync.
pub const LAST_TREE_SHA_KEY: &str = "last_tree_sha";

/// Outcome of the detection decision table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub files: Vec<PathBuf>,
    pub is_incremental: bool,
}

pub struct FileDetection<'a> {
    vcs: &'a dyn Vcs,
    store: &'a Store,
}

impl<'a> FileDetection<'a> {
    pub fn new(vcs: &'a dyn Vcs, store: &'a Store) -> Self {
        Self { vcs, store }
    }

    /// Tree SHA for the requested sync mode. Staged currently resolves to
    /// the worktree (see DESIGN.md).
    pub fn tree_sha(&self, mode: &SyncMode) -> Result<String> {
        match mode {
            SyncMode::Worktree | SyncMode::Staged => self.vcs.worktree_tree_sha(),
            SyncMode::Rev(reference) => self.vcs.tree_sha(reference),
        }
    }

    pub fn last_tree_sha(&self) -> Result<Option<String>> {
        self.store.meta_get(LAST_TREE_SHA_KEY)
    }

    /// The decision table:
    ///
    /// | condition                | result                          |
    /// |--------------------------|---------------------------------|
    /// | force_reindex            | all files, incremental = false  |
    /// | no last tree SHA         | all files, incremental = false  |
    /// | tree SHA unchanged       | `None` — nothing to do          |
    /// | otherwise                | added/modified/renamed, true    |
    pub fn files_to_sync(
        &self,
        tree_sha: &str,
        mode: &SyncMode,
        force_reindex: bool,
    ) -> Result<Option<Detection>> {
        let last = self.last_tree_sha()?;

        if force_reindex || last.is_none() {
            return Ok(Some(Detection {
                files: self.all_files(mode)?,
                is_incremental: false,
            }));
        }
        let last = last.unwrap_or_default();
        if last == tree_sha {
            return Ok(None);
        }

        let changes = self.vcs.diff_files(Some(&last), tree_sha)?;
        let files = changes
            .into_iter()
            .filter(|c| {
                matches!(
                    c.status,
                    FileStatus::Added | FileStatus::Modified | FileStatus::Renamed
                )
            })
            .map(|c| c.path)
            .collect();
        Ok(Some(Detection {
            files,
            is_incremental: true,
        }))
    }

    /// Paths whose chunks must be dropped: deletions, plus the vacated old
    /// paths of renames. Empty when there was no previous sync.
    pub fn deleted_files(&self, tree_sha: &str) -> Result<Vec<PathBuf>> {
        let Some(last) = self.last_tree_sha()? else {
            return Ok(Vec::new());
        };
        if last == tree_sha {
            return Ok(Vec::new());
        }
        let changes = self.vcs.diff_files(Some(&last), tree_sha)?;
        let mut deleted = Vec::new();
        for change in changes {
            match change.status {
                FileStatus::Deleted => deleted.push(change.path),
                FileStatus::Renamed => {
                    if let Some(old) = change.old_path {
                        deleted.push(old);
                    }
                }
                _ => {}
            }
        }
        deleted.sort();
        Ok(deleted)
    }

    fn all_files(&self, mode: &SyncMode) -> Result<Vec<PathBuf>> {
        match mode {
            SyncMode::Worktree | SyncMode::Staged => self.vcs.list_tracked_files(),
            SyncMode::Rev(reference) => self.vcs.list_files_at(reference),
        }
    }
}
