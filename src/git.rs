//! VCS adapter: everything ember needs from git, through libgit2.
//!
//! The interesting operation is [`Vcs::worktree_tree_sha`]: a tree SHA that
//! reflects exactly what the indexer would read right now — unstaged edits
//! and untracked-but-not-ignored files included, gitignored paths excluded.
//! It is computed by staging the worktree into the repository's in-memory
//! index object and writing a tree, then force-reloading the index from disk
//! so nothing ever leaks into the user's staging area. The on-disk
//! `.git/index` file is never written.

use std::path::{Path, PathBuf};

use git2::{Delta, DiffFindOptions, ErrorCode, IndexAddOption, ObjectType, Oid, Repository};

use crate::errors::{EmberError, Result};

/// Change status between two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One entry of a tree-to-tree diff. For renames, `path` is the new location
/// and `old_path` carries the vacated one (whose chunks must be dropped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub status: FileStatus,
    pub path: PathBuf,
    pub old_path: Option<PathBuf>,
}

/// Capability set for version-control operations.
pub trait Vcs {
    /// Tree SHA for a ref (commit, branch, tag, or a tree id itself).
    fn tree_sha(&self, reference: &str) -> Result<String>;

    /// Tree SHA of the current worktree contents. See module docs.
    fn worktree_tree_sha(&self) -> Result<String>;

    /// Every file the worktree snapshot would contain: tracked files plus
    /// untracked-but-not-ignored ones, repo-relative.
    fn list_tracked_files(&self) -> Result<Vec<PathBuf>>;

    /// Every file reachable from a ref's tree, repo-relative.
    fn list_files_at(&self, reference: &str) -> Result<Vec<PathBuf>>;

    /// Diff two trees by SHA. `from == None` means the empty tree.
    fn diff_files(&self, from_tree: Option<&str>, to_tree: &str) -> Result<Vec<FileChange>>;

    /// Raw blob content of `path` at `reference`.
    fn file_content(&self, path: &Path, reference: &str) -> Result<Vec<u8>>;

    /// Resolve a ref to its commit id (for recording which revision a chunk
    /// was captured from).
    fn resolve_commit(&self, reference: &str) -> Result<String>;
}

/// libgit2-backed implementation.
pub struct GitVcs {
    repo: Repository,
}

impl std::fmt::Debug for GitVcs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitVcs")
            .field("repo", &self.repo.path())
            .finish()
    }
}

impl GitVcs {
    /// Open the repository at `root`. The directory must be the repository
    /// root (discovery happens at the workspace layer).
    pub fn open(root: &Path) -> Result<Self> {
        let repo = Repository::open(root)
            .map_err(|e| EmberError::NotARepository(e.message().to_string()))?;
        Ok(Self { repo })
    }

    fn revparse_tree(&self, reference: &str) -> Result<git2::Tree<'_>> {
        let obj = self.repo.revparse_single(reference).map_err(|e| {
            if self.repo.is_empty().unwrap_or(false) {
                EmberError::NoCommitsYet
            } else {
                EmberError::InvalidRef {
                    reference: reference.to_string(),
                    detail: e.message().to_string(),
                }
            }
        })?;
        let tree = obj
            .peel(ObjectType::Tree)
            .map_err(|e| EmberError::InvalidRef {
                reference: reference.to_string(),
                detail: e.message().to_string(),
            })?;
        tree.into_tree().map_err(|_| EmberError::InvalidRef {
            reference: reference.to_string(),
            detail: "does not resolve to a tree".to_string(),
        })
    }

    fn find_tree_by_sha(&self, sha: &str) -> Result<git2::Tree<'_>> {
        let oid = Oid::from_str(sha).map_err(|e| EmberError::InvalidRef {
            reference: sha.to_string(),
            detail: e.message().to_string(),
        })?;
        self.repo.find_tree(oid).map_err(|e| EmberError::InvalidRef {
            reference: sha.to_string(),
            detail: e.message().to_string(),
        })
    }

    /// Stage the worktree into the in-memory index, run `f`, then restore.
    ///
    /// The restore (a forced re-read of `.git/index`) runs on every exit
    /// path, and a restore failure wins over whatever `f` produced: a wrong
    /// answer is recoverable, a silently inconsistent index is not.
    fn with_worktree_index<T>(
        &self,
        f: impl FnOnce(&mut git2::Index) -> std::result::Result<T, git2::Error>,
    ) -> Result<T> {
        let mut index = self.repo.index()?;

        let staged = (|| {
            index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
            // add_all only adds/updates; update_all drops entries whose
            // worktree file is gone.
            index.update_all(["*"].iter(), None)?;
            // The index directory must never influence the hash: a sync
            // mutates .ember/index.db, which would make every sync
            // immediately stale again.
            index.remove_dir(Path::new(crate::workspace::EMBER_DIR), 0)?;
            f(&mut index)
        })();

        if let Err(e) = index.read(true) {
            return Err(EmberError::IndexRestorationFailed(e.message().to_string()));
        }

        staged.map_err(EmberError::from)
    }
}

impl Vcs for GitVcs {
    fn tree_sha(&self, reference: &str) -> Result<String> {
        if reference == "HEAD" && self.repo.is_empty().unwrap_or(false) {
            return Err(EmberError::NoCommitsYet);
        }
        Ok(self.revparse_tree(reference)?.id().to_string())
    }

    fn worktree_tree_sha(&self) -> Result<String> {
        let oid = self.with_worktree_index(|index| index.write_tree())?;
        Ok(oid.to_string())
    }

    fn list_tracked_files(&self) -> Result<Vec<PathBuf>> {
        self.with_worktree_index(|index| {
            let mut files: Vec<PathBuf> = index
                .iter()
                .map(|entry| PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned()))
                .collect();
            files.sort();
            Ok(files)
        })
    }

    fn list_files_at(&self, reference: &str) -> Result<Vec<PathBuf>> {
        let tree = self.revparse_tree(reference)?;
        let mut files = Vec::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    files.push(PathBuf::from(format!("{dir}{name}")));
                }
            }
            git2::TreeWalkResult::Ok
        })?;
        files.sort();
        Ok(files)
    }

    fn diff_files(&self, from_tree: Option<&str>, to_tree: &str) -> Result<Vec<FileChange>> {
        let new_tree = self.find_tree_by_sha(to_tree)?;
        let old_tree = match from_tree {
            Some(sha) => Some(self.find_tree_by_sha(sha)?),
            None => None,
        };

        let mut diff =
            self.repo
                .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), None)?;
        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true);
        diff.find_similar(Some(&mut find_opts))?;

        let mut changes = Vec::new();
        for delta in diff.deltas() {
            let new_path = delta.new_file().path().map(Path::to_path_buf);
            let old_path = delta.old_file().path().map(Path::to_path_buf);
            let change = match delta.status() {
                Delta::Added | Delta::Copied => new_path.map(|p| FileChange {
                    status: FileStatus::Added,
                    path: p,
                    old_path: None,
                }),
                Delta::Modified | Delta::Typechange => new_path.map(|p| FileChange {
                    status: FileStatus::Modified,
                    path: p,
                    old_path: None,
                }),
                Delta::Deleted => old_path.map(|p| FileChange {
                    status: FileStatus::Deleted,
                    path: p,
                    old_path: None,
                }),
                Delta::Renamed => new_path.map(|p| FileChange {
                    status: FileStatus::Renamed,
                    path: p,
                    old_path,
                }),
                _ => None,
            };
            if let Some(change) = change {
                changes.push(change);
            }
        }
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    fn file_content(&self, path: &Path, reference: &str) -> Result<Vec<u8>> {
        let tree = self.revparse_tree(reference)?;
        let entry = tree.get_path(path).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                EmberError::FileNotFoundAtRef {
                    path: path.display().to_string(),
                    reference: reference.to_string(),
                }
            } else {
                EmberError::Git(e.message().to_string())
            }
        })?;
        let object = entry.to_object(&self.repo)?;
        let blob = object
            .as_blob()
            .ok_or_else(|| EmberError::FileNotFoundAtRef {
                path: path.display().to_string(),
                reference: reference.to_string(),
            })?;
        Ok(blob.content().to_vec())
    }

    fn resolve_commit(&self, reference: &str) -> Result<String> {
        let obj = self.repo.revparse_single(reference).map_err(|e| {
            if self.repo.is_empty().unwrap_or(false) {
                EmberError::NoCommitsYet
            } else {
                EmberError::InvalidRef {
                    reference: reference.to_string(),
                    detail: e.message().to_string(),
                }
            }
        })?;
        let commit = obj.peel_to_commit().map_err(|e| EmberError::InvalidRef {
            reference: reference.to_string(),
            detail: e.message().to_string(),
        })?;
        Ok(commit.id().to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn setup() -> (tempfile::TempDir, GitVcs) {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let vcs = GitVcs::open(dir.path()).unwrap();
        (dir, vcs)
    }

    #[test]
    fn open_outside_a_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GitVcs::open(dir.path()).unwrap_err(),
            EmberError::NotARepository(_)
        ));
    }

    #[test]
    fn empty_repository_is_distinguished_from_bad_ref() {
        let (_dir, vcs) = setup();
        assert!(matches!(
            vcs.tree_sha("HEAD").unwrap_err(),
            EmberError::NoCommitsYet
        ));
    }

    #[test]
    fn invalid_ref_after_first_commit() {
        let (dir, vcs) = setup();
        write_file(dir.path(), "a.py", "def foo(): pass\n");
        let repo = Repository::open(dir.path()).unwrap();
        commit_all(&repo, "init");

        assert!(vcs.tree_sha("HEAD").is_ok());
        assert!(matches!(
            vcs.tree_sha("no-such-branch").unwrap_err(),
            EmberError::InvalidRef { .. }
        ));
    }

    #[test]
    fn worktree_sha_sees_untracked_files() {
        let (dir, vcs) = setup();
        write_file(dir.path(), "a.py", "def foo(): pass\n");
        let first = vcs.worktree_tree_sha().unwrap();

        write_file(dir.path(), "b.py", "def bar(): pass\n");
        let second = vcs.worktree_tree_sha().unwrap();
        assert_ne!(first, second);

        // Identical content => identical tree SHA.
        let third = vcs.worktree_tree_sha().unwrap();
        assert_eq!(second, third);
    }

    #[test]
    fn worktree_sha_skips_gitignored_paths() {
        let (dir, vcs) = setup();
        write_file(dir.path(), ".gitignore", "ignored.log\n");
        write_file(dir.path(), "a.py", "x = 1\n");
        let before = vcs.worktree_tree_sha().unwrap();

        write_file(dir.path(), "ignored.log", "noise\n");
        let after = vcs.worktree_tree_sha().unwrap();
        assert_eq!(before, after);

        let files = vcs.list_tracked_files().unwrap();
        assert!(files.contains(&PathBuf::from("a.py")));
        assert!(!files.contains(&PathBuf::from("ignored.log")));
    }

    #[test]
    fn worktree_sha_ignores_the_index_directory() {
        let (dir, vcs) = setup();
        write_file(dir.path(), "a.py", "x = 1\n");
        let before = vcs.worktree_tree_sha().unwrap();

        // No .gitignore here: the snapshot itself must exclude .ember/.
        write_file(dir.path(), ".ember/index.db", "binary-ish contents");
        let after = vcs.worktree_tree_sha().unwrap();
        assert_eq!(before, after);
        assert!(!vcs
            .list_tracked_files()
            .unwrap()
            .iter()
            .any(|p| p.starts_with(".ember")));
    }

    #[test]
    fn worktree_hashing_leaves_staging_area_alone() {
        let (dir, vcs) = setup();
        write_file(dir.path(), "a.py", "x = 1\n");
        vcs.worktree_tree_sha().unwrap();

        // The file must still be untracked, not staged.
        let repo = Repository::open(dir.path()).unwrap();
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true);
        let statuses = repo.statuses(Some(&mut opts)).unwrap();
        let entry = statuses
            .iter()
            .find(|s| s.path() == Some("a.py"))
            .expect("a.py should appear in status");
        assert!(entry.status().contains(git2::Status::WT_NEW));
        assert!(!entry.status().contains(git2::Status::INDEX_NEW));
    }

    #[test]
    fn worktree_sha_reflects_unstaged_modifications() {
        let (dir, vcs) = setup();
        write_file(dir.path(), "a.py", "x = 1\n");
        let repo = Repository::open(dir.path()).unwrap();
        commit_all(&repo, "init");
        let committed = vcs.tree_sha("HEAD").unwrap();
        assert_eq!(vcs.worktree_tree_sha().unwrap(), committed);

        write_file(dir.path(), "a.py", "x = 2\n");
        assert_ne!(vcs.worktree_tree_sha().unwrap(), committed);
    }

    #[test]
    fn diff_reports_added_modified_deleted() {
        let (dir, vcs) = setup();
        let repo = Repository::open(dir.path()).unwrap();

        write_file(dir.path(), "keep.py", "keep = 1\n");
        write_file(dir.path(), "gone.py", "gone = 1\n");
        commit_all(&repo, "one");
        let from = vcs.tree_sha("HEAD").unwrap();

        write_file(dir.path(), "keep.py", "keep = 2\n");
        std::fs::remove_file(dir.path().join("gone.py")).unwrap();
        write_file(dir.path(), "new.py", "fresh = 1\n");
        commit_all(&repo, "two");
        let to = vcs.tree_sha("HEAD").unwrap();

        let changes = vcs.diff_files(Some(&from), &to).unwrap();
        let get = |p: &str| {
            changes
                .iter()
                .find(|c| c.path == PathBuf::from(p))
                .unwrap_or_else(|| panic!("no change for {p}"))
                .status
        };
        assert_eq!(get("new.py"), FileStatus::Added);
        assert_eq!(get("keep.py"), FileStatus::Modified);
        assert_eq!(get("gone.py"), FileStatus::Deleted);
    }

    #[test]
    fn diff_detects_renames_with_old_path() {
        let (dir, vcs) = setup();
        let repo = Repository::open(dir.path()).unwrap();

        write_file(dir.path(), "b.py", "def bar(): pass\n# filler to make content distinctive\n");
        commit_all(&repo, "one");
        let from = vcs.tree_sha("HEAD").unwrap();

        std::fs::rename(dir.path().join("b.py"), dir.path().join("c.py")).unwrap();
        commit_all(&repo, "two");
        let to = vcs.tree_sha("HEAD").unwrap();

        let changes = vcs.diff_files(Some(&from), &to).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].status, FileStatus::Renamed);
        assert_eq!(changes[0].path, PathBuf::from("c.py"));
        assert_eq!(changes[0].old_path, Some(PathBuf::from("b.py")));
    }

    #[test]
    fn diff_from_none_is_against_empty_tree() {
        let (dir, vcs) = setup();
        let repo = Repository::open(dir.path()).unwrap();
        write_file(dir.path(), "a.py", "x = 1\n");
        commit_all(&repo, "one");
        let to = vcs.tree_sha("HEAD").unwrap();

        let changes = vcs.diff_files(None, &to).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].status, FileStatus::Added);
    }

    #[test]
    fn file_content_at_ref() {
        let (dir, vcs) = setup();
        let repo = Repository::open(dir.path()).unwrap();
        write_file(dir.path(), "src/a.py", "original\n");
        commit_all(&repo, "one");

        write_file(dir.path(), "src/a.py", "modified\n");
        let content = vcs.file_content(Path::new("src/a.py"), "HEAD").unwrap();
        assert_eq!(content, b"original\n");

        assert!(matches!(
            vcs.file_content(Path::new("missing.py"), "HEAD").unwrap_err(),
            EmberError::FileNotFoundAtRef { .. }
        ));
    }

    #[test]
    fn listing_files_at_ref_walks_subdirectories() {
        let (dir, vcs) = setup();
        let repo = Repository::open(dir.path()).unwrap();
        write_file(dir.path(), "src/deep/a.py", "x = 1\n");
        write_file(dir.path(), "top.py", "y = 2\n");
        commit_all(&repo, "one");

        let files = vcs.list_files_at("HEAD").unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("src/deep/a.py"), PathBuf::from("top.py")]
        );
    }
}
