//! Staleness detection and the auto-sync gate.
//!
//! `find` runs the gate before searching unless the user opts out. The gate
//! never aborts the search: when the refresh fails, the outcome carries a
//! classified error for a stderr warning and the search proceeds against
//! the last consistent state.

use crate::detect::LAST_TREE_SHA_KEY;
use crate::errors::{EmberError, Result};
use crate::git::Vcs;
use crate::store::Store;
use crate::types::IndexResponse;

/// Coarse classification for sync failures, used to phrase the warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
    Permission,
    Database,
    Git,
    Unknown,
}

/// Classify an error for the gate's warning line. Typed variants map
/// directly; untyped ones fall back to keyword inspection of the message,
/// which catches git trouble surfacing through generic error paths.
pub fn classify_sync_error(err: &EmberError) -> SyncErrorKind {
    match err {
        EmberError::Permission(_) => SyncErrorKind::Permission,
        EmberError::Database(_) => SyncErrorKind::Database,
        EmberError::NotARepository(_)
        | EmberError::NoCommitsYet
        | EmberError::InvalidRef { .. }
        | EmberError::FileNotFoundAtRef { .. }
        | EmberError::IndexRestorationFailed(_)
        | EmberError::Git(_) => SyncErrorKind::Git,
        other => {
            let message = other.to_string().to_lowercase();
            const GIT_KEYWORDS: [&str; 5] = ["git", "repository", "ref", "commit", "tree"];
            if GIT_KEYWORDS.iter().any(|k| message.contains(k)) {
                SyncErrorKind::Git
            } else {
                SyncErrorKind::Unknown
            }
        }
    }
}

/// What the gate did, for reporting on stderr.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// True when a sync actually ran and succeeded.
    pub synced: bool,
    pub files_indexed: usize,
    pub error: Option<String>,
    pub error_kind: Option<SyncErrorKind>,
}

pub struct SyncService<'a> {
    vcs: &'a dyn Vcs,
    store: &'a Store,
}

impl<'a> SyncService<'a> {
    pub fn new(vcs: &'a dyn Vcs, store: &'a Store) -> Self {
        Self { vcs, store }
    }

    /// Stale iff the worktree tree SHA differs from the last indexed one.
    /// An index that has never synced is stale by definition.
    pub fn is_stale(&self) -> Result<bool> {
        let current = self.vcs.worktree_tree_sha()?;
        let last = self.store.meta_get(LAST_TREE_SHA_KEY)?;
        Ok(last.as_deref() != Some(current.as_str()))
    }

    /// The staleness gate: check, and when stale run `run_sync`. All
    /// failures are downgraded into the outcome — searching last-good state
    /// beats refusing to search.
    pub fn ensure_synced<F>(&self, run_sync: F) -> SyncOutcome
    where
        F: FnOnce() -> Result<IndexResponse>,
    {
        let stale = match self.is_stale() {
            Ok(stale) => stale,
            Err(e) => {
                return SyncOutcome {
                    error_kind: Some(classify_sync_error(&e)),
                    error: Some(e.to_string()),
                    ..SyncOutcome::default()
                };
            }
        };
        if !stale {
            return SyncOutcome::default();
        }
        match run_sync() {
            Ok(response) => SyncOutcome {
                synced: true,
                files_indexed: response.files_indexed,
                ..SyncOutcome::default()
            },
            Err(e) => SyncOutcome {
                error_kind: Some(classify_sync_error(&e)),
                error: Some(e.to_string()),
                ..SyncOutcome::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::FileChange;
    use std::path::{Path, PathBuf};

    struct StubVcs {
        sha: std::result::Result<String, ()>,
    }

    impl Vcs for StubVcs {
        fn tree_sha(&self, _r: &str) -> Result<String> {
            self.worktree_tree_sha()
        }
        fn worktree_tree_sha(&self) -> Result<String> {
            self.sha
                .clone()
                .map_err(|()| EmberError::Git("tree lookup failed".into()))
        }
        fn list_tracked_files(&self) -> Result<Vec<PathBuf>> {
            Ok(vec![])
        }
        fn list_files_at(&self, _r: &str) -> Result<Vec<PathBuf>> {
            Ok(vec![])
        }
        fn diff_files(&self, _f: Option<&str>, _t: &str) -> Result<Vec<FileChange>> {
            Ok(vec![])
        }
        fn file_content(&self, _p: &Path, _r: &str) -> Result<Vec<u8>> {
            Ok(vec![])
        }
        fn resolve_commit(&self, _r: &str) -> Result<String> {
            Ok("c".into())
        }
    }

    #[test]
    fn staleness_is_sha_inequality() {
        let vcs = StubVcs {
            sha: Ok("now".into()),
        };
        let store = Store::open_in_memory().unwrap();
        let service = SyncService::new(&vcs, &store);

        // Never synced: stale.
        assert!(service.is_stale().unwrap());

        store.meta_set(LAST_TREE_SHA_KEY, "now").unwrap();
        assert!(!service.is_stale().unwrap());

        store.meta_set(LAST_TREE_SHA_KEY, "older").unwrap();
        assert!(service.is_stale().unwrap());
    }

    #[test]
    fn gate_skips_sync_when_fresh() {
        let vcs = StubVcs {
            sha: Ok("now".into()),
        };
        let store = Store::open_in_memory().unwrap();
        store.meta_set(LAST_TREE_SHA_KEY, "now").unwrap();
        let service = SyncService::new(&vcs, &store);

        let outcome = service.ensure_synced(|| panic!("must not sync when fresh"));
        assert!(!outcome.synced);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn gate_runs_sync_when_stale() {
        let vcs = StubVcs {
            sha: Ok("now".into()),
        };
        let store = Store::open_in_memory().unwrap();
        let service = SyncService::new(&vcs, &store);

        let outcome = service.ensure_synced(|| {
            Ok(IndexResponse {
                files_indexed: 3,
                ..IndexResponse::default()
            })
        });
        assert!(outcome.synced);
        assert_eq!(outcome.files_indexed, 3);
    }

    #[test]
    fn gate_downgrades_sync_failures() {
        let vcs = StubVcs {
            sha: Ok("now".into()),
        };
        let store = Store::open_in_memory().unwrap();
        let service = SyncService::new(&vcs, &store);

        let outcome =
            service.ensure_synced(|| Err(EmberError::Database("disk image is malformed".into())));
        assert!(!outcome.synced);
        assert_eq!(outcome.error_kind, Some(SyncErrorKind::Database));
        assert!(outcome.error.unwrap().contains("malformed"));
    }

    #[test]
    fn gate_downgrades_staleness_check_failures() {
        let vcs = StubVcs { sha: Err(()) };
        let store = Store::open_in_memory().unwrap();
        let service = SyncService::new(&vcs, &store);

        let outcome = service.ensure_synced(|| panic!("staleness check already failed"));
        assert_eq!(outcome.error_kind, Some(SyncErrorKind::Git));
    }

    #[test]
    fn classification_table() {
        assert_eq!(
            classify_sync_error(&EmberError::Permission("denied".into())),
            SyncErrorKind::Permission
        );
        assert_eq!(
            classify_sync_error(&EmberError::Database("locked".into())),
            SyncErrorKind::Database
        );
        assert_eq!(
            classify_sync_error(&EmberError::NoCommitsYet),
            SyncErrorKind::Git
        );
        assert_eq!(
            classify_sync_error(&EmberError::Git("object not found".into())),
            SyncErrorKind::Git
        );
        // Keyword inspection on untyped errors.
        assert_eq!(
            classify_sync_error(&EmberError::Unknown("bad ref in walk".into())),
            SyncErrorKind::Git
        );
        assert_eq!(
            classify_sync_error(&EmberError::Unknown("out of cheese".into())),
            SyncErrorKind::Unknown
        );
    }
}
