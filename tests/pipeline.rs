//! End-to-end pipeline scenarios through the library API, with a
//! deterministic offline embedder: init -> sync -> find -> cat, across
//! incremental syncs, renames, model changes, and the auto-sync gate.

use std::path::Path;

use ember::cache;
use ember::config::Config;
use ember::embedder::Embedder;
use ember::errors::{EmberError, Result};
use ember::git::{GitVcs, Vcs};
use ember::indexer::{CancelFlag, Indexer, LAST_SYNC_MODE_KEY, MODEL_FINGERPRINT_KEY};
use ember::search::HybridSearch;
use ember::store::Store;
use ember::sync::SyncService;
use ember::types::{IndexRequest, Query, SearchResult};
use ember::workspace::Workspace;

/// Deterministic stand-in for the real model: hash-projected, normalized,
/// offline. Fingerprint is configurable to simulate model changes.
struct TestEmbedder {
    fingerprint: String,
}

impl TestEmbedder {
    fn new() -> Self {
        Self {
            fingerprint: "test-embedder:v1:0000000000000000".to_string(),
        }
    }

    fn with_fingerprint(fingerprint: &str) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
        }
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let digest = blake3::hash(text.as_bytes());
        let bytes = digest.as_bytes();
        let mut v: Vec<f32> = (0..16).map(|i| bytes[i] as f32 - 127.5).collect();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for TestEmbedder {
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn ensure_loaded(&self) -> Result<()> {
        Ok(())
    }
}

struct Project {
    _dir: tempfile::TempDir,
    workspace: Workspace,
    store: Store,
    config: Config,
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let repo = git2::Repository::init(&root).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "tester").unwrap();
        config.set_str("user.email", "tester@example.com").unwrap();
        drop(config);

        let ember_dir = root.join(".ember");
        std::fs::create_dir_all(&ember_dir).unwrap();
        let store = Store::open(&ember_dir.join("index.db")).unwrap();
        Self {
            _dir: dir,
            workspace: Workspace {
                repo_root: root,
                ember_dir,
            },
            store,
            config: Config::default(),
        }
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.workspace.repo_root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn commit(&self, message: &str) {
        let repo = git2::Repository::open(&self.workspace.repo_root).unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.update_all(["*"].iter(), None).unwrap();
        index.remove_dir(Path::new(".ember"), 0).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("tester", "tester@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
    }

    fn sync_with(&self, embedder: &dyn Embedder, request: &IndexRequest) -> Result<ember::types::IndexResponse> {
        let vcs = GitVcs::open(&self.workspace.repo_root).unwrap();
        let indexer = Indexer::new(
            &self.store,
            &vcs,
            embedder,
            &self.config,
            &self.workspace,
            CancelFlag::default(),
        );
        indexer.run(request, &())
    }

    fn sync(&self) -> Result<ember::types::IndexResponse> {
        self.sync_with(&TestEmbedder::new(), &IndexRequest::worktree())
    }

    fn find(&self, text: &str) -> Vec<SearchResult> {
        let embedder = TestEmbedder::new();
        let search = HybridSearch::new(&self.store, &embedder, self.config.search.overfetch);
        let query = Query {
            text: text.to_string(),
            topk: self.config.search.topk,
            path_filter: None,
            lang_filter: None,
        };
        let results = search.search(&query).unwrap();
        cache::write_cache(&self.workspace.last_search_path(), &query, &results).unwrap();
        results
    }
}

#[test]
fn scenario_fresh_init_and_sync() {
    let project = Project::new();
    project.write("a.py", "def foo(): pass\n");

    let response = project.sync().unwrap();
    assert_eq!(response.files_indexed, 1);
    assert!(response.chunks_created >= 1);
    assert_eq!(response.chunks_updated, 0);
    assert_eq!(response.files_failed, 0);

    let vcs = GitVcs::open(&project.workspace.repo_root).unwrap();
    assert_eq!(
        project.store.meta_get("last_tree_sha").unwrap().unwrap(),
        vcs.worktree_tree_sha().unwrap()
    );
    assert_eq!(
        project.store.meta_get(LAST_SYNC_MODE_KEY).unwrap().unwrap(),
        "worktree"
    );
}

#[test]
fn scenario_noop_second_sync() {
    let project = Project::new();
    project.write("a.py", "def foo(): pass\n");
    let first = project.sync().unwrap();

    let second = project.sync().unwrap();
    assert_eq!(second.files_indexed, 0);
    assert_eq!(second.chunks_created, 0);
    assert!(second.is_incremental);
    assert_eq!(
        project.store.meta_get("last_tree_sha").unwrap().unwrap(),
        first.tree_sha
    );
}

#[test]
fn scenario_added_file_is_found_at_rank_one() {
    let project = Project::new();
    project.write("a.py", "def foo(): pass\n");
    project.sync().unwrap();

    project.write("b.py", "def bar(): pass\n");
    project.commit("add bar");
    let response = project.sync().unwrap();
    assert!(response.is_incremental);
    assert_eq!(response.files_indexed, 1);

    let results = project.find("bar");
    assert!(!results.is_empty());
    assert_eq!(results[0].chunk.path, "b.py");
}

#[test]
fn scenario_rename_follows_the_content() {
    let project = Project::new();
    project.write("a.py", "def foo(): pass\n");
    project.write("b.py", "def bar():\n    return 'searchable rename payload'\n");
    project.commit("initial");
    project.sync().unwrap();

    std::fs::rename(
        project.workspace.repo_root.join("b.py"),
        project.workspace.repo_root.join("c.py"),
    )
    .unwrap();
    project.commit("rename");
    let response = project.sync().unwrap();
    assert_eq!(response.files_indexed, 1);

    let results = project.find("bar");
    assert!(!results.is_empty());
    assert_eq!(results[0].chunk.path, "c.py");
    assert!(results.iter().all(|r| r.chunk.path != "b.py"));
}

#[test]
fn scenario_model_change_demands_reindex() {
    let project = Project::new();
    project.write("a.py", "def foo(): pass\n");
    project.sync().unwrap();

    let changed = TestEmbedder::with_fingerprint("new-model:v1:1111111111111111");
    project.write("a.py", "def foo(): return 1\n");

    let err = project
        .sync_with(&changed, &IndexRequest::worktree())
        .unwrap_err();
    assert!(matches!(err, EmberError::ModelMismatch { .. }));

    let request = IndexRequest {
        force_reindex: true,
        ..IndexRequest::worktree()
    };
    let response = project.sync_with(&changed, &request).unwrap();
    assert!(!response.is_incremental);
    assert_eq!(
        project
            .store
            .meta_get(MODEL_FINGERPRINT_KEY)
            .unwrap()
            .unwrap(),
        "new-model:v1:1111111111111111"
    );
}

#[test]
fn scenario_auto_sync_gate_sees_new_content() {
    let project = Project::new();
    project.write("a.py", "def foo(): pass\n");
    project.sync().unwrap();

    // Worktree changes after the sync.
    project.write("fresh.py", "def freshly_added_function(): pass\n");

    let vcs = GitVcs::open(&project.workspace.repo_root).unwrap();
    let service = SyncService::new(&vcs, &project.store);
    assert!(service.is_stale().unwrap());

    // Without the gate (--no-sync), the modification is invisible.
    let before = project.find("freshly_added_function");
    assert!(before.iter().all(|r| r.chunk.path != "fresh.py"));

    // With the gate, the sync runs and the search sees it.
    let outcome = service.ensure_synced(|| project.sync());
    assert!(outcome.synced);
    assert_eq!(outcome.files_indexed, 1);

    let after = project.find("freshly_added_function");
    assert!(!after.is_empty());
    assert_eq!(after[0].chunk.path, "fresh.py");
    assert!(!service.is_stale().unwrap());
}

#[test]
fn search_output_is_deterministic_and_cat_matches_the_cache() {
    let project = Project::new();
    for i in 0..6 {
        project.write(
            &format!("mod{i}.py"),
            &format!("def handler_{i}(request):\n    return process(request, {i})\n"),
        );
    }
    project.sync().unwrap();

    let first = serde_json::to_string(&project.find("process request handler")).unwrap();
    let second = serde_json::to_string(&project.find("process request handler")).unwrap();
    assert_eq!(first, second, "same query over unchanged index");

    // Lookup-by-index returns exactly the N-th cached entry.
    let cached = cache::load_cache(&project.workspace.last_search_path()).unwrap();
    let results = project.find("process request handler");
    for result in &results {
        let looked_up = cache::lookup_by_index(&cached, result.rank).unwrap();
        assert_eq!(looked_up.chunk_id, result.chunk.id);
        assert_eq!(looked_up.path, result.chunk.path);
    }

    // Lookup-by-prefix resolves a unique chunk from the store.
    let target = &results[0].chunk;
    let store = &project.store;
    let found = cache::lookup_by_prefix(store, &target.id[..10]).unwrap();
    assert_eq!(found.id, target.id);
}

#[test]
fn gitignored_files_never_enter_the_index() {
    let project = Project::new();
    project.write(".gitignore", "generated/\nsecrets.py\n");
    project.write("a.py", "def foo(): pass\n");
    project.write("secrets.py", "def hidden(): pass\n");
    project.write("generated/out.py", "def generated(): pass\n");

    let response = project.sync().unwrap();
    assert_eq!(response.files_indexed, 1);
    assert!(project.store.file_state("secrets.py").unwrap().is_none());
    assert!(project
        .store
        .file_state("generated/out.py")
        .unwrap()
        .is_none());

    // And they don't affect staleness either.
    let vcs = GitVcs::open(&project.workspace.repo_root).unwrap();
    let service = SyncService::new(&vcs, &project.store);
    project.write("generated/more.py", "def more(): pass\n");
    assert!(!service.is_stale().unwrap());
}
