use std::path::Path;
use std::sync::atomic::Ordering;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use ember::cache::{self, CachedResult};
use ember::config::{self, Config};
use ember::editor;
use ember::embedder::{Embedder, StaticModelEmbedder};
use ember::errors::{EmberError, Result};
use ember::git::GitVcs;
use ember::indexer::{CancelFlag, Indexer, SyncProgress};
use ember::lock::SyncLock;
use ember::output::{self, StalenessDisplay, StatusReport};
use ember::search::HybridSearch;
use ember::state;
use ember::store::Store;
use ember::sync::SyncService;
use ember::types::{IndexRequest, Query, SyncMode};
use ember::workspace::{self, Workspace};

#[derive(Debug, Parser)]
#[command(name = "ember")]
#[command(version)]
#[command(about = "Local codebase embedding and search")]
struct Cli {
    /// Enable verbose (debug) logging on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Initialize ember in the current repository.
    Init {
        /// Reinitialize even if .ember/ already exists.
        #[arg(short, long)]
        force: bool,
    },

    /// Sync (index) the codebase. Indexes the current worktree by default.
    Sync {
        /// Index the current worktree, including uncommitted changes.
        #[arg(long, conflicts_with_all = ["staged", "rev"])]
        worktree: bool,

        /// Index staged changes.
        #[arg(long, conflicts_with = "rev")]
        staged: bool,

        /// Index a specific git revision (commit SHA, branch, tag).
        #[arg(long, value_name = "REF")]
        rev: Option<String>,

        /// Force a full reindex, overwriting a changed model fingerprint.
        #[arg(long)]
        reindex: bool,

        /// Only index paths matching these globs (repeatable).
        #[arg(long = "in", value_name = "GLOB")]
        path_filters: Vec<String>,
    },

    /// Search the index. Auto-syncs first unless --no-sync.
    Find {
        query: String,

        /// Restrict the search to a directory subtree. Mutually exclusive
        /// with --in.
        #[arg(value_name = "PATH")]
        path: Option<String>,

        /// Number of results to return.
        #[arg(short = 'k', long)]
        topk: Option<usize>,

        /// Filter results by path glob (e.g. 'src/**/*.py').
        #[arg(long = "in", value_name = "GLOB")]
        path_filter: Option<String>,

        /// Filter results by language code (e.g. 'py', 'ts').
        #[arg(long, value_name = "CODE")]
        lang: Option<String>,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,

        /// Skip the automatic staleness check.
        #[arg(long)]
        no_sync: bool,

        /// Show each hit with N surrounding lines of file context.
        #[arg(short = 'C', long, value_name = "N")]
        context: Option<usize>,
    },

    /// Display a cached result by index, or any stored chunk by id prefix.
    Cat {
        /// Result number from the last find, or a chunk id prefix (>= 6 hex chars).
        target: String,

        /// Surrounding lines of file context to include.
        #[arg(short = 'C', long, value_name = "N", default_value_t = 0)]
        context: usize,
    },

    /// Open a result in your editor at the matching line.
    Open {
        /// Result number from the last find, or a chunk id prefix.
        target: String,
    },

    /// Report index state, staleness, counts, and configuration.
    Status,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "ember=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        if let Some(hint) = err.hint() {
            eprintln!("hint: {hint}");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    match cli.command {
        Command::Init { force } => cmd_init(&cwd, force, cli.quiet),
        Command::Sync {
            staged,
            rev,
            reindex,
            path_filters,
            ..
        } => {
            let mode = sync_mode(staged, rev);
            cmd_sync(&cwd, mode, reindex, path_filters, cli.quiet)
        }
        Command::Find {
            query,
            path,
            topk,
            path_filter,
            lang,
            json,
            no_sync,
            context,
        } => cmd_find(
            &cwd,
            FindArgs {
                query,
                path,
                topk,
                path_filter,
                lang,
                json,
                no_sync,
                context,
            },
            cli.quiet,
        ),
        Command::Cat { target, context } => cmd_cat(&cwd, &target, context),
        Command::Open { target } => cmd_open(&cwd, &target, cli.quiet),
        Command::Status => cmd_status(&cwd),
    }
}

fn sync_mode(staged: bool, rev: Option<String>) -> SyncMode {
    match rev {
        Some(reference) => SyncMode::Rev(reference),
        None if staged => SyncMode::Staged,
        None => SyncMode::Worktree,
    }
}

// ── init ──────────────────────────────────────────────────────────────────

fn cmd_init(cwd: &Path, force: bool, quiet: bool) -> Result<()> {
    let repo_root = workspace::init_root(cwd);
    let ember_dir = repo_root.join(workspace::EMBER_DIR);

    let was_reinitialized = ember_dir.exists();
    if was_reinitialized {
        if !force {
            return Err(EmberError::AlreadyInitialized(ember_dir));
        }
        // --force means a clean slate, including any old-schema database.
        std::fs::remove_dir_all(&ember_dir)?;
    }

    // First run on this machine: seed the user-global config.
    let global_path = config::global_config_path();
    let global_created = if global_path.exists() {
        false
    } else {
        config::create_global_config_file(&global_path)?;
        true
    };

    std::fs::create_dir_all(&ember_dir)?;
    let ws = Workspace {
        repo_root: repo_root.clone(),
        ember_dir: ember_dir.clone(),
    };
    config::create_project_config(&ws.config_path())?;
    Store::open(&ws.db_path())?;
    state::create_initial_state(&ws.state_path())?;

    if was_reinitialized {
        println!("Reinitialized existing ember index at {}", ember_dir.display());
    } else {
        println!("Initialized ember index at {}", ember_dir.display());
    }
    if !quiet {
        println!("  ✓ Created config.toml");
        println!("  ✓ Created index.db");
        println!("  ✓ Created state.json");
        if global_created {
            println!("  ✓ Created global config at {}", global_path.display());
        }
        println!("\nNext: Run 'ember sync' to index your codebase");
    }
    Ok(())
}

// ── sync ──────────────────────────────────────────────────────────────────

/// Indicatif-backed progress for sync.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl SyncProgress for CliProgress {
    fn begin(&self, total: usize) {
        self.bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn file_done(&self, done: usize, _total: usize, path: &str) {
        self.bar.set_position(done as u64);
        self.bar.set_message(path.to_string());
    }

    fn model_loading(&self) {
        self.bar.set_message("loading embedding model...");
    }
}

fn cancel_flag() -> CancelFlag {
    let cancel = CancelFlag::default();
    let handle = cancel.clone();
    // Second Ctrl-C falls back to the default behavior via the flag already
    // being set; registration failure just loses graceful cancellation.
    let _ = ctrlc::set_handler(move || {
        handle.store(true, Ordering::Relaxed);
    });
    cancel
}

fn cmd_sync(
    cwd: &Path,
    mode: SyncMode,
    reindex: bool,
    path_filters: Vec<String>,
    quiet: bool,
) -> Result<()> {
    let ws = workspace::discover(cwd)?;
    let _lock = SyncLock::acquire(&ws.lock_path())?;

    let cfg = config::load_config(&ws.ember_dir);
    let store = Store::open(&ws.db_path())?;
    let vcs = GitVcs::open(&ws.repo_root)?;
    let embedder = StaticModelEmbedder::new(cfg.embedding.clone());

    let indexer = Indexer::new(&store, &vcs, &embedder, &cfg, &ws, cancel_flag());
    let request = IndexRequest {
        sync_mode: mode,
        path_filters,
        force_reindex: reindex,
    };

    let response = if quiet {
        indexer.run(&request, &())?
    } else {
        let progress = CliProgress::new();
        let outcome = indexer.run(&request, &progress);
        progress.finish();
        outcome?
    };

    if !quiet {
        output::print_sync_summary(&response);
    }
    Ok(())
}

// ── find ──────────────────────────────────────────────────────────────────

struct FindArgs {
    query: String,
    path: Option<String>,
    topk: Option<usize>,
    path_filter: Option<String>,
    lang: Option<String>,
    json: bool,
    no_sync: bool,
    context: Option<usize>,
}

fn cmd_find(cwd: &Path, args: FindArgs, quiet: bool) -> Result<()> {
    let ws = workspace::discover(cwd)?;
    let cfg = config::load_config(&ws.ember_dir);
    let store = Store::open(&ws.db_path())?;
    let embedder = StaticModelEmbedder::new(cfg.embedding.clone());

    let path_filter = ember::filter::normalize_path_filter(
        args.path.as_deref(),
        args.path_filter,
        &ws.repo_root,
        cwd,
    )?;

    if !args.no_sync {
        auto_sync(&ws, &cfg, &store, &embedder, quiet);
    }

    let query = Query {
        text: args.query,
        topk: args.topk.unwrap_or(cfg.search.topk),
        path_filter,
        lang_filter: args.lang,
    };

    let search = HybridSearch::new(&store, &embedder, cfg.search.overfetch);
    let results = search.search(&query)?;

    // Cache for cat/open; a failed cache write degrades those commands but
    // must not fail this one.
    if let Err(e) = cache::write_cache(&ws.last_search_path(), &query, &results) {
        tracing::warn!("could not cache results: {e}");
    }

    if args.json {
        println!("{}", output::find_results_json(&results));
    } else if let Some(context) = args.context {
        for result in &results {
            output::print_chunk(
                &CachedResult::from_search(result),
                Some(result.rank),
                &ws.repo_root,
                context,
            );
        }
        if results.is_empty() {
            println!("No results found.");
        }
    } else {
        output::print_find_results(&results);
    }
    Ok(())
}

/// The staleness gate: refresh when stale, warn instead of failing. The
/// search must still run against the last consistent state.
fn auto_sync(ws: &Workspace, cfg: &Config, store: &Store, embedder: &dyn Embedder, quiet: bool) {
    let vcs = match GitVcs::open(&ws.repo_root) {
        Ok(vcs) => vcs,
        Err(e) => {
            eprintln!("Warning: skipping staleness check: {e}");
            return;
        }
    };

    let service = SyncService::new(&vcs, store);
    let outcome = service.ensure_synced(|| {
        let _lock = SyncLock::acquire(&ws.lock_path())?;
        let indexer = Indexer::new(store, &vcs, embedder, cfg, ws, cancel_flag());
        indexer.run(&IndexRequest::worktree(), &())
    });

    if let Some(error) = outcome.error {
        let kind = outcome
            .error_kind
            .map(|k| format!("{k:?}").to_lowercase())
            .unwrap_or_else(|| "unknown".into());
        eprintln!("Warning: index refresh failed ({kind}): {error}");
        eprintln!("Searching the last indexed state.");
    } else if outcome.synced && !quiet {
        eprintln!("Auto-synced {} file(s) before searching", outcome.files_indexed);
    }
}

// ── cat / open ────────────────────────────────────────────────────────────

/// A numeric target is a 1-based rank into the cached results; anything
/// else is treated as a chunk id prefix against the whole store.
fn resolve_target(ws: &Workspace, target: &str) -> Result<(CachedResult, Option<usize>)> {
    if let Ok(index) = target.parse::<usize>() {
        let cached = cache::load_cache(&ws.last_search_path())?;
        let result = cache::lookup_by_index(&cached, index)?;
        return Ok((result.clone(), Some(index)));
    }
    let store = Store::open(&ws.db_path())?;
    let chunk = cache::lookup_by_prefix(&store, target)?;
    Ok((CachedResult::from_chunk(&chunk), None))
}

fn cmd_cat(cwd: &Path, target: &str, context: usize) -> Result<()> {
    let ws = workspace::discover(cwd)?;
    let (result, rank) = resolve_target(&ws, target)?;
    output::print_chunk(&result, rank, &ws.repo_root, context);
    Ok(())
}

fn cmd_open(cwd: &Path, target: &str, quiet: bool) -> Result<()> {
    let ws = workspace::discover(cwd)?;
    let (result, rank) = resolve_target(&ws, target)?;

    let file_path = ws.repo_root.join(&result.path);
    if !quiet {
        output::print_open_confirmation(&result, rank, &editor::editor_display_name());
    }
    editor::open_in_editor(&file_path, result.start_line)
}

// ── status ────────────────────────────────────────────────────────────────

fn cmd_status(cwd: &Path) -> Result<()> {
    let ws = workspace::discover(cwd)?;
    let cfg = config::load_config(&ws.ember_dir);
    let store = Store::open(&ws.db_path())?;

    let staleness = match GitVcs::open(&ws.repo_root) {
        Ok(vcs) => match SyncService::new(&vcs, &store).is_stale() {
            Ok(true) => StalenessDisplay::Stale,
            Ok(false) => StalenessDisplay::Fresh,
            Err(e) => StalenessDisplay::Unknown(e.to_string()),
        },
        Err(e) => StalenessDisplay::Unknown(e.to_string()),
    };

    let snapshot = state::load_state(&ws.state_path()).ok();
    let report = StatusReport {
        repo_root: ws.repo_root.display().to_string(),
        staleness,
        chunks: store.count_chunks()?,
        files: store.count_unique_files()?,
        last_sync_mode: store.meta_get(ember::indexer::LAST_SYNC_MODE_KEY)?,
        model_fingerprint: store.meta_get(ember::indexer::MODEL_FINGERPRINT_KEY)?,
        indexed_at: snapshot.map(|s| s.indexed_at),
        model: cfg.embedding.model.clone(),
        topk: cfg.search.topk,
    };
    output::print_status(&report);
    Ok(())
}
