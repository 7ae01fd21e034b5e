use std::path::PathBuf;

use thiserror::Error;

/// Closed error taxonomy for everything user-facing.
///
/// Use cases return these rather than bubbling raw library errors; the CLI
/// prints the message to stderr plus the actionable hint from [`EmberError::hint`]
/// and exits 1. Only argument parsing (exit 2) is outside this type.
#[derive(Debug, Error)]
pub enum EmberError {
    #[error("Not in an ember repository")]
    NotInitialized,

    #[error("Directory {} already exists", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("Not a git repository: {0}")]
    NotARepository(String),

    #[error("Repository has no commits yet")]
    NoCommitsYet,

    #[error("Invalid git ref '{reference}': {detail}")]
    InvalidRef { reference: String, detail: String },

    #[error("File '{path}' not found at ref '{reference}'")]
    FileNotFoundAtRef { path: String, reference: String },

    #[error("Failed to restore the git index after worktree hashing: {0}")]
    IndexRestorationFailed(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Embedding model changed: {stored} -> {current}")]
    ModelMismatch { stored: String, current: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Path '{0}' is not within repository")]
    PathNotInRepository(String),

    #[error("Cannot use both a PATH argument and --in: '{path}' vs '{filter}'")]
    ConflictingFilters { path: String, filter: String },

    #[error("Index {index} out of range (valid: 1-{max})")]
    IndexOutOfRange { index: usize, max: usize },

    #[error("Ambiguous chunk id prefix '{prefix}' matches {count} chunks:\n{listing}")]
    AmbiguousIdPrefix {
        prefix: String,
        count: usize,
        listing: String,
    },

    #[error("No chunk found with id prefix '{0}'")]
    ChunkNotFound(String),

    #[error("No recent search results found")]
    NoSearchResults,

    #[error("Editor '{0}' not found")]
    EditorNotFound(String),

    #[error("Editor failed with exit code {0}")]
    EditorExecutionFailed(i32),

    #[error("Another sync is already running (lock held at {})", .0.display())]
    SyncInProgress(PathBuf),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("{0}")]
    Unknown(String),
}

impl EmberError {
    /// One actionable line printed under the error message.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run 'ember init' in your project root to initialize one".into())
            }
            Self::AlreadyInitialized(_) => Some("Use 'ember init --force' to reinitialize".into()),
            Self::NotARepository(_) => {
                Some("ember indexes git repositories; run 'git init' first".into())
            }
            Self::NoCommitsYet => {
                Some("Create an initial commit, or sync the worktree after adding files".into())
            }
            Self::InvalidRef { .. } => {
                Some("Pass a commit SHA, branch, or tag that exists in this repository".into())
            }
            Self::FileNotFoundAtRef { .. } => {
                Some("Check the path spelling against 'git ls-tree' at that ref".into())
            }
            Self::IndexRestorationFailed(_) => Some(
                "Your staging area may be inconsistent; run 'git reset' to rebuild the index"
                    .into(),
            ),
            Self::Permission(_) => {
                Some("Check file permissions, disk space, and filesystem access".into())
            }
            Self::Database(_) => {
                Some("If the index is corrupted, run 'ember init --force' and re-sync".into())
            }
            Self::ModelMismatch { .. } => {
                Some("Run 'ember sync --reindex' to rebuild the index with the new model".into())
            }
            Self::PathNotInRepository(_) => {
                Some("Specify a path relative to or within the repository root".into())
            }
            Self::ConflictingFilters { .. } => Some(
                "Use PATH to search a directory subtree, OR --in for glob patterns, but not both"
                    .into(),
            ),
            Self::IndexOutOfRange { .. } => {
                Some("Run 'ember find <query>' to see available results".into())
            }
            Self::AmbiguousIdPrefix { .. } => {
                Some("Use a longer prefix to uniquely identify the chunk".into())
            }
            Self::ChunkNotFound(_) => {
                Some("Use 'ember find <query>' to search and get valid chunk ids".into())
            }
            Self::NoSearchResults => {
                Some("Run 'ember find <query>' first, then use 'ember cat <index>'".into())
            }
            Self::EditorNotFound(_) => {
                Some("Set the $EDITOR or $VISUAL environment variable".into())
            }
            Self::EditorExecutionFailed(_) => {
                Some("Check that the file is accessible and try again".into())
            }
            Self::SyncInProgress(_) => {
                Some("Wait for the other sync to finish, or remove a stale .ember/.lock".into())
            }
            Self::Embedding(_) => {
                Some("Check network access to the model hub on first run, then retry".into())
            }
            Self::Cancelled | Self::Git(_) | Self::Unknown(_) => None,
        }
    }
}

impl From<rusqlite::Error> for EmberError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<git2::Error> for EmberError {
    fn from(err: git2::Error) -> Self {
        Self::Git(err.message().to_string())
    }
}

impl From<std::io::Error> for EmberError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::Permission(err.to_string())
        } else {
            Self::Unknown(format!("I/O error: {err}"))
        }
    }
}

pub type Result<T> = std::result::Result<T, EmberError>;
