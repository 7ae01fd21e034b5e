//! Read/write the human-inspectable `.ember/state.json` snapshot.
//!
//! The store's `meta` table is authoritative; this file mirrors it after
//! every successful sync so the index state can be inspected without SQLite.

use std::path::Path;

use crate::errors::{EmberError, Result};
use crate::types::RepoState;

pub const EMBER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn load_state(path: &Path) -> Result<RepoState> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| EmberError::Unknown(format!("invalid state file {}: {e}", path.display())))
}

pub fn save_state(state: &RepoState, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut text = serde_json::to_string_pretty(state)
        .map_err(|e| EmberError::Unknown(format!("failed to serialize state: {e}")))?;
    text.push('\n');
    std::fs::write(path, text)?;
    Ok(())
}

/// Fresh state for a newly initialized index: nothing synced yet.
pub fn create_initial_state(path: &Path) -> Result<()> {
    save_state(
        &RepoState {
            last_tree_sha: String::new(),
            last_sync_mode: "none".to_string(),
            model_fingerprint: String::new(),
            version: EMBER_VERSION.to_string(),
            indexed_at: now_iso(),
        },
        path,
    )
}

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = RepoState {
            last_tree_sha: "abc123".into(),
            last_sync_mode: "worktree".into(),
            model_fingerprint: "model:v1:deadbeef".into(),
            version: "0.1.0".into(),
            indexed_at: "2026-01-01T00:00:00Z".into(),
        };
        save_state(&state, &path).unwrap();
        assert_eq!(load_state(&path).unwrap(), state);
    }

    #[test]
    fn initial_state_is_unsynced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        create_initial_state(&path).unwrap();
        let state = load_state(&path).unwrap();
        assert!(state.last_tree_sha.is_empty());
        assert_eq!(state.last_sync_mode, "none");
    }

    #[test]
    fn missing_state_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_state(&dir.path().join("nope.json")).is_err());
    }
}
