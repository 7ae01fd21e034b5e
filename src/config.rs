//! Configuration: a user-global file at a platform-conventional path, with a
//! minimal per-project overlay in `.ember/config.toml`.
//!
//! Project settings win over global settings, which win over built-in
//! defaults. Loads are permissive: a missing or malformed file falls back to
//! the next layer with a warning rather than failing the command.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// HuggingFace model repo id for the static embedding model.
    pub model: String,
    /// Output dimension of the model. Part of the fingerprint: vectors of
    /// different dimensions never share an index.
    pub dimension: usize,
    /// Maximum sequence length fed to the model; longer chunks are truncated
    /// by the encoder.
    pub max_length: usize,
    /// Encoder batch size.
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "minishlab/potion-retrieval-32M".to_string(),
            dimension: 512,
            max_length: 512,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window height for the line-based fallback chunker.
    pub window_lines: usize,
    /// Stride for the fallback chunker; a stride below the window height
    /// gives overlapping windows.
    pub stride_lines: usize,
    /// Grammar chunks longer than this are subdivided into windows that keep
    /// the enclosing symbol name.
    pub max_chunk_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_lines: 40,
            stride_lines: 30,
            max_chunk_lines: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Default number of results for `find`.
    pub topk: usize,
    /// Over-fetch factor: each retrieval signal fetches `topk * overfetch`
    /// candidates before fusion so the fused head is well-populated.
    pub overfetch: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            topk: 20,
            overfetch: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
}

/// Partial mirror of [`Config`] used for layering: only the keys a file
/// actually sets override the layer below.
#[derive(Debug, Clone, Default, Deserialize)]
struct PartialConfig {
    embedding: Option<PartialEmbedding>,
    chunking: Option<PartialChunking>,
    search: Option<PartialSearch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartialEmbedding {
    model: Option<String>,
    dimension: Option<usize>,
    max_length: Option<usize>,
    batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartialChunking {
    window_lines: Option<usize>,
    stride_lines: Option<usize>,
    max_chunk_lines: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartialSearch {
    topk: Option<usize>,
    overfetch: Option<usize>,
}

impl Config {
    fn apply(&mut self, partial: PartialConfig) {
        if let Some(e) = partial.embedding {
            if let Some(v) = e.model {
                self.embedding.model = v;
            }
            if let Some(v) = e.dimension {
                self.embedding.dimension = v;
            }
            if let Some(v) = e.max_length {
                self.embedding.max_length = v;
            }
            if let Some(v) = e.batch_size {
                self.embedding.batch_size = v;
            }
        }
        if let Some(c) = partial.chunking {
            if let Some(v) = c.window_lines {
                self.chunking.window_lines = v;
            }
            if let Some(v) = c.stride_lines {
                self.chunking.stride_lines = v;
            }
            if let Some(v) = c.max_chunk_lines {
                self.chunking.max_chunk_lines = v;
            }
        }
        if let Some(s) = partial.search {
            if let Some(v) = s.topk {
                self.search.topk = v;
            }
            if let Some(v) = s.overfetch {
                self.search.overfetch = v;
            }
        }
    }
}

fn read_partial(path: &Path) -> Option<PartialConfig> {
    let text = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<PartialConfig>(&text) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!("ignoring malformed config {}: {e}", path.display());
            None
        }
    }
}

/// Path of the user-global config file.
///
/// `EMBER_CONFIG_DIR` overrides the platform-conventional location, which
/// keeps tests and sandboxed environments away from the real home directory.
pub fn global_config_path() -> PathBuf {
    if let Ok(dir) = std::env::var("EMBER_CONFIG_DIR") {
        return PathBuf::from(dir).join("config.toml");
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ember")
        .join("config.toml")
}

/// Resolve the effective configuration for a project.
pub fn load_config(ember_dir: &Path) -> Config {
    let mut cfg = Config::default();
    if let Some(global) = read_partial(&global_config_path()) {
        cfg.apply(global);
    }
    if let Some(project) = read_partial(&ember_dir.join("config.toml")) {
        cfg.apply(project);
    }
    cfg
}

/// Write the user-global config with full defaults, serving as documentation
/// of every available key. Called on the first `init`.
pub fn create_global_config_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(&Config::default()).unwrap_or_default();
    let text = format!(
        "# ember user-global configuration.\n\
         # Project-level .ember/config.toml overrides any key set here.\n\n{body}"
    );
    std::fs::write(path, text)
}

/// Write the minimal project config: empty, everything inherited.
pub fn create_project_config(path: &Path) -> std::io::Result<()> {
    let text = "# ember project configuration.\n\
                # Settings here override the user-global config.\n\
                # See the global file for all available keys.\n";
    std::fs::write(path, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert!(cfg.chunking.stride_lines <= cfg.chunking.window_lines);
        assert!(cfg.search.overfetch >= 1);
        assert!(!cfg.embedding.model.is_empty());
    }

    #[test]
    fn project_overrides_global_overrides_defaults() {
        let mut cfg = Config::default();
        let global: PartialConfig = toml::from_str(
            "[search]\ntopk = 10\noverfetch = 2\n[embedding]\nmodel = \"global/model\"\n",
        )
        .unwrap();
        let project: PartialConfig = toml::from_str("[search]\ntopk = 5\n").unwrap();

        cfg.apply(global);
        cfg.apply(project);

        assert_eq!(cfg.search.topk, 5); // project wins
        assert_eq!(cfg.search.overfetch, 2); // global wins
        assert_eq!(cfg.embedding.model, "global/model");
        assert_eq!(cfg.chunking.window_lines, 40); // default survives
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "not [valid toml").unwrap();
        assert!(read_partial(&dir.path().join("config.toml")).is_none());
    }

    #[test]
    fn global_config_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ember").join("config.toml");
        create_global_config_file(&path).unwrap();
        let parsed: PartialConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            parsed.embedding.unwrap().model.unwrap(),
            EmbeddingConfig::default().model
        );
    }
}
