//! Embedding capability: text in, fixed-dimension L2-normalized vectors out,
//! plus a fingerprint that changes exactly when the model or its effective
//! configuration changes.
//!
//! The production implementation wraps a Model2Vec static model. Loading is
//! lazy and one-time; callers that want to show progress call
//! [`Embedder::ensure_loaded`] at a visible moment instead of paying the
//! cost inside the first batch.

use std::sync::OnceLock;

use model2vec_rs::model::StaticModel;

use crate::config::EmbeddingConfig;
use crate::errors::{EmberError, Result};

/// Capability trait for turning text into vectors.
pub trait Embedder {
    /// Embed a batch: N inputs yield N vectors of one dimension.
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Short stable string identifying the model and its effective
    /// configuration. Stored in `meta` and compared on every sync.
    fn fingerprint(&self) -> String;

    /// Force the lazy model load now (no-op when already loaded).
    fn ensure_loaded(&self) -> Result<()>;
}

/// Model2Vec-backed embedder.
pub struct StaticModelEmbedder {
    config: EmbeddingConfig,
    model: OnceLock<StaticModel>,
}

impl StaticModelEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config,
            model: OnceLock::new(),
        }
    }

    fn model(&self) -> Result<&StaticModel> {
        if let Some(model) = self.model.get() {
            return Ok(model);
        }
        let loaded = StaticModel::from_pretrained(
            &self.config.model,
            None,       // hf token
            Some(true), // L2-normalize outputs
            None,       // subfolder
        )
        .map_err(|e| {
            EmberError::Embedding(format!("failed to load model {}: {e}", self.config.model))
        })?;
        Ok(self.model.get_or_init(|| loaded))
    }
}

impl Embedder for StaticModelEmbedder {
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model()?;
        let vectors =
            model.encode_with_args(texts, Some(self.config.max_length), self.config.batch_size);
        if vectors.len() != texts.len() {
            return Err(EmberError::Embedding(format!(
                "model returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    fn fingerprint(&self) -> String {
        fingerprint_for(&self.config)
    }

    fn ensure_loaded(&self) -> Result<()> {
        self.model().map(|_| ())
    }
}

/// `{model_id}:v1:{digest16}` — the digest covers everything that changes
/// the vector space: model id, dimension, sequence cap, pooling, and
/// normalization.
pub fn fingerprint_for(config: &EmbeddingConfig) -> String {
    let descriptor = format!(
        "{}|{}|{}|mean|l2",
        config.model, config.dimension, config.max_length
    );
    let digest = blake3::hash(descriptor.as_bytes()).to_hex();
    format!("{}:v1:{}", config.model, &digest.as_str()[..16])
}
