use std::sync::Mutex;

use candle_core::{Device, Tensor};
use pylate_rs::ColBERT;
use tracing::info;

use crate::{
    error::{Error, Result},
    providers::Embedder,
};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";
pub const MODEL_ENV_VAR: &str = "PDFCHAT_MODEL";

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

fn model_err(e: impl std::fmt::Display) -> Error {
    Error::Model(e.to_string())
}

/// Manages the ColBERT model lifecycle, supporting lazy loading on first use.
pub struct ModelManager {
    model: Option<ColBERT>,
    model_id: String,
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelManager {
    /// The model ID comes from `PDFCHAT_MODEL` when set, otherwise
    /// [`DEFAULT_MODEL_ID`]. Nothing is loaded until the first encode.
    pub fn new() -> Self {
        let model_id = std::env::var(MODEL_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());
        Self::with_model_id(model_id)
    }

    pub fn with_model_id(model_id: String) -> Self {
        Self {
            model: None,
            model_id,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Ensures the model is loaded, downloading from HuggingFace Hub if needed.
    fn ensure_loaded(&mut self) -> Result<&mut ColBERT> {
        if self.model.is_none() {
            info!(model = %self.model_id, "loading embedding model");
            let colbert: ColBERT = ColBERT::from(&self.model_id)
                .with_device(default_device())
                .try_into()
                .map_err(model_err)?;
            self.model = Some(colbert);
        }

        self.model
            .as_mut()
            .ok_or_else(|| Error::Model("model failed to load".to_string()))
    }

    /// Encode texts into one vector each by mean-pooling ColBERT token
    /// embeddings.
    pub fn encode_pooled(
        &mut self,
        texts: &[String],
        is_query: bool,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.ensure_loaded()?;
        // [batch, tokens, dimension]
        let embeddings = model.encode(texts, is_query).map_err(model_err)?;
        mean_pool(&embeddings)
    }
}

/// Average over the token axis: `[B, T, D]` to `B` vectors of `D`.
fn mean_pool(embeddings: &Tensor) -> Result<Vec<Vec<f32>>> {
    embeddings
        .mean(1)
        .and_then(|t| t.to_vec2::<f32>())
        .map_err(model_err)
}

/// Runs the embedding model in-process instead of calling a remote API.
pub struct LocalEmbedder {
    manager: Mutex<ModelManager>,
}

impl LocalEmbedder {
    pub fn new(manager: ModelManager) -> Self {
        Self {
            manager: Mutex::new(manager),
        }
    }

    fn encode(&self, texts: &[String], is_query: bool) -> Result<Vec<Vec<f32>>> {
        let mut manager = self
            .manager
            .lock()
            .map_err(|_| Error::Model("model lock poisoned".to_string()))?;
        manager.encode_pooled(texts, is_query)
    }
}

impl Embedder for LocalEmbedder {
    fn name(&self) -> &str {
        "local"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.encode(texts, false)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(&[text.to_string()], true)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Model("no query embedding returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_model_id() {
        let manager = ModelManager::with_model_id("custom/model".to_string());
        assert_eq!(manager.model_id(), "custom/model");
        assert!(!manager.is_loaded());
    }

    #[test]
    fn empty_batch_does_not_load_model() {
        let mut manager = ModelManager::with_model_id("custom/model".to_string());
        assert!(manager.encode_pooled(&[], false).unwrap().is_empty());
        assert!(!manager.is_loaded());
    }

    #[test]
    fn mean_pool_averages_tokens() {
        // Two texts, two tokens each, dimension 2.
        let t = Tensor::from_vec(
            vec![1.0f32, 0.0, 3.0, 2.0, 0.0, 4.0, 0.0, 0.0],
            (2, 2, 2),
            &Device::Cpu,
        )
        .unwrap();
        let pooled = mean_pool(&t).unwrap();
        assert_eq!(pooled, vec![vec![2.0, 1.0], vec![0.0, 2.0]]);
    }
}
