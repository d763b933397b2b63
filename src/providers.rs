//! Capability traits for the external models the assistant talks to.
//!
//! Both are async because the default backends are remote. Implementations
//! are used through generics, never boxed, so the `async fn` sugar is fine.

use crate::error::Result;

/// Turns text into fixed-dimension vectors.
#[allow(async_fn_in_trait)]
pub trait Embedder {
    /// Stable name of the vector space, used to partition the index cache.
    fn name(&self) -> &str;

    /// Embed passages for storage. Returns one vector per input, in order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Produces a text completion for a prompt.
#[allow(async_fn_in_trait)]
pub trait ChatModel {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

/// The embedders selectable at runtime.
pub enum EmbeddingBackend {
    Gemini(crate::gemini::GeminiClient),
    Local(crate::model_manager::LocalEmbedder),
}

impl Embedder for EmbeddingBackend {
    fn name(&self) -> &str {
        match self {
            Self::Gemini(e) => e.name(),
            Self::Local(e) => e.name(),
        }
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            Self::Gemini(e) => e.embed_documents(texts).await,
            Self::Local(e) => e.embed_documents(texts).await,
        }
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        match self {
            Self::Gemini(e) => e.embed_query(text).await,
            Self::Local(e) => e.embed_query(text).await,
        }
    }
}
