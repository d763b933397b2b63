//! pdfchat - ask questions about a set of PDFs from the terminal.
//!
//! Enabled PDFs are split into passages and indexed twice: lexically with
//! [Tantivy](https://github.com/quickwit-oss/tantivy) and semantically with
//! dense vectors stored in [redb](https://github.com/cberner/redb). Both
//! indexes are cached on disk under a fingerprint of the enabled set, so
//! toggling back to a set seen before costs no embedding calls.
//!
//! Questions go through a [`Session`]: the knowledge base is brought in line
//! with the enabled documents, passages are retrieved by fusing both
//! rankings, and a chat model answers from them.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pdfchat::{ConfigDb, DataDir, DocumentRegistry, IndexCache, Session, TranscriptStore};
//! use pdfchat::gemini::{GeminiClient, GeminiConfig};
//! use pdfchat::loader::PdfLoader;
//!
//! # async fn run() -> pdfchat::Result<()> {
//! let data_dir = DataDir::resolve(None)?;
//! let config_db = Arc::new(ConfigDb::open(&data_dir.config_db())?);
//!
//! let mut registry = DocumentRegistry::load(config_db)?;
//! registry.add("/papers/supply-chain.pdf".as_ref())?;
//!
//! let config = GeminiConfig::new("api-key", "gemini-1.5-flash");
//! let mut session = Session::new(
//!     PdfLoader,
//!     GeminiClient::new(config.clone())?,
//!     GeminiClient::new(config)?,
//!     registry,
//!     IndexCache::new(data_dir.cache_dir("gemini")?)?,
//!     TranscriptStore::new(data_dir.chats_dir()?)?,
//! );
//!
//! println!("{}", session.answer("How do I reduce supply chain risk?").await);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cancel;
pub mod chain;
pub mod chunking;
pub mod config_db;
pub mod data_dir;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod gemini;
pub mod history;
pub mod index_cache;
pub mod lexical_index;
pub mod loader;
pub mod model_manager;
pub mod pipeline;
pub mod playback;
pub mod providers;
pub mod retriever;
pub mod semantic_index;
pub mod session;
pub mod settings;
pub mod text_util;
pub mod vector_store;
pub mod walker;

pub use cancel::CancellationFlag;
pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use documents::DocumentRegistry;
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use history::{ConversationHistory, TranscriptStore};
pub use index_cache::IndexCache;
pub use retriever::HybridRetriever;
pub use session::{KnowledgeState, Session};
pub use vector_store::VectorStore;
