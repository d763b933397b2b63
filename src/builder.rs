use std::path::PathBuf;

use tracing::{info, warn};

use crate::{
    chunking::{self, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE},
    embedding,
    error::{Error, Result},
    fingerprint::Fingerprint,
    index_cache::{CacheLookup, IndexCache},
    lexical_index::WRITER_MEMORY_BUDGET,
    loader::{self, DocumentLoader},
    providers::Embedder,
    retriever::HybridRetriever,
};

/// What a build produced and how.
#[derive(Debug)]
pub struct BuildOutcome {
    pub retriever: HybridRetriever,
    /// True when both indexes came from the cache and nothing was embedded.
    pub from_cache: bool,
}

/// Turns a set of documents into a searchable knowledge base, going
/// through the index cache.
pub struct KnowledgeBaseBuilder<'a, D, E> {
    loader: &'a D,
    embedder: &'a E,
    cache: &'a IndexCache,
}

impl<'a, D: DocumentLoader, E: Embedder> KnowledgeBaseBuilder<'a, D, E> {
    pub fn new(loader: &'a D, embedder: &'a E, cache: &'a IndexCache) -> Self {
        Self {
            loader,
            embedder,
            cache,
        }
    }

    /// Load the knowledge base for `fingerprint` from the cache, or build it
    /// from `paths` and cache it. Any failure aborts the whole build.
    pub async fn build(
        &self,
        fingerprint: &Fingerprint,
        paths: &[PathBuf],
    ) -> Result<BuildOutcome> {
        match self.cache.load(fingerprint) {
            CacheLookup::Hit(entry) => {
                info!(fingerprint = fingerprint.short(), "loaded knowledge base from cache");
                return Ok(BuildOutcome {
                    retriever: HybridRetriever::new(entry),
                    from_cache: true,
                });
            }
            CacheLookup::Corrupt(e) => {
                warn!(error = %e, "discarding unreadable cache entry");
            }
            CacheLookup::Miss => {}
        }

        info!(
            fingerprint = fingerprint.short(),
            documents = paths.len(),
            "building knowledge base"
        );

        let pages = loader::load_all(self.loader, paths)?;
        let passages =
            chunking::split_pages(&pages, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP);
        if passages.is_empty() {
            return Err(Error::NoText);
        }
        info!(pages = pages.len(), passages = passages.len(), "documents split");

        let staged = self.cache.stage(fingerprint)?;

        let mut writer = staged.lexical.writer(WRITER_MEMORY_BUDGET)?;
        for passage in &passages {
            staged.lexical.add_passage(&writer, passage)?;
        }
        writer.commit()?;
        writer.wait_merging_threads()?;

        let embedded =
            embedding::embed_and_store(self.embedder, &staged.vectors, &passages)
                .await?;
        info!(embedded, "semantic index built");

        let entry = self.cache.store(fingerprint, staged)?;
        info!("knowledge base built and cached");

        Ok(BuildOutcome {
            retriever: HybridRetriever::new(entry),
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::loader::Page;

    struct TextLoader;

    impl DocumentLoader for TextLoader {
        fn load(&self, path: &Path) -> Result<Vec<Page>> {
            let source = loader::source_name(path);
            if source.starts_with("empty") {
                return Ok(vec![Page {
                    source,
                    page: 1,
                    text: "  ".to_string(),
                }]);
            }
            Ok(vec![Page {
                text: format!("{source} talks about supply chain risk"),
                source,
                page: 1,
            }])
        }
    }

    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Embedder for CountingEmbedder {
        fn name(&self) -> &str {
            "counting"
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Model("embedding service down".to_string()));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 1.0])
        }
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/docs").join(n)).collect()
    }

    #[tokio::test]
    async fn second_build_comes_from_cache_without_embedding() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(tmp.path().to_path_buf()).unwrap();
        let embedder = CountingEmbedder::default();
        let builder = KnowledgeBaseBuilder::new(&TextLoader, &embedder, &cache);

        let docs = paths(&["A.pdf", "B.pdf"]);
        let fp = Fingerprint::of(&docs);

        let first = builder.build(&fp, &docs).await.unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.retriever.num_passages(), 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        let second = builder.build(&fp, &docs).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.retriever.num_passages(), 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn embedding_failure_aborts_and_caches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(tmp.path().to_path_buf()).unwrap();
        let embedder = CountingEmbedder {
            fail: true,
            ..Default::default()
        };
        let builder = KnowledgeBaseBuilder::new(&TextLoader, &embedder, &cache);

        let docs = paths(&["A.pdf"]);
        let fp = Fingerprint::of(&docs);

        assert!(builder.build(&fp, &docs).await.is_err());
        assert!(!cache.contains(&fp));
        assert!(!cache.lexical_path(&fp).exists());
    }

    #[tokio::test]
    async fn documents_without_text_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(tmp.path().to_path_buf()).unwrap();
        let embedder = CountingEmbedder::default();
        let builder = KnowledgeBaseBuilder::new(&TextLoader, &embedder, &cache);

        let docs = paths(&["empty.pdf"]);
        let err = builder.build(&Fingerprint::of(&docs), &docs).await.unwrap_err();
        assert!(matches!(err, Error::NoText));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn corrupt_cache_entry_is_rebuilt() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(tmp.path().to_path_buf()).unwrap();
        let embedder = CountingEmbedder::default();
        let builder = KnowledgeBaseBuilder::new(&TextLoader, &embedder, &cache);

        let docs = paths(&["A.pdf"]);
        let fp = Fingerprint::of(&docs);
        builder.build(&fp, &docs).await.unwrap();

        std::fs::write(cache.semantic_path(&fp), b"not a database").unwrap();

        let rebuilt = builder.build(&fp, &docs).await.unwrap();
        assert!(!rebuilt.from_cache);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }
}
