//! Fingerprint-keyed persistence of built knowledge bases.
//!
//! Each fingerprint owns two artifacts in the cache directory:
//!
//! - `<fingerprint>.lexical/`: the Tantivy index directory
//! - `<fingerprint>.vectors.redb`: passages and their embeddings
//!
//! Only a complete pair is a hit. Artifacts are built under `.partial` names
//! and renamed into place lexical first, semantic last, so an interrupted
//! store leaves at most the lexical artifact behind, which reads as a miss.
//! Entries are never evicted.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    fingerprint::Fingerprint,
    lexical_index::LexicalIndex,
    semantic_index::SemanticIndex,
    vector_store::VectorStore,
};

const LEXICAL_EXT: &str = "lexical";
const SEMANTIC_EXT: &str = "vectors.redb";
const PARTIAL_SUFFIX: &str = ".partial";

/// Both halves of a knowledge base, ready to search.
#[derive(Debug)]
pub struct CacheEntry {
    pub lexical: LexicalIndex,
    pub semantic: SemanticIndex,
}

/// Outcome of [`IndexCache::load`].
#[derive(Debug)]
pub enum CacheLookup {
    Hit(CacheEntry),
    /// At least one artifact is absent.
    Miss,
    /// Both artifacts exist but could not be read. Callers rebuild.
    Corrupt(Error),
}

/// Write targets for a build in progress, created by [`IndexCache::stage`].
#[derive(Debug)]
pub struct StagedEntry {
    pub lexical: LexicalIndex,
    pub vectors: VectorStore,
    lexical_path: PathBuf,
    semantic_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct IndexCache {
    dir: PathBuf,
}

impl IndexCache {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lexical_path(&self, fp: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{fp}.{LEXICAL_EXT}"))
    }

    pub fn semantic_path(&self, fp: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{fp}.{SEMANTIC_EXT}"))
    }

    /// Whether both artifacts are present, without opening them.
    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.lexical_path(fp).is_dir() && self.semantic_path(fp).is_file()
    }

    /// Load the entry for `fp`.
    pub fn load(&self, fp: &Fingerprint) -> CacheLookup {
        if !self.contains(fp) {
            debug!(fingerprint = fp.short(), "index cache miss");
            return CacheLookup::Miss;
        }

        match self.open_pair(fp) {
            Ok(entry) => {
                debug!(
                    fingerprint = fp.short(),
                    passages = entry.semantic.len(),
                    "index cache hit"
                );
                CacheLookup::Hit(entry)
            }
            Err(e) => {
                warn!(fingerprint = fp.short(), error = %e, "cached index is unreadable");
                CacheLookup::Corrupt(e)
            }
        }
    }

    fn open_pair(&self, fp: &Fingerprint) -> Result<CacheEntry> {
        let lexical = LexicalIndex::open(&self.lexical_path(fp))?;
        let vectors = VectorStore::open(&self.semantic_path(fp))?;
        let semantic = SemanticIndex::from_entries(vectors.load_all()?)?;

        let lexical_count = lexical.num_passages()?;
        if lexical_count != semantic.len() as u64 {
            return Err(Error::CacheCorrupt(format!(
                "lexical index holds {lexical_count} passages, vector store {}",
                semantic.len()
            )));
        }

        Ok(CacheEntry { lexical, semantic })
    }

    /// Create fresh write targets for `fp`, discarding leftovers of an
    /// earlier interrupted build.
    pub fn stage(&self, fp: &Fingerprint) -> Result<StagedEntry> {
        let lexical_path = partial(&self.lexical_path(fp));
        let semantic_path = partial(&self.semantic_path(fp));
        remove_if_exists(&lexical_path)?;
        remove_if_exists(&semantic_path)?;

        Ok(StagedEntry {
            lexical: LexicalIndex::create(&lexical_path)?,
            vectors: VectorStore::create(&semantic_path)?,
            lexical_path,
            semantic_path,
        })
    }

    /// Publish a fully written staged entry under `fp`, replacing any
    /// existing artifacts, and reopen it from its final location.
    pub fn store(&self, fp: &Fingerprint, staged: StagedEntry) -> Result<CacheEntry> {
        let StagedEntry {
            lexical,
            vectors,
            lexical_path,
            semantic_path,
        } = staged;
        drop(lexical);
        drop(vectors);

        let final_lexical = self.lexical_path(fp);
        let final_semantic = self.semantic_path(fp);

        // Semantic goes away first and comes back last.
        remove_if_exists(&final_semantic)?;
        remove_if_exists(&final_lexical)?;
        std::fs::rename(&lexical_path, &final_lexical)?;
        std::fs::rename(&semantic_path, &final_semantic)?;

        debug!(fingerprint = fp.short(), "index cache stored");
        self.open_pair(fp)
    }
}

fn partial(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
