use std::path::Path;

use rayon::prelude::*;
use tracing::debug;

use crate::error::Result;

/// The text of one page of a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// File name of the source document.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    pub text: String,
}

/// Turns a document on disk into page-level text.
pub trait DocumentLoader: Sync {
    fn load(&self, path: &Path) -> Result<Vec<Page>>;
}

/// Extracts the text layer of PDFs with `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<Page>> {
        let document = lopdf::Document::load(path)?;
        let source = source_name(path);

        let mut pages = Vec::new();
        for page_number in document.get_pages().keys().copied() {
            let text = document.extract_text(&[page_number])?;
            pages.push(Page {
                source: source.clone(),
                page: page_number,
                text,
            });
        }

        debug!(source = %source, pages = pages.len(), "loaded PDF");
        Ok(pages)
    }
}

/// Load every document in parallel. The first failure aborts the whole load.
pub fn load_all<L: DocumentLoader>(
    loader: &L,
    paths: &[impl AsRef<Path> + Sync],
) -> Result<Vec<Page>> {
    let per_document: Vec<Vec<Page>> = paths
        .par_iter()
        .map(|path| loader.load(path.as_ref()))
        .collect::<Result<_>>()?;

    Ok(per_document.into_iter().flatten().collect())
}

pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
