use std::path::Path;

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    collector::TopDocs,
    doc,
    query::{BooleanQuery, FuzzyTermQuery, Occur, Query, QueryParser},
    schema::*,
    tokenizer::{
        LowerCaser,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        TextAnalyzer,
    },
};

use crate::{
    chunking::Passage,
    error::{Error, Result},
};

/// Field names used in the schema.
pub mod fields {
    pub const PASSAGE_ID: &str = "passage_id";
    pub const SOURCE: &str = "source";
    pub const PAGE: &str = "page";
    pub const BODY: &str = "body";
}

/// Writer memory budget used when building an index.
pub const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// BM25 index over passages, backed by Tantivy.
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
pub struct SchemaFields {
    pub passage_id: Field,
    pub source: Field,
    pub page: Field,
    pub body: Field,
}

/// A passage matched by the lexical index.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub score: f32,
    pub passage: Passage,
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_u64_field(fields::PASSAGE_ID, STORED | FAST);
    builder.add_text_field(fields::SOURCE, STRING | STORED);
    builder.add_u64_field(fields::PAGE, STORED);

    let body_opts = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("en_stem")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    builder.add_text_field(fields::BODY, body_opts);

    builder.build()
}

fn resolve_fields(schema: &Schema) -> Result<SchemaFields> {
    Ok(SchemaFields {
        passage_id: schema.get_field(fields::PASSAGE_ID)?,
        source: schema.get_field(fields::SOURCE)?,
        page: schema.get_field(fields::PAGE)?,
        body: schema.get_field(fields::BODY)?,
    })
}

fn register_tokenizers(index: &Index) {
    let en_stem = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build();
    index.tokenizers().register("en_stem", en_stem);
}

fn mmap_dir(dir: &Path) -> Result<tantivy::directory::MmapDirectory> {
    tantivy::directory::MmapDirectory::open(dir).map_err(|e| {
        Error::Tantivy(tantivy::TantivyError::SystemError(e.to_string()))
    })
}

impl LexicalIndex {
    /// Create a fresh index in `dir`, which must not already hold one.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let index = Index::create(
            mmap_dir(dir)?,
            build_schema(),
            tantivy::IndexSettings::default(),
        )?;
        Self::from_index(index)
    }

    /// Open an existing index. A directory without one is an error.
    pub fn open(dir: &Path) -> Result<Self> {
        let directory = mmap_dir(dir)?;
        let exists = Index::exists(&directory).map_err(|e| {
            Error::Tantivy(tantivy::TantivyError::SystemError(e.to_string()))
        })?;
        if !exists {
            return Err(Error::CacheCorrupt(format!(
                "no lexical index in {}",
                dir.display()
            )));
        }
        Self::from_index(Index::open(directory)?)
    }

    /// Create an in-memory index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        Self::from_index(Index::create_in_ram(build_schema()))
    }

    fn from_index(index: Index) -> Result<Self> {
        register_tokenizers(&index);
        let fields = resolve_fields(&index.schema())?;
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    /// Create a writer with the given memory budget (in bytes).
    pub fn writer(&self, memory_budget: usize) -> Result<IndexWriter> {
        Ok(self.index.writer(memory_budget)?)
    }

    /// Add a passage to the index via the given writer.
    pub fn add_passage(
        &self,
        writer: &IndexWriter,
        passage: &Passage,
    ) -> Result<()> {
        let f = self.fields;
        writer.add_document(doc!(
            f.passage_id => passage.id,
            f.source => passage.source.as_str(),
            f.page => u64::from(passage.page),
            f.body => passage.text.as_str(),
        ))?;
        Ok(())
    }

    /// Number of passages visible to searches.
    pub fn num_passages(&self) -> Result<u64> {
        self.reader.reload()?;
        Ok(self.reader.searcher().num_docs())
    }

    /// Search with BM25 + fuzzy matching combined.
    ///
    /// Creates a FuzzyTermQuery with Levenshtein distance 1 for each query
    /// term of three or more characters, then ORs them with the BM25 query.
    /// Deduplicates results by passage id.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let f = self.fields;
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let parser = QueryParser::for_index(&self.index, vec![f.body]);
        let (bm25_query, _errors) = parser.parse_query_lenient(query_str);

        let mut should_clauses: Vec<(Occur, Box<dyn Query>)> =
            vec![(Occur::Should, bm25_query)];

        for term_str in query_str.split_whitespace() {
            let word = term_str.trim_matches(|c: char| !c.is_alphanumeric());
            if word.chars().count() >= 3 {
                let term =
                    tantivy::Term::from_field_text(f.body, &word.to_lowercase());
                let fuzzy = FuzzyTermQuery::new(term, 1, true);
                should_clauses.push((Occur::Should, Box::new(fuzzy)));
            }
        }

        let query = BooleanQuery::new(should_clauses);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut seen = std::collections::HashSet::new();
        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let id = extract_u64(&doc, f.passage_id);
            if seen.insert(id) {
                results.push(LexicalHit {
                    score,
                    passage: Passage {
                        id,
                        source: extract_text(&doc, f.source),
                        page: extract_u64(&doc, f.page) as u32,
                        text: extract_text(&doc, f.body),
                    },
                });
            }
        }

        Ok(results)
    }
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex").finish_non_exhaustive()
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}
