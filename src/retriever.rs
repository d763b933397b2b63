use std::collections::HashMap;

use crate::{
    chunking::Passage,
    error::Result,
    index_cache::CacheEntry,
    lexical_index::LexicalIndex,
    semantic_index::SemanticIndex,
};

/// Candidates taken from each channel before fusion.
pub const DEFAULT_K: usize = 4;
pub const LEXICAL_WEIGHT: f32 = 0.4;
pub const SEMANTIC_WEIGHT: f32 = 0.6;
/// Reciprocal-rank damping constant.
pub const RRF_C: f32 = 60.0;

/// A fused result: a passage and its combined score.
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    pub score: f32,
    pub passage: Passage,
}

/// Lexical and semantic retrieval merged into one ranking.
///
/// Each channel contributes `weight / (rank + RRF_C)` for every passage it
/// returns (rank is 1-based). Contributions for the same passage add up.
/// Ties keep the order of first appearance, lexical before semantic.
#[derive(Debug)]
pub struct HybridRetriever {
    lexical: LexicalIndex,
    semantic: SemanticIndex,
}

impl HybridRetriever {
    pub fn new(entry: CacheEntry) -> Self {
        Self {
            lexical: entry.lexical,
            semantic: entry.semantic,
        }
    }

    pub fn num_passages(&self) -> usize {
        self.semantic.len()
    }

    /// Rank passages for a query. `query_vector` is the query's embedding.
    pub fn retrieve(
        &self,
        query: &str,
        query_vector: &[f32],
    ) -> Result<Vec<RetrievedPassage>> {
        let lexical: Vec<Passage> = self
            .lexical
            .search(query, DEFAULT_K)?
            .into_iter()
            .map(|h| h.passage)
            .collect();
        let semantic: Vec<Passage> = self
            .semantic
            .search(query_vector, DEFAULT_K)?
            .into_iter()
            .map(|h| h.passage)
            .collect();

        Ok(fuse(lexical, semantic))
    }
}

/// Weighted reciprocal-rank fusion of two ranked lists.
pub fn fuse(lexical: Vec<Passage>, semantic: Vec<Passage>) -> Vec<RetrievedPassage> {
    let mut merged: Vec<RetrievedPassage> = Vec::new();
    let mut position: HashMap<u64, usize> = HashMap::new();

    let channels = [(lexical, LEXICAL_WEIGHT), (semantic, SEMANTIC_WEIGHT)];
    for (ranked, weight) in channels {
        for (index, passage) in ranked.into_iter().enumerate() {
            let contribution = weight / (RRF_C + (index + 1) as f32);
            match position.get(&passage.id) {
                Some(&at) => merged[at].score += contribution,
                None => {
                    position.insert(passage.id, merged.len());
                    merged.push(RetrievedPassage {
                        score: contribution,
                        passage,
                    });
                }
            }
        }
    }

    // Stable sort keeps first-appearance order among equal scores.
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged
}
