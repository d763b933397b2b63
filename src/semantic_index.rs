use rayon::prelude::*;

use crate::{
    chunking::Passage,
    error::{Error, Result},
};

/// A passage matched by the semantic index.
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub score: f32,
    pub passage: Passage,
}

/// In-memory nearest-neighbour search over passage embeddings.
///
/// Vectors are normalised on insertion, so scoring is a dot product.
#[derive(Debug, Default)]
pub struct SemanticIndex {
    passages: Vec<Passage>,
    vectors: Vec<Vec<f32>>,
    dimension: Option<usize>,
}

impl SemanticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from (passage, embedding) pairs.
    pub fn from_entries(entries: Vec<(Passage, Vec<f32>)>) -> Result<Self> {
        let mut index = Self::new();
        for (passage, vector) in entries {
            index.insert(passage, vector)?;
        }
        Ok(index)
    }

    /// Add one passage. All vectors must share a dimension.
    pub fn insert(&mut self, passage: Passage, vector: Vec<f32>) -> Result<()> {
        let dimension = *self.dimension.get_or_insert(vector.len());
        if vector.len() != dimension {
            return Err(Error::Model(format!(
                "embedding for passage {} has dimension {}, expected {dimension}",
                passage.id,
                vector.len()
            )));
        }
        self.passages.push(passage);
        self.vectors.push(normalize(vector));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Return the `k` passages most similar to `query` by cosine similarity.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdfchat::chunking::Passage;
    /// use pdfchat::semantic_index::SemanticIndex;
    ///
    /// let p = |id| Passage { id, source: "a.pdf".into(), page: 1, text: String::new() };
    /// let index = SemanticIndex::from_entries(vec![
    ///     (p(0), vec![1.0, 0.0]),
    ///     (p(1), vec![0.0, 1.0]),
    /// ]).unwrap();
    ///
    /// let hits = index.search(&[0.9, 0.1], 1).unwrap();
    /// assert_eq!(hits[0].passage.id, 0);
    /// ```
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SemanticHit>> {
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(Error::Model(format!(
                "query embedding has dimension {}, expected {dimension}",
                query.len()
            )));
        }

        let query = normalize(query.to_vec());

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .par_iter()
            .enumerate()
            .map(|(i, v)| (i, dot(&query, v)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SemanticHit {
                score,
                passage: self.passages[i].clone(),
            })
            .collect())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
