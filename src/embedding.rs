use tracing::debug;

use crate::{
    chunking::Passage,
    error::{Error, Result},
    providers::Embedder,
    vector_store::VectorStore,
};

/// Passages sent to the embedder per call.
pub const EMBED_BATCH_SIZE: usize = 64;

/// Embed passages in batches and store each batch's vectors.
///
/// Returns the number of passages embedded.
pub async fn embed_and_store<E: Embedder>(
    embedder: &E,
    store: &VectorStore,
    passages: &[Passage],
) -> Result<usize> {
    let mut stored = 0;

    for batch in passages.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
        let vectors = embedder.embed_documents(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(Error::Model(format!(
                "embedder returned {} vectors for {} passages",
                vectors.len(),
                batch.len()
            )));
        }

        let entries: Vec<(Passage, Vec<f32>)> =
            batch.iter().cloned().zip(vectors).collect();
        store.batch_store(&entries)?;

        stored += batch.len();
        debug!(stored, total = passages.len(), "embedded batch");
    }

    Ok(stored)
}
