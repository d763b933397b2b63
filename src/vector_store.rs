use std::path::Path;

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};

use crate::{
    chunking::Passage,
    error::{Error, Result},
};

const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");
const PASSAGES: TableDefinition<u64, &[u8]> = TableDefinition::new("passages");

/// Header size: 4 bytes dimension.
const HEADER_SIZE: usize = 4;

/// Stores one embedding per passage, together with the passage itself, so
/// the semantic half of a knowledge base loads without the lexical half.
///
/// Binary format per vector entry:
/// - 4 bytes: embedding dimension D (u32 LE)
/// - D * 4 bytes: f32 LE values
///
/// Passages are stored as JSON.
pub struct VectorStore {
    db: Database,
}

impl VectorStore {
    /// Create (or truncate into) a store at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use pdfchat::vector_store::VectorStore;
    ///
    /// let store = VectorStore::create(&tmp.path().join("vectors.redb")).unwrap();
    /// assert_eq!(store.len().unwrap(), 0);
    /// ```
    pub fn create(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(VECTORS)?;
        txn.open_table(PASSAGES)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Open an existing store. A missing file is an error.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::open(path)?;
        Ok(Self { db })
    }

    /// Store passages and their embeddings in a single transaction.
    pub fn batch_store(&self, entries: &[(Passage, Vec<f32>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut vectors = txn.open_table(VECTORS)?;
            let mut passages = txn.open_table(PASSAGES)?;
            for (passage, vector) in entries {
                let byte_len = HEADER_SIZE + std::mem::size_of_val(vector.as_slice());
                let mut guard = vectors.insert_reserve(passage.id, byte_len)?;
                let dest = guard.as_mut();
                dest[0..HEADER_SIZE]
                    .copy_from_slice(&(vector.len() as u32).to_le_bytes());
                dest[HEADER_SIZE..].copy_from_slice(bytemuck::cast_slice(vector));
                drop(guard);

                let json = serde_json::to_vec(passage)?;
                passages.insert(passage.id, json.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Load every passage with its embedding, ordered by passage id.
    ///
    /// A passage without a well-formed vector means the artifact is damaged.
    pub fn load_all(&self) -> Result<Vec<(Passage, Vec<f32>)>> {
        let txn = self.db.begin_read()?;
        let vectors = txn.open_table(VECTORS)?;
        let passages = txn.open_table(PASSAGES)?;

        let mut result = Vec::new();
        for entry in passages.iter()? {
            let (id, json) = entry?;
            let id = id.value();
            let passage: Passage =
                serde_json::from_slice(json.value()).map_err(|e| {
                    Error::CacheCorrupt(format!("passage {id}: {e}"))
                })?;

            let guard = vectors.get(id)?.ok_or_else(|| {
                Error::CacheCorrupt(format!("passage {id} has no vector"))
            })?;
            let vector = decode_vector(guard.value()).ok_or_else(|| {
                Error::CacheCorrupt(format!("vector {id} is malformed"))
            })?;

            result.push((passage, vector));
        }

        Ok(result)
    }

    pub fn len(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PASSAGES)?;
        Ok(table.len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore").finish_non_exhaustive()
    }
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }
    let dimension = u32::from_le_bytes(bytes[0..HEADER_SIZE].try_into().ok()?);
    let body = &bytes[HEADER_SIZE..];
    if body.len() != (dimension as usize) * 4 {
        return None;
    }

    // Stored bytes carry no alignment guarantee, so decode per value.
    Some(
        body.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(id: u64, text: &str) -> Passage {
        Passage {
            id,
            source: "a.pdf".to_string(),
            page: 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn store_and_load_all() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VectorStore::create(&tmp.path().join("v.redb")).unwrap();

        store
            .batch_store(&[
                (passage(1, "one"), vec![0.1, 0.2, 0.3]),
                (passage(0, "zero"), vec![1.0, 0.0, -1.0]),
            ])
            .unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].0, passage(0, "zero"));
        assert_eq!(loaded[0].1, vec![1.0, 0.0, -1.0]);
        assert_eq!(loaded[1].1, vec![0.1, 0.2, 0.3]);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("v.redb");

        {
            let store = VectorStore::create(&path).unwrap();
            store.batch_store(&[(passage(0, "kept"), vec![1.0, 2.0])]).unwrap();
        }

        let store = VectorStore::open(&path).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded[0].0.text, "kept");
        assert_eq!(loaded[0].1, vec![1.0, 2.0]);
    }

    #[test]
    fn open_missing_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(VectorStore::open(&tmp.path().join("absent.redb")).is_err());
    }

    #[test]
    fn open_garbage_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("garbage.redb");
        std::fs::write(&path, b"this is not a redb file at all").unwrap();
        assert!(VectorStore::open(&path).is_err());
    }

    #[test]
    fn decode_rejects_truncated_vectors() {
        assert!(decode_vector(&[1, 0]).is_none());
        let mut bytes = 2u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        assert!(decode_vector(&bytes).is_none());
        bytes.extend_from_slice(&2.0f32.to_le_bytes());
        assert_eq!(decode_vector(&bytes), Some(vec![1.0, 2.0]));
    }
}
