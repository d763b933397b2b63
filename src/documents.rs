//! The registry of known PDFs and which of them are enabled.
//!
//! Adding or toggling a document never rebuilds anything by itself; the
//! rebuild decision that runs before every query picks the change up.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::info;

use crate::{
    config_db::ConfigDb,
    error::{Error, Result},
};

/// A registered document.
///
/// Serialized as: `"path\0enabled"` where enabled is `1` or `0`.
///
/// # Examples
///
/// ```
/// use pdfchat::documents::DocumentRecord;
///
/// let record = DocumentRecord::new("/papers/intro.pdf".as_ref());
/// assert_eq!(record.identifier, "intro.pdf");
/// let bytes = record.serialize();
/// let restored = DocumentRecord::deserialize("intro.pdf", &bytes).unwrap();
/// assert_eq!(record, restored);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    /// The file name, unique within the registry.
    pub identifier: String,
    pub path: PathBuf,
    pub enabled: bool,
}

impl DocumentRecord {
    /// A new, enabled record keyed by the path's file name.
    pub fn new(path: &Path) -> Self {
        let identifier = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self {
            identifier,
            path: path.to_path_buf(),
            enabled: true,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        format!(
            "{}\0{}",
            self.path.to_string_lossy(),
            if self.enabled { 1 } else { 0 }
        )
        .into_bytes()
    }

    /// Deserialize from bytes. Returns `None` if the format is invalid.
    pub fn deserialize(identifier: &str, bytes: &[u8]) -> Option<Self> {
        let s = std::str::from_utf8(bytes).ok()?;
        let (path, enabled) = s.rsplit_once('\0')?;
        let enabled = match enabled {
            "1" => true,
            "0" => false,
            _ => return None,
        };
        Some(Self {
            identifier: identifier.to_string(),
            path: PathBuf::from(path),
            enabled,
        })
    }
}

/// Documents keyed by identifier, iterated in identifier order.
///
/// When backed by a [`ConfigDb`], every mutation is written through.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    records: BTreeMap<String, DocumentRecord>,
    store: Option<Arc<ConfigDb>>,
}

impl DocumentRegistry {
    /// A registry that lives only in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load every stored record. Malformed entries are skipped.
    pub fn load(store: Arc<ConfigDb>) -> Result<Self> {
        let records = store
            .list_documents()?
            .into_iter()
            .filter_map(|(identifier, bytes)| {
                DocumentRecord::deserialize(&identifier, &bytes)
                    .map(|record| (identifier, record))
            })
            .collect();

        Ok(Self {
            records,
            store: Some(store),
        })
    }

    /// Register a document as enabled, replacing any record with the same
    /// file name.
    pub fn add(&mut self, path: &Path) -> Result<&DocumentRecord> {
        let record = DocumentRecord::new(path);
        self.persist(&record)?;
        info!(document = %record.identifier, "document added");

        let identifier = record.identifier.clone();
        self.records.insert(identifier.clone(), record);
        Ok(&self.records[&identifier])
    }

    pub fn set_enabled(&mut self, identifier: &str, enabled: bool) -> Result<()> {
        let record = self.records.get_mut(identifier).ok_or_else(|| {
            Error::NotFound {
                kind: "document",
                name: identifier.to_string(),
            }
        })?;
        record.enabled = enabled;

        let record = record.clone();
        self.persist(&record)?;
        info!(document = %identifier, enabled, "document toggled");
        Ok(())
    }

    pub fn remove(&mut self, identifier: &str) -> Result<bool> {
        if let Some(store) = &self.store {
            store.remove_document(identifier)?;
        }
        Ok(self.records.remove(identifier).is_some())
    }

    pub fn get(&self, identifier: &str) -> Option<&DocumentRecord> {
        self.records.get(identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Paths of the enabled documents, in identifier order.
    pub fn enabled_paths(&self) -> Vec<PathBuf> {
        self.records
            .values()
            .filter(|r| r.enabled)
            .map(|r| r.path.clone())
            .collect()
    }

    fn persist(&self, record: &DocumentRecord) -> Result<()> {
        if let Some(store) = &self.store {
            store.set_document(&record.identifier, &record.serialize())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrip_keeps_disabled_flag() {
        let mut record = DocumentRecord::new(Path::new("/docs/a.pdf"));
        record.enabled = false;
        let restored =
            DocumentRecord::deserialize("a.pdf", &record.serialize()).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn deserialize_rejects_garbage() {
        assert!(DocumentRecord::deserialize("a.pdf", b"no separator").is_none());
        assert!(DocumentRecord::deserialize("a.pdf", b"/a.pdf\0maybe").is_none());
        assert!(DocumentRecord::deserialize("a.pdf", &[0xff, 0xfe]).is_none());
    }

    #[test]
    fn add_keys_by_file_name() {
        let mut registry = DocumentRegistry::in_memory();
        registry.add(Path::new("/one/report.pdf")).unwrap();
        registry.add(Path::new("/two/report.pdf")).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("report.pdf").unwrap().path,
            PathBuf::from("/two/report.pdf")
        );
    }

    #[test]
    fn enabled_paths_follow_toggles_in_identifier_order() {
        let mut registry = DocumentRegistry::in_memory();
        registry.add(Path::new("/docs/b.pdf")).unwrap();
        registry.add(Path::new("/docs/a.pdf")).unwrap();
        registry.add(Path::new("/docs/c.pdf")).unwrap();

        registry.set_enabled("c.pdf", false).unwrap();
        assert_eq!(
            registry.enabled_paths(),
            vec![PathBuf::from("/docs/a.pdf"), PathBuf::from("/docs/b.pdf")]
        );
    }

    #[test]
    fn toggling_unknown_document_fails() {
        let mut registry = DocumentRegistry::in_memory();
        let err = registry.set_enabled("ghost.pdf", true).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "document", .. }));
    }

    #[test]
    fn persisted_registry_survives_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Arc::new(ConfigDb::open(&tmp.path().join("config.db")).unwrap());

        {
            let mut registry = DocumentRegistry::load(db.clone()).unwrap();
            registry.add(Path::new("/docs/a.pdf")).unwrap();
            registry.add(Path::new("/docs/b.pdf")).unwrap();
            registry.set_enabled("b.pdf", false).unwrap();
            registry.remove("a.pdf").unwrap();
            registry.add(Path::new("/docs/c.pdf")).unwrap();
        }

        let registry = DocumentRegistry::load(db).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(!registry.get("b.pdf").unwrap().enabled);
        assert!(registry.get("c.pdf").unwrap().enabled);
        assert!(registry.get("a.pdf").is_none());
    }
}
