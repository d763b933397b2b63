use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::Result;

const DOCUMENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("documents");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Persistent key-value storage for settings and the document registry.
pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(DOCUMENTS)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Documents --

    pub fn set_document(&self, identifier: &str, data: &[u8]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            table.insert(identifier, data)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn remove_document(&self, identifier: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(DOCUMENTS)?;
            table.remove(identifier)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Return all (identifier, record_bytes) pairs in a single read transaction.
    pub fn list_documents(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_vec()));
        }
        Ok(result)
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Forget a stored setting. Returns whether it was set.
    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Get a setting, returning the default if not set.
    pub fn get_setting_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, ConfigDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = ConfigDb::open(&tmp.path().join("config.db")).unwrap();
        (tmp, db)
    }

    #[test]
    fn documents_crud() {
        let (_tmp, db) = test_db();

        assert!(db.list_documents().unwrap().is_empty());

        db.set_document("a.pdf", b"/docs/a.pdf\x001").unwrap();
        db.set_document("a.pdf", b"/docs/a.pdf\x000").unwrap();
        assert_eq!(
            db.list_documents().unwrap(),
            vec![("a.pdf".to_string(), b"/docs/a.pdf\x000".to_vec())]
        );

        assert!(db.remove_document("a.pdf").unwrap());
        assert!(!db.remove_document("a.pdf").unwrap());
        assert!(db.list_documents().unwrap().is_empty());
    }

    #[test]
    fn settings_crud() {
        let (_tmp, db) = test_db();

        assert_eq!(db.get_setting("model_name").unwrap(), None);
        assert_eq!(
            db.get_setting_or("model_name", "gemini-1.5-flash").unwrap(),
            "gemini-1.5-flash"
        );

        db.set_setting("model_name", "gemini-2.0-flash").unwrap();
        assert_eq!(
            db.get_setting("model_name").unwrap(),
            Some("gemini-2.0-flash".to_string())
        );

        assert!(db.remove_setting("model_name").unwrap());
        assert!(!db.remove_setting("model_name").unwrap());
        assert_eq!(db.get_setting("model_name").unwrap(), None);
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.db");

        {
            let db = ConfigDb::open(&path).unwrap();
            db.set_document("a.pdf", b"/docs/a.pdf\x001").unwrap();
            db.set_setting("api_key", "secret").unwrap();
        }

        {
            let db = ConfigDb::open(&path).unwrap();
            assert_eq!(db.list_documents().unwrap().len(), 1);
            assert_eq!(
                db.get_setting("api_key").unwrap(),
                Some("secret".to_string())
            );
        }
    }
}
