use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The PDFCHAT_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/pdfchat/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var("PDFCHAT_DATA_DIR") {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("pdfchat")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_db(&self) -> PathBuf {
        self.root.join("config.redb")
    }

    /// Index cache directory for one embedder. Vectors from different
    /// embedders live in different spaces, so each gets its own partition.
    pub fn cache_dir(&self, embedder: &str) -> Result<PathBuf> {
        self.ensure(self.root.join("cache").join(embedder))
    }

    pub fn chats_dir(&self) -> Result<PathBuf> {
        self.ensure(self.root.join("chats"))
    }

    fn ensure(&self, path: PathBuf) -> Result<PathBuf> {
        std::fs::create_dir_all(&path)
            .map_err(|_| Error::DataDir(path.clone()))?;
        Ok(path)
    }
}
