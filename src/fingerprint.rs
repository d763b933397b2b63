use std::path::Path;

use sha2::{Digest, Sha256};

/// A cache key derived from the set of enabled document file names.
///
/// Only file names take part: the directory a document lives in and its
/// contents do not. Editing a PDF in place without renaming it keeps the
/// fingerprint, and with it any cached index, unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a document set.
    ///
    /// Order and duplicates in `paths` do not matter.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdfchat::Fingerprint;
    ///
    /// let a = Fingerprint::of(&["/x/A.pdf", "/y/B.pdf"]);
    /// let b = Fingerprint::of(&["B.pdf", "A.pdf"]);
    /// assert_eq!(a, b);
    /// assert_eq!(a.as_str().len(), 64);
    /// ```
    pub fn of<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut names: Vec<String> = paths
            .iter()
            .map(|p| {
                let p = p.as_ref();
                p.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| p.to_string_lossy().to_string())
            })
            .collect();
        names.sort();
        names.dedup();

        // NUL cannot occur in a file name, so {"ab","c"} and {"a","bc"}
        // never collide.
        let mut hasher = Sha256::new();
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                hasher.update([0u8]);
            }
            hasher.update(name.as_bytes());
        }

        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first few hex digits, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
