use std::path::{Path, PathBuf};

use crate::error::Result;

/// Supported file extensions for document discovery.
const SUPPORTED_EXTENSIONS: &[&str] = &["pdf"];

/// Resolve a user-supplied path into the PDF files it names.
///
/// A file path is returned as-is (canonicalized) when it has a supported
/// extension. A directory is walked recursively, skipping hidden entries.
/// Results are sorted for stable registration order.
pub fn discover_pdfs(path: &Path) -> Result<Vec<PathBuf>> {
    let canonical = path.canonicalize()?;

    if canonical.is_file() {
        return Ok(if is_supported(&canonical) {
            vec![canonical]
        } else {
            Vec::new()
        });
    }

    let mut results = Vec::new();
    walk_dir(&canonical, &canonical, &mut results)?;
    results.sort();
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    results: &mut Vec<PathBuf>,
) -> Result<()> {
    let entries = std::fs::read_dir(current)?;

    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        // Skip hidden files and directories.
        if name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            walk_dir(root, &entry.path(), results)?;
        } else if file_type.is_symlink() {
            let resolved = match entry.path().canonicalize() {
                Ok(p) => p,
                Err(_) => continue, // Skip broken symlinks
            };
            // Directory symlinks back into the tree would loop forever.
            if resolved.starts_with(root) && resolved.is_dir() {
                continue;
            }
            if resolved.is_file() && is_supported(&resolved) {
                results.push(resolved);
            }
        } else if file_type.is_file() && is_supported(&entry.path()) {
            results.push(entry.path().canonicalize()?);
        }
    }

    Ok(())
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}
