use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::constants::app::STRUCTURE_FILE_EXTENSIONS;
use crate::errors::DedupError;

/// Structure files reachable from `root`, in sorted path order.
///
/// A file path is returned as-is regardless of extension. A directory is
/// walked recursively and only files with a known structure extension are
/// kept.
pub fn discover_structure_files(root: &Path) -> Result<Vec<PathBuf>, DedupError> {
    discover_files(root, false)
}

/// Like [`discover_structure_files`], optionally following symlinks.
pub fn discover_files(root: &Path, follow_links: bool) -> Result<Vec<PathBuf>, DedupError> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.is_dir() {
        return Err(DedupError::Configuration(format!(
            "input path '{}' does not exist",
            root.display()
        )));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(follow_links)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(
                    "[soap-dedup] skipping unreadable path under {}: {err}",
                    root.display()
                );
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_structure_file(path))
        .collect();
    files.sort();
    Ok(files)
}

/// True when `path` has a known structure extension, ignoring case.
pub fn is_structure_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            STRUCTURE_FILE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}
