//! Deterministic directory traversal.
//!
//! Entries come back in a stable order (depth-first, siblings sorted by
//! name) so that archiving the same tree twice produces the same entry
//! sequence.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Include directory entries (needed for archive directory markers)
    pub include_dirs: bool,
}

/// Information about an entry discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the entry
    pub path: PathBuf,

    /// Relative path from the walk root
    pub relative_path: PathBuf,

    /// File size in bytes (0 for directories)
    pub size: u64,

    pub is_dir: bool,
}

impl FileInfo {
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Self> {
        let metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let is_dir = metadata.is_dir();

        Ok(Self {
            path,
            relative_path,
            size: if is_dir { 0 } else { metadata.len() },
            is_dir,
        })
    }
}

/// Walk a directory tree and collect all entries below `root`.
///
/// The root itself is not returned. Symlinks are reported, not followed.
pub fn walk_directory(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut entries = Vec::new();
    walk_directory_with_callback(root, options, |info| entries.push(info.clone()))?;
    Ok(entries)
}

/// Walk a directory tree with a callback for each entry
pub fn walk_directory_with_callback<F>(
    root: &Path,
    options: &WalkOptions,
    mut callback: F,
) -> std::io::Result<()>
where
    F: FnMut(&FileInfo),
{
    let walker = WalkDir::new(root).min_depth(1).sort_by_file_name();

    for entry in walker {
        let entry = entry?;

        if entry.file_type().is_dir() && !options.include_dirs {
            continue;
        }

        callback(&FileInfo::from_entry(&entry, root)?);
    }

    Ok(())
}

/// Calculate total size of all regular files under `root`
pub fn calculate_total_size(root: &Path) -> std::io::Result<u64> {
    let mut total_size = 0u64;

    walk_directory_with_callback(root, &WalkOptions::default(), |file| {
        if !file.is_dir {
            total_size += file.size;
        }
    })?;

    Ok(total_size)
}
