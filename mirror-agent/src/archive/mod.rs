//! Folding a mirror directory into a single `.tar.zst` artifact.
//!
//! Entry paths are relative to the source's parent, so the archive root is
//! the mirror directory's own name. Files and directories carry their
//! modification times.

use crate::fs::walker::{walk_directory, WalkOptions};
use crate::utils::errors::{MirrorError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File extension of produced archives
pub const ARCHIVE_EXTENSION: &str = "tar.zst";

/// Outcome of a successful archive run
#[derive(Debug, Clone)]
pub struct ArchiveStats {
    pub path: PathBuf,

    /// Compressed artifact size in bytes
    pub size: u64,

    /// Number of entries written, including directory markers
    pub entries: usize,
}

#[derive(Debug, Clone)]
pub struct Archiver {
    /// zstd level (1-22)
    level: i32,
}

impl Default for Archiver {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl Archiver {
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    /// Archive `source` into `dest`. On failure the partial `dest` is removed.
    pub fn archive_directory(&self, source: &Path, dest: &Path) -> Result<ArchiveStats> {
        match self.write_archive(source, dest) {
            Ok(entries) => {
                let size = std::fs::metadata(dest)
                    .map_err(|e| MirrorError::Archive(format!("cannot stat archive: {}", e)))?
                    .len();
                debug!(
                    archive = %dest.display(),
                    entries,
                    size,
                    "Archive written"
                );
                Ok(ArchiveStats {
                    path: dest.to_path_buf(),
                    size,
                    entries,
                })
            }
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_file(dest) {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(archive = %dest.display(), error = %cleanup, "Failed to remove partial archive");
                    }
                }
                Err(MirrorError::Archive(e.to_string()))
            }
        }
    }

    fn write_archive(&self, source: &Path, dest: &Path) -> std::io::Result<usize> {
        let root_name = source.file_name().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("source has no directory name: {}", source.display()),
            )
        })?;
        let root = Path::new(root_name);

        if !source.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("source directory missing: {}", source.display()),
            ));
        }

        let file = File::create(dest)?;
        let encoder = zstd::stream::write::Encoder::new(BufWriter::new(file), self.level)?;
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);
        builder.mode(tar::HeaderMode::Complete);

        builder.append_dir(root, source)?;
        let mut entries = 1usize;

        let options = WalkOptions { include_dirs: true };
        for entry in walk_directory(source, &options)? {
            let name = root.join(&entry.relative_path);
            if entry.is_dir {
                builder.append_dir(&name, &entry.path)?;
            } else {
                builder.append_path_with_name(&entry.path, &name)?;
            }
            entries += 1;
        }

        let encoder = builder.into_inner()?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        Ok(entries)
    }
}

/// Archive file name for a mirror directory, e.g. `repo.git` -> `repo.git.tar.zst`.
pub fn archive_file_name(mirror_dir_name: &str) -> String {
    format!("{}.{}", mirror_dir_name, ARCHIVE_EXTENSION)
}
