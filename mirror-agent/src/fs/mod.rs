//! File system helpers: traversal, size probes and host tool lookup.

pub mod size;
pub mod walker;

use std::path::{Path, PathBuf};

/// Find an executable named `program` on `PATH`.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

/// Remove a directory tree if it exists.
pub fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remove_dir_if_exists() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let target = temp_dir.path().join("a/b");
        std::fs::create_dir_all(&target)?;

        remove_dir_if_exists(&temp_dir.path().join("a"))?;
        assert!(!temp_dir.path().join("a").exists());

        // Second removal is a no-op
        remove_dir_if_exists(&temp_dir.path().join("a"))?;
        Ok(())
    }

    #[test]
    fn test_find_in_path_missing_program() {
        assert!(find_in_path("definitely-not-a-real-program-7f3a").is_none());
    }
}
