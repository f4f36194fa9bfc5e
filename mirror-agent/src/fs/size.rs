//! Directory size measurement.
//!
//! Two measurements are available: a native walk (always works) and the external
//! `du` tool (faster on large mirrors). [`detect_size_probe`] picks one at
//! startup based on what the host provides.

use super::find_in_path;
use super::walker::calculate_total_size;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Measures the total byte size of a directory tree.
pub trait SizeProbe: Send + Sync {
    fn name(&self) -> &'static str;

    fn measure(&self, path: &Path) -> std::io::Result<u64>;
}

/// Sums regular file sizes via a directory walk.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkSizeProbe;

impl SizeProbe for WalkSizeProbe {
    fn name(&self) -> &'static str {
        "walk"
    }

    fn measure(&self, path: &Path) -> std::io::Result<u64> {
        calculate_total_size(path)
    }
}

/// Runs `du -sb` and parses its first field, falling back to a walk when
/// the tool fails or prints something unexpected.
#[derive(Debug, Clone)]
pub struct DuSizeProbe {
    program: PathBuf,
}

impl DuSizeProbe {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    fn run_du(&self, path: &Path) -> std::io::Result<u64> {
        let output = Command::new(&self.program).arg("-sb").arg(path).output()?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "du exited with {}",
                output.status
            )));
        }

        parse_du_output(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "unparseable du output")
        })
    }
}

impl SizeProbe for DuSizeProbe {
    fn name(&self) -> &'static str {
        "du"
    }

    fn measure(&self, path: &Path) -> std::io::Result<u64> {
        match self.run_du(path) {
            Ok(size) => Ok(size),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "du failed, walking instead");
                WalkSizeProbe.measure(path)
            }
        }
    }
}

/// Parse `"123456\t/path/to/dir"`.
fn parse_du_output(output: &str) -> Option<u64> {
    output.split_whitespace().next()?.parse().ok()
}

/// Prefer `du` when it is on `PATH`, otherwise walk.
pub fn detect_size_probe() -> Box<dyn SizeProbe> {
    match find_in_path("du") {
        Some(program) => Box::new(DuSizeProbe::new(program)),
        None => {
            warn!("du command not found, using directory walk for size calculation");
            Box::new(WalkSizeProbe)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_du_output() {
        assert_eq!(parse_du_output("123456\t/tmp/x\n"), Some(123456));
        assert_eq!(parse_du_output(""), None);
        assert_eq!(parse_du_output("du: cannot access"), None);
    }

    #[test]
    fn test_walk_size() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("HEAD"), b"ref: refs/heads/main\n")?;

        assert_eq!(WalkSizeProbe.measure(temp_dir.path())?, 21);
        Ok(())
    }

    #[test]
    fn test_du_size_falls_back_when_tool_missing() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("data"), b"0123456789")?;

        let probe = DuSizeProbe::new(PathBuf::from("/nonexistent/bin/du"));
        assert_eq!(probe.measure(temp_dir.path())?, 10);
        Ok(())
    }
}
