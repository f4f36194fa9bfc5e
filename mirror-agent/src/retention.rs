//! Retention of dated backup directories.
//!
//! Each repository owns `backups/<repo>/<YYYY-MM-DD>/`. Only directories whose
//! name is exactly a date are considered; anything else under a repository
//! root is left alone. Deletion is permanent.

use crate::report::render::SUMMARY_DIR;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of pruning one repository root
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionReport {
    pub kept: Vec<String>,
    pub removed: Vec<String>,
    /// Directories that matched but could not be deleted
    pub failed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RetentionEnforcer {
    max_backups: usize,
}

impl RetentionEnforcer {
    pub fn new(max_backups: usize) -> Self {
        Self { max_backups }
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    /// Prune every repository directory directly under `backups_root`.
    ///
    /// The summary directory is not a repository and is skipped; the
    /// orchestrator prunes it once the run's report is written. Errors for one repository are logged and do not stop the others.
    pub fn enforce_all(&self, backups_root: &Path) -> Vec<(String, RetentionReport)> {
        let entries = match std::fs::read_dir(backups_root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %backups_root.display(), error = %e, "Cannot enumerate backups root for retention");
                return Vec::new();
            }
        };

        let mut repo_dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter(|e| e.file_name() != SUMMARY_DIR)
            .map(|e| e.path())
            .collect();
        repo_dirs.sort();

        let mut reports = Vec::with_capacity(repo_dirs.len());
        for dir in repo_dirs {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            match self.enforce(&dir) {
                Ok(report) => reports.push((name, report)),
                Err(e) => {
                    warn!(repo = %name, error = %e, "Retention skipped for repository");
                }
            }
        }

        reports
    }

    /// Keep the `max_backups` newest dated directories under `repo_root`.
    pub fn enforce(&self, repo_root: &Path) -> std::io::Result<RetentionReport> {
        let mut dated: Vec<String> = std::fs::read_dir(repo_root)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| is_date_dir_name(name))
            .collect();

        // Lexicographic order is chronological for YYYY-MM-DD
        dated.sort();

        let excess = dated.len().saturating_sub(self.max_backups);
        let keep = dated.split_off(excess);

        let mut report = RetentionReport {
            kept: keep,
            ..Default::default()
        };

        for name in dated {
            let path = repo_root.join(&name);
            match std::fs::remove_dir_all(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "Removed old backup");
                    report.removed.push(name);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove old backup");
                    report.failed.push(name);
                }
            }
        }

        if !report.removed.is_empty() {
            info!(
                dir = %repo_root.display(),
                kept = report.kept.len(),
                removed = report.removed.len(),
                "Cleaned up repository backups"
            );
        }

        Ok(report)
    }
}

/// `YYYY-MM-DD`: digits and hyphens in exactly those positions.
pub fn is_date_dir_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Count archive files anywhere under `backups_root`.
pub fn count_archives(backups_root: &Path, extension: &str) -> usize {
    let suffix = format!(".{}", extension);
    walkdir::WalkDir::new(backups_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().ends_with(&suffix))
        .count()
}
