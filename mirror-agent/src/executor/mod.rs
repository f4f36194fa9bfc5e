//! Per-repository backup pipeline.
//!
//! For one repository and run date:
//! - recreate `backups/<repo>/<date>/` from scratch
//! - clone a mirror into it (timeout + retries)
//! - scrub the token from the mirror's config (best-effort)
//! - measure the mirror (best-effort)
//! - archive it, then delete the uncompressed mirror
//!
//! Any failure is captured in the returned [`BackupOutcome`]; nothing here
//! aborts the run.

pub mod clone;
pub mod retry;

use crate::archive::{archive_file_name, Archiver};
use crate::fs::remove_dir_if_exists;
use crate::fs::size::SizeProbe;
use crate::repos::credentials::{authenticated_url, scrub_credentials};
use crate::repos::RepositoryDescriptor;
use crate::report::{BackupOutcome, FailureStage};
use crate::utils::format::{format_bytes, format_duration};
use chrono::{NaiveDate, Utc};
use clone::CloneExecutor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs the backup pipeline for one repository at a time.
pub struct BackupExecutor {
    cloner: CloneExecutor,
    archiver: Archiver,
    size_probe: Arc<dyn SizeProbe>,
    backups_root: PathBuf,
    token: String,
}

impl BackupExecutor {
    pub fn new(
        cloner: CloneExecutor,
        archiver: Archiver,
        size_probe: Arc<dyn SizeProbe>,
        backups_root: PathBuf,
        token: String,
    ) -> Self {
        Self {
            cloner,
            archiver,
            size_probe,
            backups_root,
            token,
        }
    }

    pub fn backups_root(&self) -> &Path {
        &self.backups_root
    }

    /// `backups/<repo>/<YYYY-MM-DD>`
    pub fn dated_dir(&self, repo: &RepositoryDescriptor, run_date: NaiveDate) -> PathBuf {
        self.backups_root
            .join(&repo.name)
            .join(run_date.format("%Y-%m-%d").to_string())
    }

    /// Back up one repository. Never fails; failures land in the outcome.
    pub async fn backup(&self, repo: &RepositoryDescriptor, run_date: NaiveDate) -> BackupOutcome {
        let started_at = Utc::now();
        let start = Instant::now();
        let dated_dir = self.dated_dir(repo, run_date);

        info!(repo = %repo.name, "Starting backup");

        // Pending -> fresh dated directory
        if let Err(e) = prepare_dated_dir(&dated_dir) {
            error!(repo = %repo.name, error = %e, "Failed to prepare backup directory");
            return BackupOutcome::failure(
                repo.clone(),
                FailureStage::Prepare,
                format!("failed to create backup directory: {}", e),
                0,
                started_at,
                start.elapsed(),
            );
        }

        let auth_url = match authenticated_url(&repo.source_url, &self.token) {
            Ok(url) => url,
            Err(e) => {
                self.discard(&dated_dir, &repo.name);
                return BackupOutcome::failure(
                    repo.clone(),
                    FailureStage::Prepare,
                    e.to_string(),
                    0,
                    started_at,
                    start.elapsed(),
                );
            }
        };

        // Cloning
        let mirror_dir = dated_dir.join(format!("{}.git", repo.name));
        if let Err(e) = self
            .cloner
            .clone_with_retry(&repo.name, &auth_url, &mirror_dir, &self.token)
            .await
        {
            error!(repo = %repo.name, error = %e, "Clone failed");
            self.discard(&dated_dir, &repo.name);
            return BackupOutcome::failure(
                repo.clone(),
                FailureStage::Clone,
                e.to_string(),
                0,
                started_at,
                start.elapsed(),
            );
        }

        // Sanitizing (best-effort)
        match scrub_credentials(&mirror_dir, &self.token) {
            Ok(removed) => debug!(repo = %repo.name, removed, "Credentials scrubbed from mirror config"),
            Err(e) => warn!(
                repo = %repo.name,
                error = %e,
                "Could not scrub credentials from mirror config; archive may contain the token"
            ),
        }

        // SizingOriginal (best-effort)
        let size = {
            let probe = Arc::clone(&self.size_probe);
            let path = mirror_dir.clone();
            match tokio::task::spawn_blocking(move || probe.measure(&path)).await {
                Ok(Ok(size)) => size,
                Ok(Err(e)) => {
                    warn!(repo = %repo.name, error = %e, "Failed to get directory size");
                    0
                }
                Err(e) => {
                    warn!(repo = %repo.name, error = %e, "Size task failed");
                    0
                }
            }
        };

        // Archiving
        let archive_path = dated_dir.join(archive_file_name(&format!("{}.git", repo.name)));
        let archived = {
            let archiver = self.archiver.clone();
            let source = mirror_dir.clone();
            let dest = archive_path.clone();
            tokio::task::spawn_blocking(move || archiver.archive_directory(&source, &dest))
                .await
                .map_err(|e| e.to_string())
                .and_then(|r| r.map_err(|e| e.to_string()))
        };

        let archive_size = match archived {
            Ok(stats) => stats.size,
            Err(e) => {
                error!(repo = %repo.name, error = %e, "Archive creation failed");
                self.discard(&dated_dir, &repo.name);
                return BackupOutcome::failure(
                    repo.clone(),
                    FailureStage::Archive,
                    e,
                    size,
                    started_at,
                    start.elapsed(),
                );
            }
        };

        // Cleanup: only the archive persists
        if let Err(e) = remove_dir_if_exists(&mirror_dir) {
            warn!(repo = %repo.name, error = %e, "Failed to remove uncompressed mirror");
        }

        let elapsed = start.elapsed();
        info!(
            repo = %repo.name,
            size = %format_bytes(size),
            archive_size = %format_bytes(archive_size),
            duration = %format_duration(elapsed),
            "Backed up repository"
        );

        BackupOutcome::success(repo.clone(), size, archive_size, started_at, elapsed)
    }

    /// Drop everything written for a failed repository today.
    fn discard(&self, dated_dir: &Path, repo: &str) {
        if let Err(e) = remove_dir_if_exists(dated_dir) {
            warn!(repo, dir = %dated_dir.display(), error = %e, "Failed to remove incomplete backup directory");
        }
    }
}

/// Delete any same-date directory left by an earlier run, then recreate it.
fn prepare_dated_dir(dir: &Path) -> std::io::Result<()> {
    remove_dir_if_exists(dir)?;
    std::fs::create_dir_all(dir)
}
