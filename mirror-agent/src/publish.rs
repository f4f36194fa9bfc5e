//! Optional commit-and-push of the backups tree.
//!
//! Used when the backups live inside a working copy that is itself the
//! off-site copy (a CI job pushing to its own repository).

use crate::config::PublishConfig;
use crate::fs::find_in_path;
use crate::utils::errors::{MirrorError, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishResult {
    Committed,
    NoChanges,
}

pub struct Publisher {
    program: PathBuf,
    config: PublishConfig,
}

impl Publisher {
    pub fn new(program: PathBuf, config: PublishConfig) -> Self {
        Self { program, config }
    }

    pub fn detect(config: PublishConfig) -> Result<Self> {
        let program = find_in_path("git")
            .ok_or_else(|| MirrorError::Publish("git command not found".to_string()))?;
        Ok(Self::new(program, config))
    }

    pub fn commit_message(run_date: NaiveDate) -> String {
        format!("Daily mirror backup - {}", run_date.format("%Y-%m-%d"))
    }

    /// Stage everything under `backups_dir`, commit, and push.
    pub async fn publish(&self, backups_dir: &Path, run_date: NaiveDate) -> Result<PublishResult> {
        let status = self
            .git(&["status", "--porcelain", "--"], Some(backups_dir))
            .await?;
        if String::from_utf8_lossy(&status.stdout).trim().is_empty() {
            info!("No changes to commit");
            return Ok(PublishResult::NoChanges);
        }

        self.git(&["add", "--all", "--"], Some(backups_dir)).await?;

        // Exit code 0 means nothing is staged
        let staged = self
            .git_status(&["diff", "--staged", "--quiet", "--"], Some(backups_dir))
            .await?;
        if staged {
            info!("No changes to commit after adding");
            return Ok(PublishResult::NoChanges);
        }

        let name = format!("user.name={}", self.config.author_name);
        let email = format!("user.email={}", self.config.author_email);
        let message = Self::commit_message(run_date);
        self.git(
            &["-c", &name, "-c", &email, "commit", "--quiet", "-m", &message],
            None,
        )
        .await?;

        let refspec = format!("HEAD:{}", self.config.branch);
        self.git_quiet(&["push", "--quiet", &self.config.remote, &refspec])
            .await?;

        info!(remote = %self.config.remote, branch = %self.config.branch, "Changes committed and pushed");
        Ok(PublishResult::Committed)
    }

    fn command(&self, args: &[&str], pathspec: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .current_dir(&self.config.work_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(path) = pathspec {
            cmd.arg(path);
        }
        cmd
    }

    async fn git(&self, args: &[&str], pathspec: Option<&Path>) -> Result<Output> {
        debug!(command = %args.first().copied().unwrap_or_default(), "Running git");
        let output = self
            .command(args, pathspec)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MirrorError::Publish(format!(
                "git {} failed: {}",
                args.iter().find(|a| !a.starts_with('-') && !a.contains('=')).unwrap_or(&"?"),
                stderr.trim()
            )));
        }
        Ok(output)
    }

    /// Run and report only whether the exit code was zero.
    async fn git_status(&self, args: &[&str], pathspec: Option<&Path>) -> Result<bool> {
        let status = self
            .command(args, pathspec)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        Ok(status.success())
    }

    /// Output is discarded: the remote URL may carry credentials.
    async fn git_quiet(&self, args: &[&str]) -> Result<()> {
        let status = self
            .command(args, None)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(MirrorError::Publish(format!(
                "git {} exited with code {}",
                args.first().copied().unwrap_or_default(),
                status.code().unwrap_or(-1)
            )));
        }
        Ok(())
    }
}
