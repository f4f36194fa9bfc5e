//! Mirror cloning through the external version-control client.

use super::retry::RetryPolicy;
use crate::fs::{find_in_path, remove_dir_if_exists};
use crate::repos::credentials::redact;
use crate::utils::errors::{MirrorError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// The version-control client, reduced to the one operation the backup needs.
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Write a full mirror of `url` to `dest`. `dest` does not exist on entry.
    ///
    /// Implementations must stop their work when the returned future is
    /// dropped; that is how the clone timeout is enforced.
    async fn clone_mirror(&self, url: &str, dest: &Path) -> Result<()>;
}

/// `git clone --mirror`
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl GitCli {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// Locate `git` on `PATH`. Its absence is a pre-flight error.
    pub fn detect() -> Result<Self> {
        find_in_path("git").map(Self::new).ok_or_else(|| {
            MirrorError::Config("git command is required but not found".to_string())
        })
    }
}

#[async_trait]
impl VcsClient for GitCli {
    async fn clone_mirror(&self, url: &str, dest: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("clone")
            .arg("--mirror")
            .arg("--quiet")
            .arg(url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| MirrorError::Clone(format!("failed to spawn git: {}", e)))?;

        // kill_on_drop: an abandoned clone does not outlive its timeout
        let output = child.wait_with_output().await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .unwrap_or("no output");
        Err(MirrorError::Clone(format!(
            "git exited with code {}: {}",
            output.status.code().unwrap_or(-1),
            detail
        )))
    }
}

/// Clone with a per-attempt timeout and a bounded retry budget.
#[derive(Clone)]
pub struct CloneExecutor {
    client: Arc<dyn VcsClient>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl CloneExecutor {
    pub fn new(client: Arc<dyn VcsClient>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            client,
            policy,
            timeout,
        }
    }

    /// Mirror `url` into `dest`, retrying from a clean directory each time.
    ///
    /// `secret` is masked out of any error text. On total failure `dest` is
    /// removed so no partial mirror is left behind.
    pub async fn clone_with_retry(&self, repo: &str, url: &str, dest: &Path, secret: &str) -> Result<u32> {
        let result = self
            .policy
            .run(|attempt| {
                let client = Arc::clone(&self.client);
                let limit = self.timeout;
                async move {
                    remove_dir_if_exists(dest)?;
                    debug!(repo, attempt, "Cloning");
                    let outcome = match timeout(limit, client.clone_mirror(url, dest)).await {
                        Ok(result) => result,
                        Err(_) => Err(MirrorError::Clone(format!(
                            "timed out after {} seconds",
                            limit.as_secs_f64()
                        ))),
                    };
                    outcome
                        .map(|()| attempt)
                        .map_err(|e| MirrorError::Clone(redact(&clone_error_text(e), secret)))
                }
            })
            .await;

        match result {
            Ok(attempts) => {
                if attempts > 1 {
                    info!(repo, attempts, "Clone succeeded after retry");
                }
                Ok(attempts)
            }
            Err(e) => {
                if let Err(cleanup) = remove_dir_if_exists(dest) {
                    warn!(repo, error = %cleanup, "Failed to remove partial mirror");
                }
                Err(e)
            }
        }
    }
}

fn clone_error_text(e: MirrorError) -> String {
    match e {
        MirrorError::Clone(msg) => msg,
        other => other.to_string(),
    }
}
