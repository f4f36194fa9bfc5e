//! Configuration management for the mirror agent.
//!
//! Loads configuration from TOML file with environment variable overrides.
//! Secrets (the clone token and webhook URL) normally arrive through the
//! environment and are never written back out.

use crate::utils::errors::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub clone: CloneConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Line-oriented list of repository URLs
    #[serde(default = "default_repositories_file")]
    pub repositories_file: PathBuf,

    /// Root of the dated backup tree
    #[serde(default = "default_backups_dir")]
    pub backups_dir: PathBuf,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token injected into clone URLs
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneConfig {
    /// Upper bound for a single clone attempt
    #[serde(default = "default_clone_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before attempt `n + 1` is `n * backoff_step_secs`
    #[serde(default = "default_backoff_step_secs")]
    pub backoff_step_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Dated backups kept per repository
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default, skip_serializing)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,

    /// Notifications closer together than this are dropped
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
}

impl std::fmt::Debug for NotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyConfig")
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("min_interval_secs", &self.min_interval_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Commit and push the backups tree after the run
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Working copy that holds the backups tree
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default = "default_author_name")]
    pub author_name: String,

    #[serde(default = "default_author_email")]
    pub author_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_repositories_file() -> PathBuf {
    PathBuf::from("repositories.txt")
}

fn default_backups_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_clone_timeout_secs() -> u64 {
    600 // 10 minutes
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_step_secs() -> u64 {
    1
}

fn default_max_backups() -> usize {
    5
}

fn default_notify_timeout_secs() -> u64 {
    30
}

fn default_min_interval_secs() -> u64 {
    5
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_author_name() -> String {
    "Backup Bot".to_string()
}

fn default_author_email() -> String {
    "backup-bot@localhost".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            repositories_file: default_repositories_file(),
            backups_dir: default_backups_dir(),
        }
    }
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_clone_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_step_secs: default_backoff_step_secs(),
        }
    }
}

impl CloneConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_backups: default_max_backups(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_notify_timeout_secs(),
            min_interval_secs: default_min_interval_secs(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remote: default_remote(),
            branch: default_branch(),
            work_dir: default_work_dir(),
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            paths: PathsConfig::default(),
            auth: AuthConfig::default(),
            clone: CloneConfig::default(),
            retention: RetentionConfig::default(),
            notify: NotifyConfig::default(),
            publish: PublishConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// File (if given) plus environment. A file that cannot be read or
    /// parsed is a pre-flight error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path).map_err(|e| {
                MirrorError::Config(format!("failed to load {}: {}", path.display(), e))
            })?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Overlay values from the process environment (and `.env`, if present).
    pub fn apply_env(&mut self) {
        let _ = dotenvy::dotenv();
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("BACKUP_TOKEN") {
            self.auth.token = Some(token);
        }
        if let Some(url) = non_empty("WEBHOOK_URL") {
            self.notify.webhook_url = Some(url);
        }
        if let Some(path) = non_empty("REPOSITORIES_FILE") {
            self.paths.repositories_file = PathBuf::from(path);
        }
        if let Some(path) = non_empty("BACKUPS_DIR") {
            self.paths.backups_dir = PathBuf::from(path);
        }
        if let Some(level) = non_empty("LOG_LEVEL") {
            self.log.level = level;
        }
    }

    /// Pre-flight checks. Any failure here aborts the run before a single
    /// repository is touched.
    pub fn validate(&self) -> Result<()> {
        match self.auth.token.as_deref() {
            Some(token) if !token.trim().is_empty() => {}
            _ => {
                return Err(MirrorError::Config(
                    "BACKUP_TOKEN environment variable is required".to_string(),
                ))
            }
        }

        if !self.paths.repositories_file.is_file() {
            return Err(MirrorError::Config(format!(
                "repository list not found: {}",
                self.paths.repositories_file.display()
            )));
        }

        if self.clone.max_attempts == 0 {
            return Err(MirrorError::Config(
                "clone.max_attempts must be at least 1".to_string(),
            ));
        }

        // Zero would prune the archive this run just wrote
        if self.retention.max_backups == 0 {
            return Err(MirrorError::Config(
                "retention.max_backups must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// The validated token. Call after [`Config::validate`].
    pub fn token(&self) -> Result<&str> {
        self.auth
            .token
            .as_deref()
            .ok_or_else(|| MirrorError::Config("BACKUP_TOKEN is not set".to_string()))
    }
}
