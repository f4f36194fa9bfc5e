//! Custom error types for the mirror agent.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    /// Pre-flight failure: missing token, missing/empty/malformed repository list.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Clone failed: {0}")]
    Clone(String),

    #[error("Archive creation failed: {0}")]
    Archive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publish error: {0}")]
    Publish(String),
}

impl MirrorError {
    /// True for errors that must stop a run before any repository is touched.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MirrorError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
