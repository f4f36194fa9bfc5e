//! Mirror Agent Library
//!
//! Scheduled mirroring of source-control repositories into dated,
//! compressed archives with bounded retention and webhook notification.

pub mod archive;
pub mod config;
pub mod executor;
pub mod fs;
pub mod notify;
pub mod orchestrator;
pub mod publish;
pub mod report;
pub mod repos;
pub mod retention;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use orchestrator::{run_and_notify, Orchestrator, RunResult};
pub use utils::errors::MirrorError;
pub type Result<T> = std::result::Result<T, MirrorError>;
