//! Utility modules for the mirror agent.

pub mod errors;
pub mod format;
pub mod logger;

pub use errors::{MirrorError, Result};
