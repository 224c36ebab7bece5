//! Error types for the evaluation engine

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced while setting up an engine.
///
/// Once running, the pipeline has no error channel: unreadable files
/// degrade to empty text and user code failures live inside evaluation
/// outputs.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The filesystem watcher could not be installed.
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Result type using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;
