//! Pipeline error taxonomy.
//!
//! Per-item failures (`Transcode`, `Upload`) are recorded in the item's result
//! and never escape a batch loop. `DocumentWrite` aborts the rest of a
//! reconciliation pass. `Configuration` is raised before a worker starts.
//! `Worker` means the background task itself died (panic or cancellation).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Failed to convert {file}: {diagnostic}")]
    Transcode { file: PathBuf, diagnostic: String },

    #[error("Failed to upload {file}: {reason}")]
    Upload { file: PathBuf, reason: String },

    #[error("Failed to update document {document} ({target}): {reason}")]
    DocumentWrite {
        document: String,
        target: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Phase worker stopped unexpectedly: {0}")]
    Worker(String),
}

impl PipelineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Wrap an adapter error, keeping its whole context chain
    pub fn document_write(
        document: impl Into<String>,
        target: impl Into<String>,
        error: &anyhow::Error,
    ) -> Self {
        Self::DocumentWrite {
            document: document.into(),
            target: target.into(),
            reason: format!("{:#}", error),
        }
    }
}
