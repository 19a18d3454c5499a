//! Domain types for wavlink.
//!
//! This module contains the core data structures:
//! - Artifact: sources, conversion results, upload results
//! - Sheet: row snapshots, match decisions, A1 references
//! - Events / Phase: progress reporting from workers to the caller

pub mod artifact;
pub mod events;
pub mod phase;
pub mod sheet;

// Re-export commonly used types
pub use artifact::{
    ConversionOutcome, ConversionResult, RemoteFile, SourceItem, UploadOutcome, UploadResult,
};
pub use events::{Event, EventKind, Phase};
pub use phase::{PhaseState, PhaseStatus};
pub use sheet::{
    hyperlink_formula, join_columns, snapshot_rows, MatchDecision, PendingAppendBatch, SheetRow,
    SheetTarget,
};
