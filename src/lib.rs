//! wavlink - Batch audio conversion, upload and spreadsheet linking
//!
//! Converts a batch of local audio files with ffmpeg, uploads the results to
//! Google Drive with resumable chunked uploads, and writes hyperlinks to the
//! uploaded files into the matching rows of a Google Sheets document.
//!
//! # Architecture
//!
//! The pipeline runs in two sequential phases:
//! - Conversion: one file at a time, failures recorded per item
//! - Publish: upload every converted file, then reconcile links with the sheet
//!
//! Each phase runs on a background task and reports through a stream of
//! events; the caller folds them into a `PhaseStatus`.
//!
//! # Modules
//!
//! - `adapters`: External system integrations (ffmpeg, Drive, Sheets)
//! - `core`: Pipeline logic (Converter, Publisher, Reconciler, Pipeline)
//! - `domain`: Data structures (SourceItem, UploadResult, SheetRow, Event)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Convert a folder of WAV files
//! wavlink convert ~/Recordings --output ./out
//!
//! # Upload and link in the configured spreadsheet
//! wavlink publish ./out --folder <folder-id> --spreadsheet <spreadsheet-id>
//!
//! # Both in one go
//! wavlink run ~/Recordings --output ./out
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{Pipeline, PipelineError};
pub use domain::{ConversionResult, Event, EventKind, PhaseStatus, SourceItem, UploadResult};
