//! Core pipeline logic.
//!
//! This module contains:
//! - Converter: sequential batch conversion
//! - ChunkedUploader / Publisher: resumable uploads and aggregate progress
//! - Reconciler: matching uploads against document rows
//! - Pipeline: background phase workers and their event streams

pub mod converter;
pub mod decision;
pub mod error;
pub mod pipeline;
pub mod publisher;
pub mod reconciler;
pub mod sources;
pub mod uploader;

// Re-export commonly used types
pub use converter::{ConversionEvent, Converter};
pub use decision::{ChannelDecider, DecisionRequest, FixedDecision, UnmatchedDecider};
pub use error::PipelineError;
pub use pipeline::{validate_publish, PhaseHandle, Pipeline, PublishSummary};
pub use publisher::{aggregate, Publisher, UploadEvent};
pub use reconciler::{next_append_row, plan, ReconcileEvent, ReconcileReport, Reconciler};
pub use sources::collect_sources;
pub use uploader::{ChunkedUploader, UploadProgress, DEFAULT_CHUNK_SIZE};
