//! Adapter interfaces for external systems.
//!
//! The core only talks to the outside world through these traits:
//! - `Transcoder`: converts one audio file (ffmpeg)
//! - `RemoteStorage`: resumable chunked uploads (Google Drive)
//! - `SheetClient`: reads and writes cell ranges (Google Sheets)

pub mod drive;
pub mod ffmpeg;
pub mod sheets;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::RemoteFile;

// Re-export the concrete adapters
pub use drive::DriveClient;
pub use ffmpeg::FfmpegTranscoder;
pub use sheets::SheetsClient;

/// Fixed encoding profile handed to the transcoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingProfile {
    /// Audio codec (e.g. `libmp3lame`)
    pub codec: String,

    /// Variable-bitrate quality, 0 (best) to 9
    pub vbr_quality: u8,

    /// Extension of produced files, without the dot
    pub extension: String,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            codec: "libmp3lame".to_string(),
            vbr_quality: 0,
            extension: "mp3".to_string(),
        }
    }
}

impl EncodingProfile {
    /// MIME type of produced files
    pub fn mime_type(&self) -> &'static str {
        match self.extension.to_ascii_lowercase().as_str() {
            "mp3" => "audio/mpeg",
            "ogg" | "oga" => "audio/ogg",
            "opus" => "audio/opus",
            "m4a" | "aac" => "audio/mp4",
            "flac" => "audio/flac",
            "wav" => "audio/wav",
            _ => "application/octet-stream",
        }
    }
}

/// Exit status and diagnostic stream of one transcoder run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutput {
    pub exit_code: i32,
    pub diagnostic: String,
}

impl TranscodeOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// External audio transcoder
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Human-readable transcoder name
    fn name(&self) -> &str;

    /// Convert `input` into `output`, overwriting any existing file.
    ///
    /// A non-zero exit is reported through `TranscodeOutput`; `Err` means the
    /// transcoder could not be run at all.
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncodingProfile,
    ) -> Result<TranscodeOutput>;

    /// Check that the transcoder is installed and runnable
    async fn health_check(&self) -> Result<()>;
}

/// An open resumable upload
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// Session URI (or any opaque handle) returned by the service
    pub uri: String,

    /// Remote file name
    pub name: String,

    pub total_bytes: u64,

    /// Set by the storage client once the service reports completion
    pub completed: Option<RemoteFile>,
}

/// Acknowledgement of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAck {
    /// The service has the whole file
    pub done: bool,

    /// Bytes the service has persisted so far
    pub bytes_acked: u64,
}

/// Remote object store with resumable uploads
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Open a resumable upload of `total_bytes` named `name` inside `parent_folder_id`
    async fn create_resumable_upload(
        &self,
        name: &str,
        parent_folder_id: &str,
        total_bytes: u64,
        mime_type: &str,
    ) -> Result<UploadSession>;

    /// Send `bytes` starting at `offset`
    async fn send_chunk(
        &self,
        session: &mut UploadSession,
        offset: u64,
        bytes: Vec<u8>,
    ) -> Result<ChunkAck>;

    /// Close a completed session and return the stored file
    async fn finalize(&self, session: UploadSession) -> Result<RemoteFile>;
}

/// How cell values come back from a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRender {
    /// The text the document displays
    Formatted,
    /// The stored formula, or the raw value for plain cells
    Formula,
}

/// Tabular document addressed with A1 notation
#[async_trait]
pub trait SheetClient: Send + Sync {
    /// Read a range as rows of cell text (trailing empty cells/rows may be omitted)
    async fn read_range(
        &self,
        document_id: &str,
        range: &str,
        render: ValueRender,
    ) -> Result<Vec<Vec<String>>>;

    /// Write a single cell
    async fn write_cell(&self, document_id: &str, cell: &str, value: &str) -> Result<()>;

    /// Write rows starting at the `start` cell
    async fn write_range(&self, document_id: &str, start: &str, rows: &[Vec<String>])
        -> Result<()>;
}

/// A named remote object (folder, spreadsheet)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedItem {
    pub id: String,
    pub name: String,
}
