//! Resumable chunked upload of a single artifact.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, instrument};

use crate::adapters::RemoteStorage;
use crate::domain::RemoteFile;

use super::error::PipelineError;

/// Default chunk size (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Cumulative byte progress of one upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    /// Completed share in 0.0..=1.0; an empty file counts as complete
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            (self.bytes_sent as f64 / self.total_bytes as f64).min(1.0)
        }
    }
}

/// Uploads one file at a time in chunks of at most `chunk_size` bytes
pub struct ChunkedUploader {
    storage: Arc<dyn RemoteStorage>,
    chunk_size: usize,
}

impl ChunkedUploader {
    pub fn new(storage: Arc<dyn RemoteStorage>, chunk_size: usize) -> Self {
        Self {
            storage,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Upload `path` into `folder_id`.
    ///
    /// `on_progress` receives cumulative acknowledged bytes after each chunk and
    /// is always called one last time with the full size on completion. No
    /// retries: the first transport error ends this upload.
    #[instrument(skip(self, mime_type, on_progress), fields(file = %path.display()))]
    pub async fn upload<F>(
        &self,
        path: &Path,
        folder_id: &str,
        mime_type: &str,
        mut on_progress: F,
    ) -> Result<RemoteFile, PipelineError>
    where
        F: FnMut(UploadProgress) + Send,
    {
        let fail = |reason: String| PipelineError::Upload {
            file: path.to_path_buf(),
            reason,
        };

        let total = tokio::fs::metadata(path)
            .await
            .map_err(|e| fail(format!("cannot read file size: {}", e)))?
            .len();
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let mut session = self
            .storage
            .create_resumable_upload(&name, folder_id, total, mime_type)
            .await
            .map_err(|e| fail(format!("{:#}", e)))?;

        let mut file = File::open(path)
            .await
            .map_err(|e| fail(format!("cannot open file: {}", e)))?;

        let mut offset = 0u64;
        let mut reported = 0u64;

        loop {
            let chunk = read_chunk(&mut file, offset, self.chunk_size)
                .await
                .map_err(|e| fail(format!("cannot read file: {}", e)))?;
            let sent = chunk.len() as u64;

            let ack = self
                .storage
                .send_chunk(&mut session, offset, chunk)
                .await
                .map_err(|e| fail(format!("{:#}", e)))?;

            if ack.done {
                break;
            }

            let acked = ack.bytes_acked.min(total);
            if sent == 0 {
                return Err(fail("service did not complete the upload".to_string()));
            }
            if acked <= offset {
                return Err(fail(format!("upload stalled at byte {}", offset)));
            }

            debug!(acked, total, "Chunk acknowledged");
            offset = acked;
            if acked > reported {
                reported = acked;
                on_progress(UploadProgress {
                    bytes_sent: acked,
                    total_bytes: total,
                });
            }
        }

        // The service may undercount the final chunk; completion is 100%
        on_progress(UploadProgress {
            bytes_sent: total,
            total_bytes: total,
        });

        self.storage
            .finalize(session)
            .await
            .map_err(|e| fail(format!("{:#}", e)))
    }
}

async fn read_chunk(file: &mut File, offset: u64, chunk_size: usize) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = Vec::with_capacity(chunk_size);
    file.take(chunk_size as u64).read_to_end(&mut buf).await?;
    Ok(buf)
}
