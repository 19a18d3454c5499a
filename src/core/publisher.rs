//! Drives the chunked uploader across a converted batch.
//!
//! Per-file byte progress is folded into one aggregate fraction for the whole
//! batch with [`aggregate`].

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::adapters::RemoteStorage;
use crate::domain::{ConversionResult, UploadOutcome, UploadResult};

use super::uploader::ChunkedUploader;

/// Aggregate progress for file `index` (1-based) of `total`, given that
/// file's own completed fraction.
///
/// Equivalent to `((index - 1) * 100 + file_percent) / (total * 100)`.
pub fn aggregate(index: usize, total: usize, file_fraction: f64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    let done_before = index.saturating_sub(1).min(total) as f64;
    ((done_before + file_fraction.clamp(0.0, 1.0)) / total as f64).min(1.0)
}

/// Callback payload during an upload batch
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent<'a> {
    /// An upload failed; the batch continues
    Failed { name: &'a str, reason: &'a str },

    /// Aggregate progress in 0.0..=1.0
    Progress { fraction: f64, current: &'a str },
}

/// Uploads every successful conversion of a batch, one file at a time
pub struct Publisher {
    uploader: ChunkedUploader,
    mime_type: String,
}

impl Publisher {
    pub fn new(storage: Arc<dyn RemoteStorage>, chunk_size: usize, mime_type: impl Into<String>) -> Self {
        Self {
            uploader: ChunkedUploader::new(storage, chunk_size),
            mime_type: mime_type.into(),
        }
    }

    /// Upload successful conversions into `folder_id`.
    ///
    /// Returns one result per successful conversion, in input order. Failed
    /// conversions are skipped; a failed upload is recorded and the batch
    /// moves on.
    #[instrument(skip_all, fields(folder_id = %folder_id))]
    pub async fn upload_all<F>(
        &self,
        converted: &[ConversionResult],
        folder_id: &str,
        mut on_event: F,
    ) -> Vec<UploadResult>
    where
        F: FnMut(UploadEvent<'_>) + Send,
    {
        let items: Vec<&ConversionResult> = converted.iter().filter(|c| c.is_success()).collect();
        let total = items.len();
        let mut results = Vec::with_capacity(total);
        let mut reported = 0.0f64;

        for (i, item) in items.into_iter().enumerate() {
            let index = i + 1;
            let name = item
                .output_path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            info!(file = %name, index, total, "Uploading");

            let upload = self
                .uploader
                .upload(&item.output_path, folder_id, &self.mime_type, |progress| {
                    let fraction = aggregate(index, total, progress.fraction());
                    if fraction > reported {
                        reported = fraction;
                        on_event(UploadEvent::Progress {
                            fraction,
                            current: &name,
                        });
                    }
                })
                .await;

            let outcome = match upload {
                Ok(file) => UploadOutcome::Success {
                    id: file.id,
                    link: file.link,
                },
                Err(e) => {
                    let reason = e.to_string();
                    warn!(file = %name, error = %reason, "Upload failed");
                    on_event(UploadEvent::Failed {
                        name: &name,
                        reason: &reason,
                    });

                    // Move the bar to the end of this file's slot
                    let fraction = aggregate(index, total, 1.0);
                    if fraction > reported {
                        reported = fraction;
                        on_event(UploadEvent::Progress {
                            fraction,
                            current: &name,
                        });
                    }
                    UploadOutcome::Failed { reason }
                }
            };

            results.push(UploadResult::new(item, outcome));
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_formula() {
        assert_eq!(aggregate(1, 4, 0.0), 0.0);
        assert_eq!(aggregate(1, 4, 0.5), 0.125);
        assert_eq!(aggregate(2, 4, 0.0), 0.25);
        assert_eq!(aggregate(4, 4, 1.0), 1.0);
    }

    #[test]
    fn test_aggregate_single_file() {
        assert_eq!(aggregate(1, 1, 0.3), 0.3);
        assert_eq!(aggregate(1, 1, 1.0), 1.0);
    }

    #[test]
    fn test_aggregate_clamps_inputs() {
        assert_eq!(aggregate(1, 2, 1.7), 0.5);
        assert_eq!(aggregate(1, 2, -0.5), 0.0);
        assert_eq!(aggregate(0, 2, 0.0), 0.0);
        assert_eq!(aggregate(3, 2, 1.0), 1.0);
        assert_eq!(aggregate(1, 0, 0.0), 1.0);
    }

    #[test]
    fn test_aggregate_is_monotonic_across_file_boundaries() {
        let total = 3;
        let mut last = 0.0;
        for index in 1..=total {
            for step in 0..=10 {
                let value = aggregate(index, total, step as f64 / 10.0);
                assert!(value >= last, "{} < {}", value, last);
                last = value;
            }
        }
        assert_eq!(last, 1.0);
    }
}
