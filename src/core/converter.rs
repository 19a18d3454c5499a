//! Sequential batch conversion.
//!
//! Sources are converted strictly in input order. A failing item is recorded
//! and reported, and the batch moves on to the next one.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::adapters::{EncodingProfile, TranscodeOutput, Transcoder};
use crate::domain::{ConversionResult, SourceItem};

use super::error::PipelineError;

/// Callback payload during a conversion batch
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionEvent<'a> {
    /// An item failed. Emitted before that item's `Progress`.
    Failed {
        source: &'a SourceItem,
        diagnostic: &'a str,
    },

    /// Emitted once per item, success or failure
    Progress { fraction: f64, current: &'a str },
}

/// Converts batches of source files with one transcoder and profile
pub struct Converter {
    transcoder: Arc<dyn Transcoder>,
    profile: EncodingProfile,
}

impl Converter {
    pub fn new(transcoder: Arc<dyn Transcoder>, profile: EncodingProfile) -> Self {
        Self {
            transcoder,
            profile,
        }
    }

    pub fn profile(&self) -> &EncodingProfile {
        &self.profile
    }

    /// Fail fast when the transcoder cannot run at all
    pub async fn check_ready(&self) -> Result<(), PipelineError> {
        self.transcoder.health_check().await.map_err(|e| {
            PipelineError::configuration(format!(
                "{} is not available: {:#}",
                self.transcoder.name(),
                e
            ))
        })
    }

    /// Convert every source into `output_dir`, one result per source in input order
    #[instrument(skip_all, fields(files = sources.len(), output_dir = %output_dir.display()))]
    pub async fn convert<F>(
        &self,
        sources: &[SourceItem],
        output_dir: &Path,
        mut on_event: F,
    ) -> Vec<ConversionResult>
    where
        F: FnMut(ConversionEvent<'_>) + Send,
    {
        let total = sources.len();
        let mut results = Vec::with_capacity(total);

        for (index, source) in sources.iter().enumerate() {
            let name = source.file_name();
            let output = source.output_path(output_dir, &self.profile.extension);
            debug!(file = %name, output = %output.display(), "Converting");

            let run = self.transcoder.run(source.path(), &output, &self.profile).await;
            let result = match run {
                Ok(run) if run.success() => ConversionResult::success(source.clone(), output),
                Ok(run) => {
                    let reason = self.failure_reason(&run);
                    ConversionResult::failed(source.clone(), output, reason)
                }
                Err(e) => ConversionResult::failed(source.clone(), output, format!("{:#}", e)),
            };

            if let Some(reason) = result.failure_reason() {
                let error = PipelineError::Transcode {
                    file: source.path().to_path_buf(),
                    diagnostic: reason.to_string(),
                };
                warn!(error = %error, "Conversion failed");
                on_event(ConversionEvent::Failed {
                    source,
                    diagnostic: reason,
                });
            }
            results.push(result);

            on_event(ConversionEvent::Progress {
                fraction: (index + 1) as f64 / total as f64,
                current: &name,
            });
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(total, failed, "Conversion batch finished");
        results
    }

    fn failure_reason(&self, run: &TranscodeOutput) -> String {
        if run.diagnostic.is_empty() {
            format!("{} exited with status {}", self.transcoder.name(), run.exit_code)
        } else {
            run.diagnostic.clone()
        }
    }
}
