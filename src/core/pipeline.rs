//! Phase controller.
//!
//! Each phase runs start-to-finish on one background task. The caller gets a
//! [`PhaseHandle`]: a stream of [`Event`]s while the worker runs, then the
//! phase result. Settings are checked before the worker is spawned, so a
//! configuration problem never produces a half-started phase.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::adapters::{EncodingProfile, RemoteStorage, SheetClient, Transcoder};
use crate::domain::{ConversionResult, Event, EventKind, Phase, SheetTarget, SourceItem, UploadResult};

use super::converter::{ConversionEvent, Converter};
use super::decision::UnmatchedDecider;
use super::error::PipelineError;
use super::publisher::{Publisher, UploadEvent};
use super::reconciler::{ReconcileEvent, ReconcileReport, Reconciler};
use super::uploader::DEFAULT_CHUNK_SIZE;

/// A running phase
pub struct PhaseHandle<T> {
    pub phase_id: Uuid,
    events: mpsc::UnboundedReceiver<Event>,
    task: JoinHandle<Result<T, PipelineError>>,
}

impl<T> PhaseHandle<T> {
    /// Next event, or `None` once the worker has finished
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Wait for the worker and return the phase result
    pub async fn join(self) -> Result<T, PipelineError> {
        self.task
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))?
    }
}

/// Result of the publish phase
#[derive(Debug)]
pub struct PublishSummary {
    /// One entry per successful conversion, in input order
    pub uploads: Vec<UploadResult>,

    /// `None` when nothing was uploaded and the document was left alone
    pub reconcile: Option<Result<ReconcileReport, PipelineError>>,
}

impl PublishSummary {
    pub fn failed_uploads(&self) -> usize {
        self.uploads.iter().filter(|u| !u.is_success()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.failed_uploads() == 0 && !matches!(self.reconcile, Some(Err(_)))
    }
}

/// Owns the collaborators and starts phases
pub struct Pipeline {
    transcoder: Arc<dyn Transcoder>,
    remote: Option<Remote>,
    profile: EncodingProfile,
    chunk_size: usize,
}

/// Collaborators needed only by the publish phase
struct Remote {
    storage: Arc<dyn RemoteStorage>,
    sheets: Arc<dyn SheetClient>,
}

impl Pipeline {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            transcoder,
            remote: None,
            profile: EncodingProfile::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Attach the storage and document clients used by the publish phase
    pub fn with_remote(
        mut self,
        storage: Arc<dyn RemoteStorage>,
        sheets: Arc<dyn SheetClient>,
    ) -> Self {
        self.remote = Some(Remote { storage, sheets });
        self
    }

    pub fn with_profile(mut self, profile: EncodingProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn profile(&self) -> &EncodingProfile {
        &self.profile
    }

    /// Start converting `sources` into `output_dir`.
    ///
    /// The output directory is created if needed and the transcoder is
    /// health-checked before the worker starts. Two sources that would write
    /// the same artifact (same stem in different folders) are rejected.
    pub async fn start_conversion(
        &self,
        sources: Vec<SourceItem>,
        output_dir: &Path,
    ) -> Result<PhaseHandle<Vec<ConversionResult>>, PipelineError> {
        if self.profile.extension.trim().is_empty() {
            return Err(PipelineError::configuration("no output extension configured"));
        }
        check_output_collisions(&sources, output_dir, &self.profile.extension)?;
        tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
            PipelineError::configuration(format!(
                "output directory {} is not usable: {}",
                output_dir.display(),
                e
            ))
        })?;

        let converter = Converter::new(self.transcoder.clone(), self.profile.clone());
        converter.check_ready().await?;

        let phase_id = Uuid::new_v4();
        let (tx, events) = mpsc::unbounded_channel();
        let output_dir: PathBuf = output_dir.to_path_buf();
        let span = info_span!("conversion", phase_id = %phase_id, files = sources.len());

        let task = tokio::spawn(
            async move {
                let emit = Emitter::new(tx, phase_id, Phase::Conversion);
                info!("Conversion phase started");
                emit.send(EventKind::PhaseStarted {
                    total: sources.len(),
                });

                let results = converter
                    .convert(&sources, &output_dir, |event| match event {
                        ConversionEvent::Failed { source, diagnostic } => {
                            emit.send(EventKind::ItemFailed {
                                name: source.file_name(),
                                reason: diagnostic.to_string(),
                            })
                        }
                        ConversionEvent::Progress { fraction, current } => {
                            emit.send(EventKind::Progress {
                                fraction,
                                current: current.to_string(),
                            })
                        }
                    })
                    .await;

                let succeeded = results.iter().filter(|r| r.is_success()).count();
                emit.send(EventKind::PhaseCompleted {
                    succeeded,
                    failed: results.len() - succeeded,
                });
                Ok(results)
            }
            .instrument(span),
        );

        Ok(PhaseHandle {
            phase_id,
            events,
            task,
        })
    }

    /// Start uploading `converted` into `folder_id`, then reconcile against `target`.
    ///
    /// Failed conversions in `converted` are ignored. `decider` is consulted at
    /// most once, when some uploads match no row.
    pub fn start_publish(
        &self,
        converted: Vec<ConversionResult>,
        folder_id: &str,
        target: SheetTarget,
        decider: Arc<dyn UnmatchedDecider>,
    ) -> Result<PhaseHandle<PublishSummary>, PipelineError> {
        validate_publish(folder_id, &target)?;
        let remote = self.remote.as_ref().ok_or_else(|| {
            PipelineError::configuration("no storage or document client configured")
        })?;

        let publisher = Publisher::new(
            remote.storage.clone(),
            self.chunk_size,
            self.profile.mime_type(),
        );
        let reconciler = Reconciler::new(remote.sheets.clone());

        let phase_id = Uuid::new_v4();
        let (tx, events) = mpsc::unbounded_channel();
        let folder_id = folder_id.to_string();
        let span = info_span!("publish", phase_id = %phase_id, folder_id = %folder_id);

        let task = tokio::spawn(
            async move {
                let emit = Emitter::new(tx, phase_id, Phase::Publish);
                let total = converted.iter().filter(|c| c.is_success()).count();
                info!(total, "Publish phase started");
                emit.send(EventKind::PhaseStarted { total });

                let uploads = publisher
                    .upload_all(&converted, &folder_id, |event| match event {
                        UploadEvent::Failed { name, reason } => emit.send(EventKind::ItemFailed {
                            name: name.to_string(),
                            reason: reason.to_string(),
                        }),
                        UploadEvent::Progress { fraction, current } => {
                            emit.send(EventKind::Progress {
                                fraction,
                                current: current.to_string(),
                            })
                        }
                    })
                    .await;

                let succeeded = uploads.iter().filter(|u| u.is_success()).count();
                let failed = uploads.len() - succeeded;

                if succeeded == 0 {
                    info!("Nothing uploaded, document left unchanged");
                    emit.send(EventKind::PhaseCompleted { succeeded, failed });
                    return Ok(PublishSummary {
                        uploads,
                        reconcile: None,
                    });
                }

                let reconcile = reconciler
                    .reconcile(&uploads, &target, decider.as_ref(), |event| match event {
                        ReconcileEvent::RowUpdated { row, name } => {
                            emit.send(EventKind::RowUpdated {
                                row,
                                name: name.to_string(),
                            })
                        }
                        ReconcileEvent::DecisionRequested { names } => {
                            emit.send(EventKind::DecisionRequested {
                                names: names.to_vec(),
                            })
                        }
                        ReconcileEvent::RowsAppended { start_row, count } => {
                            emit.send(EventKind::RowsAppended { start_row, count })
                        }
                    })
                    .await;

                match &reconcile {
                    Ok(_) => emit.send(EventKind::PhaseCompleted { succeeded, failed }),
                    Err(e) => {
                        warn!(error = %e, "Reconciliation aborted");
                        emit.send(EventKind::PhaseAborted {
                            error: e.to_string(),
                        });
                    }
                }

                Ok(PublishSummary {
                    uploads,
                    reconcile: Some(reconcile),
                })
            }
            .instrument(span),
        );

        Ok(PhaseHandle {
            phase_id,
            events,
            task,
        })
    }
}

/// Every source must map to its own artifact path
fn check_output_collisions(
    sources: &[SourceItem],
    output_dir: &Path,
    extension: &str,
) -> Result<(), PipelineError> {
    let mut claimed: HashMap<PathBuf, &SourceItem> = HashMap::with_capacity(sources.len());

    for source in sources {
        let output = source.output_path(output_dir, extension);
        if let Some(first) = claimed.get(&output) {
            return Err(PipelineError::configuration(format!(
                "{} and {} would both be converted to {}",
                first.path().display(),
                source.path().display(),
                output.display()
            )));
        }
        claimed.insert(output, source);
    }
    Ok(())
}

/// Check a publish destination before any work starts
pub fn validate_publish(folder_id: &str, target: &SheetTarget) -> Result<(), PipelineError> {
    if folder_id.trim().is_empty() {
        return Err(PipelineError::configuration("no destination folder selected"));
    }
    if target.spreadsheet_id.trim().is_empty() {
        return Err(PipelineError::configuration("no spreadsheet selected"));
    }
    if target.sheet_name.is_empty() {
        return Err(PipelineError::configuration("no sheet selected"));
    }
    if target.start_row == 0 {
        return Err(PipelineError::configuration("start row must be 1 or greater"));
    }
    Ok(())
}

/// Stamps worker events with the phase identity
struct Emitter {
    tx: mpsc::UnboundedSender<Event>,
    phase_id: Uuid,
    phase: Phase,
}

impl Emitter {
    fn new(tx: mpsc::UnboundedSender<Event>, phase_id: Uuid, phase: Phase) -> Self {
        Self { tx, phase_id, phase }
    }

    fn send(&self, kind: EventKind) {
        // A caller that stopped listening still gets the final result from join()
        let _ = self.tx.send(Event::new(self.phase_id, self.phase, kind));
    }
}
