//! Reconciles uploaded links with the rows of a tabular document.
//!
//! Column A holds file names and is never rewritten; reconciliation only fills
//! column B. Matching compares the full original file name against the text
//! column A displays, case-insensitively, and the first matching row wins.
//! Items with no match are held back until the caller decides whether to
//! append them.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::adapters::{SheetClient, ValueRender};
use crate::domain::{
    hyperlink_formula, join_columns, snapshot_rows, MatchDecision, PendingAppendBatch, SheetRow,
    SheetTarget, UploadResult,
};

use super::decision::UnmatchedDecider;
use super::error::PipelineError;

/// Callback payload during a reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileEvent<'a> {
    RowUpdated { row: u32, name: &'a str },
    DecisionRequested { names: &'a [String] },
    RowsAppended { start_row: u32, count: usize },
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Rows whose link column was written
    pub updated_rows: Vec<u32>,

    /// Matched rows that already held the same link
    pub already_linked: Vec<u32>,

    /// Names that matched no row, in scan order
    pub unmatched: Vec<String>,

    /// First appended row, when the caller accepted the append
    pub appended_at: Option<u32>,
}

impl ReconcileReport {
    /// Whether new rows were appended
    pub fn appended(&self) -> bool {
        self.appended_at.is_some()
    }

    /// Writes that changed the document (row updates plus appended rows)
    pub fn applied_count(&self) -> usize {
        let appended = if self.appended() {
            self.unmatched.len()
        } else {
            0
        };
        self.updated_rows.len() + appended
    }
}

/// Decide, for each successful upload in order, what to do with it.
///
/// Rows are scanned in ascending order; the first row whose column A equals
/// the upload's original file name (ignoring case) wins.
pub fn plan(rows: &[SheetRow], uploads: &[UploadResult]) -> Vec<MatchDecision> {
    uploads
        .iter()
        .filter_map(|upload| {
            let link = upload.link()?;
            let formula = hyperlink_formula(link, &upload.label());
            let wanted = upload.source_name.to_lowercase();

            let matched = rows
                .iter()
                .filter(|row| !row.first_column.is_empty())
                .find(|row| row.first_column.to_lowercase() == wanted);

            Some(match matched {
                Some(row) if row.link_value == formula => MatchDecision::AlreadyLinked {
                    row: row.row_index,
                },
                Some(row) => MatchDecision::UpdateRow {
                    row: row.row_index,
                    formula,
                },
                None => MatchDecision::Unmatched {
                    name: upload.source_name.clone(),
                    formula,
                },
            })
        })
        .collect()
}

/// First row after the last row with any content, or `start_row` when there is none.
///
/// Interior blank rows are never reused.
pub fn next_append_row(rows: &[SheetRow], start_row: u32) -> u32 {
    rows.iter()
        .filter(|row| row.has_content)
        .map(|row| row.row_index + 1)
        .max()
        .unwrap_or(start_row)
        .max(start_row)
}

/// Applies match decisions to one document
pub struct Reconciler {
    client: Arc<dyn SheetClient>,
}

impl Reconciler {
    pub fn new(client: Arc<dyn SheetClient>) -> Self {
        Self { client }
    }

    /// Run one reconciliation pass over a single snapshot of `target`.
    ///
    /// Writes are not transactional: the first failing write aborts the pass
    /// and earlier writes stay in place.
    #[instrument(skip_all, fields(document = %target.spreadsheet_id, sheet = %target.sheet_name))]
    pub async fn reconcile<F>(
        &self,
        uploads: &[UploadResult],
        target: &SheetTarget,
        decider: &dyn UnmatchedDecider,
        mut on_event: F,
    ) -> Result<ReconcileReport, PipelineError>
    where
        F: FnMut(ReconcileEvent<'_>) + Send,
    {
        let document = target.spreadsheet_id.as_str();

        // Names are matched on what the document shows, links on what it stores
        let name_range = target.name_range();
        let names = self
            .client
            .read_range(document, &name_range, ValueRender::Formatted)
            .await
            .map_err(|e| PipelineError::document_write(document, &name_range, &e))?;
        let link_range = target.link_range();
        let links = self
            .client
            .read_range(document, &link_range, ValueRender::Formula)
            .await
            .map_err(|e| PipelineError::document_write(document, &link_range, &e))?;
        let rows = snapshot_rows(target.start_row, &join_columns(&names, &links));
        debug!(rows = rows.len(), "Read document snapshot");

        let mut report = ReconcileReport::default();
        let mut batch = PendingAppendBatch::default();

        for decision in plan(&rows, uploads) {
            match decision {
                MatchDecision::UpdateRow { row, formula } => {
                    let cell = target.link_cell(row);
                    self.client
                        .write_cell(document, &cell, &formula)
                        .await
                        .map_err(|e| PipelineError::document_write(document, &cell, &e))?;
                    let name = first_column_of(&rows, row);
                    info!(row, file = name, "Linked existing row");
                    on_event(ReconcileEvent::RowUpdated { row, name });
                    report.updated_rows.push(row);
                }
                MatchDecision::AlreadyLinked { row } => {
                    debug!(row, "Row already linked");
                    report.already_linked.push(row);
                }
                MatchDecision::Unmatched { name, formula } => {
                    debug!(file = %name, "No matching row");
                    batch.push(name, formula);
                }
            }
        }

        if batch.is_empty() {
            return Ok(report);
        }

        report.unmatched = batch.names();
        info!(count = batch.len(), "Unmatched items awaiting decision");
        on_event(ReconcileEvent::DecisionRequested {
            names: &report.unmatched,
        });

        if !decider.decide(&report.unmatched).await {
            info!("Append declined, unmatched items dropped");
            return Ok(report);
        }

        let start_row = next_append_row(&rows, target.start_row);
        let anchor = target.row_anchor(start_row);
        let count = batch.len();
        self.client
            .write_range(document, &anchor, &batch.into_rows())
            .await
            .map_err(|e| PipelineError::document_write(document, &anchor, &e))?;

        info!(start_row, count, "Appended new rows");
        on_event(ReconcileEvent::RowsAppended { start_row, count });
        report.appended_at = Some(start_row);

        Ok(report)
    }
}

fn first_column_of(rows: &[SheetRow], row: u32) -> &str {
    rows.iter()
        .find(|r| r.row_index == row)
        .map(|r| r.first_column.as_str())
        .unwrap_or_default()
}
