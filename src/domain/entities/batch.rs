use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::domain::entities::row::ImportRow;

/// Commit semantics for a multi-batch upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// Each batch commits on its own; a failed batch does not stop the rest.
    #[default]
    BestEffort,
    /// Every batch is dry-run first and nothing is committed unless all pass.
    Transactional,
}

/// A valid row queued for upload, remembering where it sits in the staging grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRow {
    pub source_index: usize,
    pub row: ImportRow,
}

/// Contiguous slice of the valid-row sequence sent as one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBatch {
    pub index: usize,
    /// Position of the batch inside the valid-row sequence.
    pub range: Range<usize>,
    pub rows: Vec<StagedRow>,
}

impl ImportBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn source_indices(&self) -> Vec<usize> {
        self.rows.iter().map(|staged| staged.source_index).collect()
    }

    pub fn import_rows(&self) -> Vec<&ImportRow> {
        self.rows.iter().map(|staged| &staged.row).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Succeeded { message: Option<String> },
    Failed { error: String },
    /// Never sent because the upload was cancelled or aborted first.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub index: usize,
    pub range: Range<usize>,
    pub source_rows: Vec<usize>,
    pub status: BatchStatus,
}

impl BatchReport {
    pub fn for_batch(batch: &ImportBatch, status: BatchStatus) -> Self {
        Self {
            index: batch.index,
            range: batch.range.clone(),
            source_rows: batch.source_indices(),
            status,
        }
    }

    pub fn row_count(&self) -> usize {
        self.range.len()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, BatchStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Success,
    PartialFailure,
    Failed,
    Cancelled,
}

impl UploadStatus {
    pub fn label(self) -> &'static str {
        match self {
            UploadStatus::Success => "success",
            UploadStatus::PartialFailure => "partial failure",
            UploadStatus::Failed => "failed",
            UploadStatus::Cancelled => "cancelled",
        }
    }
}

/// Aggregate result of one multi-batch upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    pub attempted_rows: usize,
    pub succeeded_rows: usize,
    pub failed_rows: usize,
    pub skipped_rows: usize,
    pub batches: Vec<BatchReport>,
    pub cancelled: bool,
}

impl UploadOutcome {
    pub fn record(&mut self, report: BatchReport) {
        let rows = report.row_count();
        match report.status {
            BatchStatus::Succeeded { .. } => {
                self.attempted_rows += rows;
                self.succeeded_rows += rows;
            }
            BatchStatus::Failed { .. } => {
                self.attempted_rows += rows;
                self.failed_rows += rows;
            }
            BatchStatus::Skipped => self.skipped_rows += rows,
        }
        self.batches.push(report);
    }

    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchReport> {
        self.batches.iter().filter(|report| report.is_failed())
    }

    pub fn failed_batch_count(&self) -> usize {
        self.failed_batches().count()
    }

    pub fn status(&self) -> UploadStatus {
        if self.cancelled {
            UploadStatus::Cancelled
        } else if self.failed_rows == 0 && self.skipped_rows == 0 {
            UploadStatus::Success
        } else if self.succeeded_rows == 0 {
            UploadStatus::Failed
        } else {
            UploadStatus::PartialFailure
        }
    }

    /// One-line summary suitable for a notification.
    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} of {} rows imported",
            self.succeeded_rows,
            self.attempted_rows + self.skipped_rows
        );
        let failed: Vec<String> = self
            .failed_batches()
            .map(|report| {
                format!(
                    "batch {} (rows {}-{})",
                    report.index + 1,
                    report.range.start,
                    report.range.end.saturating_sub(1)
                )
            })
            .collect();
        if !failed.is_empty() {
            text.push_str(&format!("; failed: {}", failed.join(", ")));
        }
        if self.skipped_rows > 0 {
            text.push_str(&format!("; {} rows not sent", self.skipped_rows));
        }
        text
    }
}
