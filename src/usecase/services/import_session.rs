use std::sync::Arc;

use crate::config::ImportProfile;
use crate::domain::entities::batch::{BatchStatus, StagedRow, UploadOutcome, UploadStatus};
use crate::domain::entities::columns::TemplateMismatch;
use crate::domain::entities::session::{ImportPhase, StagedState};
use crate::domain::entities::sheet::{ParsedSheet, SheetFile};
use crate::usecase::ports::notifier::{NoticeKind, Notifier};
use crate::usecase::ports::transport::ImportTransport;
use crate::usecase::services::batch_uploader::{BatchUploader, CancelToken, UploadJob};
use crate::usecase::services::column_reconciler::reconcile;
use crate::usecase::services::sheet_parser::{SheetError, SheetParser};
use crate::usecase::services::staging_grid::{
    shifted_index, GridError, StagingGrid, ValidationLimits,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("validation is still running")]
    ValidationInFlight,
    #[error("no rows are staged for upload")]
    NotStaged,
    #[error("an upload is already running")]
    AlreadyUploading,
    #[error("there are no valid rows to upload")]
    NoValidRows,
    #[error("no failed rows to retry")]
    NothingToRetry,
}

/// One import dialog: file, parsed sheet, staging grid and upload results.
///
/// Each session owns its state exclusively; nothing is shared between
/// sessions. Every error path notifies before it returns.
pub struct ImportSession {
    profile: ImportProfile,
    notifier: Arc<dyn Notifier>,
    phase: ImportPhase,
    file: Option<SheetFile>,
    parsed: Option<ParsedSheet>,
    mismatch: Option<TemplateMismatch>,
    grid: StagingGrid,
    last_outcome: Option<UploadOutcome>,
    /// Grid indices of rows whose batch failed in the last upload.
    retry_rows: Vec<usize>,
}

impl ImportSession {
    pub fn new(profile: ImportProfile, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            profile,
            notifier,
            phase: ImportPhase::Empty,
            file: None,
            parsed: None,
            mismatch: None,
            grid: StagingGrid::default(),
            last_outcome: None,
            retry_rows: Vec::new(),
        }
    }

    pub fn profile(&self) -> &ImportProfile {
        &self.profile
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    pub fn file(&self) -> Option<&SheetFile> {
        self.file.as_ref()
    }

    pub fn parsed(&self) -> Option<&ParsedSheet> {
        self.parsed.as_ref()
    }

    pub fn mismatch(&self) -> Option<&TemplateMismatch> {
        self.mismatch.as_ref()
    }

    pub fn grid(&self) -> &StagingGrid {
        &self.grid
    }

    pub fn last_outcome(&self) -> Option<&UploadOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn retry_rows(&self) -> &[usize] {
        &self.retry_rows
    }

    fn notify_error(&self, message: &str) {
        self.notifier.notify(NoticeKind::Error, message);
    }

    fn parser(&self) -> SheetParser {
        SheetParser::from_profile(&self.profile)
    }

    fn limits(&self) -> ValidationLimits {
        ValidationLimits {
            sync_limit: self.profile.sync_validation_limit,
            slice: self.profile.validation_slice,
        }
    }

    /// Drops everything staged. Equivalent to closing the dialog.
    pub fn reset(&mut self) {
        self.phase = ImportPhase::Empty;
        self.file = None;
        self.parsed = None;
        self.mismatch = None;
        self.grid.reset();
        self.last_outcome = None;
        self.retry_rows.clear();
    }

    /// Accepts a file after type and size checks; any previous import is
    /// discarded either way.
    pub fn select_file(&mut self, file: SheetFile) -> Result<(), SheetError> {
        self.reset();
        if let Err(err) = self.parser().check_file(&file) {
            tracing::warn!(file = %file.name, error = %err, "file rejected");
            self.notify_error(&err.to_string());
            return Err(err);
        }
        tracing::info!(file = %file.name, bytes = file.size(), "file selected");
        self.file = Some(file);
        self.phase = ImportPhase::FileSelected;
        Ok(())
    }

    pub fn parse(&mut self) -> Result<&ParsedSheet, SheetError> {
        let Some(file) = self.file.as_ref() else {
            self.notify_error(&SheetError::NoFile.to_string());
            return Err(SheetError::NoFile);
        };

        match self.parser().parse(file) {
            Ok(parsed) => {
                let placeholders = parsed.placeholder_headers();
                if !placeholders.is_empty() {
                    self.notifier.notify(
                        NoticeKind::Warning,
                        &format!("Columns without a header: {}", placeholders.join(", ")),
                    );
                }
                self.phase = ImportPhase::Parsed;
                Ok(self.parsed.insert(parsed))
            }
            Err(err) => {
                tracing::warn!(file = %file.name, error = %err, "file could not be parsed");
                self.notify_error(&err.to_string());
                self.file = None;
                self.phase = ImportPhase::Empty;
                Err(err)
            }
        }
    }

    /// Reconciles columns (against `template` when given) and stages rows.
    pub fn stage(&mut self, template: Option<&[String]>) -> Result<(), SheetError> {
        let Some(parsed) = self.parsed.as_ref() else {
            self.notify_error(&SheetError::NoFile.to_string());
            return Err(SheetError::NoFile);
        };

        match reconcile(parsed, &self.profile.required_fields, template) {
            Ok(reconciled) => {
                self.grid = StagingGrid::new(
                    reconciled.columns,
                    reconciled.rows,
                    self.profile.validation_context(),
                    self.limits(),
                );
                self.mismatch = None;
                self.refresh_phase();
                self.notify_staged();
                Ok(())
            }
            Err(mismatch) => {
                self.notify_error(&format!("File does not match the template: {mismatch}"));
                self.phase = ImportPhase::TemplateMismatch;
                self.mismatch = Some(mismatch.clone());
                Err(SheetError::TemplateMismatch(mismatch))
            }
        }
    }

    /// `select_file`, `parse` and `stage` in one go.
    pub fn load(&mut self, file: SheetFile, template: Option<&[String]>) -> Result<(), SheetError> {
        self.select_file(file)?;
        self.parse()?;
        self.stage(template)
    }

    fn refresh_phase(&mut self) {
        self.phase = if self.grid.is_validating() {
            ImportPhase::Validating
        } else if self.grid.invalid_count() == 0 {
            ImportPhase::Staged(StagedState::AllValid)
        } else {
            ImportPhase::Staged(StagedState::HasErrors)
        };
    }

    fn notify_staged(&self) {
        if self.grid.is_validating() {
            self.notifier.notify(
                NoticeKind::Info,
                &format!("Validating {} rows", self.grid.total_count()),
            );
        } else if self.grid.invalid_count() > 0 {
            self.notifier.notify(
                NoticeKind::Warning,
                &format!(
                    "{} of {} rows need fixing before upload",
                    self.grid.invalid_count(),
                    self.grid.total_count()
                ),
            );
        }
    }

    /// Runs one validation slice. Returns `true` when validation is complete.
    ///
    /// The grid can start a sliced pass in any phase (an edit during an
    /// upload, rows removed after one), so this steps it whenever one is
    /// pending. Only a `Validating` phase moves on to `Staged`.
    pub fn poll_validation(&mut self) -> bool {
        if !self.grid.is_validating() {
            return true;
        }
        let done = self.grid.poll_validation();
        if done && self.phase == ImportPhase::Validating {
            self.refresh_phase();
            self.notify_staged();
        }
        done
    }

    pub fn edit_cell(
        &mut self,
        row_idx: usize,
        column: &str,
        value: impl Into<String>,
    ) -> Result<(), GridError> {
        if !self.phase.accepts_edits() {
            self.notify_error(&GridError::NothingStaged.to_string());
            return Err(GridError::NothingStaged);
        }
        if let Err(err) = self.grid.edit_cell(row_idx, column, value) {
            self.notify_error(&err.to_string());
            return Err(err);
        }
        if self.phase != ImportPhase::Uploading {
            self.refresh_phase();
        }
        Ok(())
    }

    fn check_uploadable(&self) -> Result<(), UploadError> {
        match self.phase {
            ImportPhase::Uploading => Err(UploadError::AlreadyUploading),
            ImportPhase::Validating => Err(UploadError::ValidationInFlight),
            ImportPhase::Staged(_) | ImportPhase::Done(_) if !self.grid.is_empty() => Ok(()),
            _ => Err(UploadError::NotStaged),
        }
    }

    fn start_job(
        &mut self,
        uploader: &BatchUploader,
        rows: Vec<StagedRow>,
        cancel: CancelToken,
    ) -> UploadJob {
        let job = uploader.job(rows, cancel);
        self.notifier.notify(
            NoticeKind::Info,
            &format!("Uploading in {} batches", job.batches().len()),
        );
        self.phase = ImportPhase::Uploading;
        job
    }

    /// Prepares an upload of every valid row. Refused while validating.
    pub fn begin_upload(
        &mut self,
        uploader: &BatchUploader,
        cancel: CancelToken,
    ) -> Result<UploadJob, UploadError> {
        let rows = self
            .check_uploadable()
            .and_then(|_| {
                self.grid
                    .upload_candidates()
                    .map_err(|_| UploadError::ValidationInFlight)
            })
            .and_then(|rows| {
                if rows.is_empty() {
                    Err(UploadError::NoValidRows)
                } else {
                    Ok(rows)
                }
            });

        match rows {
            Ok(rows) => Ok(self.start_job(uploader, rows, cancel)),
            Err(err) => {
                self.notify_error(&err.to_string());
                Err(err)
            }
        }
    }

    /// Prepares an upload of only the rows whose batch failed last time and
    /// that are still valid.
    pub fn begin_retry(
        &mut self,
        uploader: &BatchUploader,
        cancel: CancelToken,
    ) -> Result<UploadJob, UploadError> {
        let rows = self.check_uploadable().and_then(|_| {
            let rows: Vec<StagedRow> = self
                .grid
                .upload_candidates()
                .map_err(|_| UploadError::ValidationInFlight)?
                .into_iter()
                .filter(|staged| self.retry_rows.contains(&staged.source_index))
                .collect();
            if rows.is_empty() {
                Err(UploadError::NothingToRetry)
            } else {
                Ok(rows)
            }
        });

        match rows {
            Ok(rows) => Ok(self.start_job(uploader, rows, cancel)),
            Err(err) => {
                self.notify_error(&err.to_string());
                Err(err)
            }
        }
    }

    /// Applies a finished job: imported rows leave the grid, failed ones stay
    /// staged and are remembered for `begin_retry`.
    pub fn finish_upload(&mut self, outcome: UploadOutcome) -> UploadStatus {
        let status = outcome.status();
        let summary = outcome.summary();
        match status {
            UploadStatus::Success => self.notifier.notify(NoticeKind::Success, &summary),
            UploadStatus::Cancelled => self.notifier.notify(NoticeKind::Warning, &summary),
            UploadStatus::PartialFailure | UploadStatus::Failed => {
                self.notify_error(&summary);
            }
        }
        tracing::info!(status = status.label(), "{summary}");

        let mut imported: Vec<usize> = Vec::new();
        let mut failed: Vec<usize> = Vec::new();
        for report in &outcome.batches {
            match report.status {
                BatchStatus::Succeeded { .. } => imported.extend(&report.source_rows),
                BatchStatus::Failed { .. } => failed.extend(&report.source_rows),
                BatchStatus::Skipped => {}
            }
        }
        imported.sort_unstable();

        self.grid.remove_rows(&imported);
        self.retry_rows = failed
            .into_iter()
            .filter_map(|row_idx| shifted_index(row_idx, &imported))
            .collect();
        if self.grid.is_empty() {
            self.grid.reset();
        }

        self.last_outcome = Some(outcome);
        self.phase = ImportPhase::Done(status);
        status
    }

    /// Uploads every valid row and blocks until the last batch returns.
    pub fn upload(
        &mut self,
        uploader: &BatchUploader,
        transport: &dyn ImportTransport,
        cancel: CancelToken,
    ) -> Result<UploadStatus, UploadError> {
        let job = self.begin_upload(uploader, cancel)?;
        let outcome = job.run(transport);
        Ok(self.finish_upload(outcome))
    }
}
