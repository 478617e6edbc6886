use std::cmp::Ordering;

use crate::domain::entities::batch::StagedRow;
use crate::domain::entities::columns::ColumnSet;
use crate::domain::entities::edit::{CellKey, StagedEdits};
use crate::domain::entities::grid::{GridQuery, PageView, RowFilter, SortDirection};
use crate::domain::entities::row::ImportRow;
use crate::domain::entities::validation::{ErrorMap, ValidationContext};
use crate::usecase::services::row_validator::{validate_rows, ValidationJob, ValidationProgress};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("row {0} does not exist")]
    RowOutOfRange(usize),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("validation is still running")]
    ValidationInFlight,
    #[error("no rows are staged")]
    NothingStaged,
}

/// When validation runs in slices instead of all at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Row counts up to this are validated inline on every change.
    pub sync_limit: usize,
    /// Rows per slice for larger sets.
    pub slice: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            sync_limit: 1000,
            slice: 250,
        }
    }
}

/// In-memory rows of one import, their validation errors and cell edits.
///
/// Row indices never change while rows are staged, so they identify rows in
/// the error map and in every filtered or paged view.
#[derive(Debug, Clone, Default)]
pub struct StagingGrid {
    columns: ColumnSet,
    rows: Vec<ImportRow>,
    errors: ErrorMap,
    ctx: ValidationContext,
    edits: StagedEdits,
    limits: ValidationLimits,
    job: Option<ValidationJob>,
}

impl StagingGrid {
    pub fn new(
        columns: ColumnSet,
        rows: Vec<ImportRow>,
        ctx: ValidationContext,
        limits: ValidationLimits,
    ) -> Self {
        let mut grid = Self {
            columns,
            rows,
            errors: ErrorMap::new(),
            ctx,
            edits: StagedEdits::default(),
            limits,
            job: None,
        };
        grid.revalidate();
        grid
    }

    fn revalidate(&mut self) {
        if self.rows.len() <= self.limits.sync_limit {
            self.errors = validate_rows(&self.rows, &self.ctx);
            self.job = None;
        } else {
            self.job = Some(ValidationJob::new(self.ctx.clone()));
        }
    }

    pub fn is_validating(&self) -> bool {
        self.job.is_some()
    }

    /// `(validated, total)` while a sliced validation is running.
    pub fn validation_progress(&self) -> Option<(usize, usize)> {
        self.job
            .as_ref()
            .map(|job| (job.validated(), self.rows.len()))
    }

    /// Runs one validation slice. Returns `true` once no validation is pending.
    pub fn poll_validation(&mut self) -> bool {
        let Some(job) = self.job.as_mut() else {
            return true;
        };
        match job.step(&self.rows, self.limits.slice) {
            ValidationProgress::Pending { .. } => false,
            ValidationProgress::Done(errors) => {
                self.errors = errors;
                self.job = None;
                true
            }
        }
    }

    pub fn finish_validation(&mut self) {
        while !self.poll_validation() {}
    }

    /// Replaces one cell and re-validates every row.
    pub fn edit_cell(
        &mut self,
        row_idx: usize,
        column: &str,
        value: impl Into<String>,
    ) -> Result<(), GridError> {
        if !self.columns.contains(column) {
            return Err(GridError::UnknownColumn(column.to_string()));
        }
        let row = self
            .rows
            .get_mut(row_idx)
            .ok_or(GridError::RowOutOfRange(row_idx))?;

        let value = value.into();
        let previous = row.set(column, value.clone()).unwrap_or_default();
        self.edits.record(
            CellKey {
                row_idx,
                column: column.to_string(),
            },
            &previous,
            &value,
        );
        tracing::debug!(row = row_idx, column, "cell edited");

        self.revalidate();
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Drops the given rows (typically ones already imported) and
    /// re-validates the rest. Remaining rows keep their relative order.
    pub fn remove_rows(&mut self, indices: &[usize]) {
        let mut removed = indices.to_vec();
        removed.sort_unstable();
        removed.dedup();
        if removed.is_empty() {
            return;
        }

        let mut row_idx = 0;
        self.rows.retain(|_| {
            let keep = removed.binary_search(&row_idx).is_err();
            row_idx += 1;
            keep
        });

        let edits = std::mem::take(&mut self.edits.original_values);
        self.edits.original_values = edits
            .into_iter()
            .filter_map(|(key, original)| {
                shifted_index(key.row_idx, &removed).map(|row_idx| {
                    (
                        CellKey {
                            row_idx,
                            column: key.column,
                        },
                        original,
                    )
                })
            })
            .collect();

        tracing::debug!(removed = removed.len(), remaining = self.rows.len(), "rows removed");
        self.revalidate();
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn rows(&self) -> &[ImportRow] {
        &self.rows
    }

    pub fn row(&self, row_idx: usize) -> Option<&ImportRow> {
        self.rows.get(row_idx)
    }

    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    pub fn errors_for(&self, row_idx: usize) -> &[String] {
        self.errors.errors_for(row_idx)
    }

    pub fn edits(&self) -> &StagedEdits {
        &self.edits
    }

    pub fn total_count(&self) -> usize {
        self.rows.len()
    }

    pub fn invalid_count(&self) -> usize {
        self.errors.invalid_count()
    }

    pub fn valid_count(&self) -> usize {
        self.total_count() - self.invalid_count()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn valid_rows(&self) -> Vec<(usize, &ImportRow)> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(row_idx, _)| !self.errors.has_errors(*row_idx))
            .collect()
    }

    pub fn invalid_rows(&self) -> Vec<(usize, &ImportRow)> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(row_idx, _)| self.errors.has_errors(*row_idx))
            .collect()
    }

    /// Valid rows in grid order, ready for batching. Refused mid-validation.
    pub fn upload_candidates(&self) -> Result<Vec<StagedRow>, GridError> {
        if self.is_validating() {
            return Err(GridError::ValidationInFlight);
        }
        Ok(self
            .valid_rows()
            .into_iter()
            .map(|(source_index, row)| StagedRow {
                source_index,
                row: row.clone(),
            })
            .collect())
    }

    /// Filtered, sorted and paged view as original row indices.
    pub fn page(&self, query: &GridQuery) -> PageView {
        let global = query.global_search.trim().to_lowercase();
        let column_filter = query
            .column_filter
            .as_ref()
            .map(|filter| (filter.column.as_str(), filter.term.trim().to_lowercase()))
            .filter(|(_, term)| !term.is_empty());

        let mut indices: Vec<usize> = (0..self.rows.len())
            .filter(|row_idx| match query.status {
                RowFilter::All => true,
                RowFilter::Valid => !self.errors.has_errors(*row_idx),
                RowFilter::Invalid => self.errors.has_errors(*row_idx),
            })
            .filter(|row_idx| global.is_empty() || self.rows[*row_idx].contains_lowercase(&global))
            .filter(|row_idx| match &column_filter {
                Some((column, term)) => self.rows[*row_idx]
                    .value(column)
                    .to_lowercase()
                    .contains(term.as_str()),
                None => true,
            })
            .collect();

        if let Some(sort) = &query.sort {
            indices.sort_by(|a, b| {
                let ordering =
                    compare_cells(self.rows[*a].value(&sort.column), self.rows[*b].value(&sort.column));
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let page_size = query.page_size.max(1);
        let total_matching = indices.len();
        let page_count = total_matching.div_ceil(page_size).max(1);
        let page = query.page.min(page_count - 1);
        let row_indices = indices
            .into_iter()
            .skip(page * page_size)
            .take(page_size)
            .collect();

        PageView {
            row_indices,
            total_matching,
            page,
            page_count,
        }
    }
}

/// Index of `row_idx` once the sorted `removed` rows are gone, or `None` when
/// it was removed itself.
pub fn shifted_index(row_idx: usize, removed: &[usize]) -> Option<usize> {
    match removed.binary_search(&row_idx) {
        Ok(_) => None,
        Err(before) => Some(row_idx - before),
    }
}

/// Numbers sort before text. Numbers compare numerically, text
/// case-insensitively.
fn compare_cells(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>().ok(), b.trim().parse::<f64>().ok()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}
