use std::collections::HashMap;

use crate::domain::entities::row::ImportRow;
use crate::domain::entities::validation::{DuplicatePolicy, ErrorMap, ValidationContext};

/// Checks that only need the row itself: requiredness, then format rules.
pub fn validate_row(row: &ImportRow, ctx: &ValidationContext) -> Vec<String> {
    let mut errors = Vec::new();

    for field in &ctx.required {
        if row.value(field).trim().is_empty() {
            errors.push(format!("{field} is required"));
        }
    }

    for (field, rules) in &ctx.rules {
        let value = row.value(field);
        errors.extend(rules.iter().filter_map(|rule| rule.check(field, value)));
    }

    errors
}

/// Full pass over `rows`, including cross-row uniqueness.
pub fn validate_rows(rows: &[ImportRow], ctx: &ValidationContext) -> ErrorMap {
    ValidationJob::new(ctx.clone()).run(rows)
}

fn unique_message(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => format!("{}{} must be unique", first.to_uppercase(), chars.as_str()),
        None => "value must be unique".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationProgress {
    Pending { validated: usize, total: usize },
    Done(ErrorMap),
}

/// Validation split into slices so a caller can yield between them.
///
/// The row slice passed to every `step` must be the same, unmodified rows;
/// after any edit start a new job.
#[derive(Debug, Clone)]
pub struct ValidationJob {
    ctx: ValidationContext,
    next_row: usize,
    errors: ErrorMap,
    keys: HashMap<String, Vec<usize>>,
    finished: bool,
}

impl ValidationJob {
    pub fn new(ctx: ValidationContext) -> Self {
        Self {
            ctx,
            next_row: 0,
            errors: ErrorMap::new(),
            keys: HashMap::new(),
            finished: false,
        }
    }

    pub fn validated(&self) -> usize {
        self.next_row
    }

    /// Validates up to `budget` more rows. The duplicate pass runs once every
    /// row has been seen.
    pub fn step(&mut self, rows: &[ImportRow], budget: usize) -> ValidationProgress {
        if self.finished {
            return ValidationProgress::Done(self.errors.clone());
        }

        let end = self.next_row.saturating_add(budget.max(1)).min(rows.len());
        for (row_idx, row) in rows.iter().enumerate().take(end).skip(self.next_row) {
            self.errors.extend(row_idx, validate_row(row, &self.ctx));

            if let Some(key_field) = &self.ctx.unique_key {
                let key = row.value(key_field).trim().to_lowercase();
                if !key.is_empty() {
                    self.keys.entry(key).or_default().push(row_idx);
                }
            }
        }
        self.next_row = end.max(self.next_row);

        if self.next_row < rows.len() {
            tracing::debug!(validated = self.next_row, total = rows.len(), "validation slice");
            return ValidationProgress::Pending {
                validated: self.next_row,
                total: rows.len(),
            };
        }

        self.flag_duplicates();
        self.finished = true;
        ValidationProgress::Done(self.errors.clone())
    }

    pub fn run(mut self, rows: &[ImportRow]) -> ErrorMap {
        loop {
            if let ValidationProgress::Done(errors) = self.step(rows, usize::MAX) {
                return errors;
            }
        }
    }

    fn flag_duplicates(&mut self) {
        let Some(key_field) = self.ctx.unique_key.as_deref() else {
            return;
        };
        let message = unique_message(key_field);

        let mut flagged: Vec<usize> = self
            .keys
            .values()
            .filter(|indices| indices.len() > 1)
            .flat_map(|indices| match self.ctx.duplicate_policy {
                DuplicatePolicy::Symmetric => indices.as_slice(),
                DuplicatePolicy::FirstWins => &indices[1..],
            })
            .copied()
            .collect();
        flagged.sort_unstable();

        for row_idx in flagged {
            self.errors.push(row_idx, message.clone());
        }
    }
}
