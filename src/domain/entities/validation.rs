use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Format check applied to a non-empty cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRule {
    Number,
    NonNegativeNumber,
    Integer,
    Email,
    Phone,
    OneOf { values: Vec<String> },
    MinLength { len: usize },
    MaxLength { len: usize },
}

impl FieldRule {
    /// Returns the error message for `value`, or `None` when it passes.
    /// Empty values always pass here; requiredness is checked separately.
    pub fn check(&self, field: &str, value: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        match self {
            FieldRule::Number => parse_number(value)
                .is_none()
                .then(|| format!("{field} must be a number")),
            FieldRule::NonNegativeNumber => match parse_number(value) {
                Some(number) if number >= 0.0 => None,
                _ => Some(format!("{field} must be a non-negative number")),
            },
            FieldRule::Integer => value
                .parse::<i64>()
                .is_err()
                .then(|| format!("{field} must be a whole number")),
            FieldRule::Email => {
                (!is_email_shape(value)).then(|| format!("{field} must be a valid email address"))
            }
            FieldRule::Phone => {
                (!is_phone_shape(value)).then(|| format!("{field} must be a valid phone number"))
            }
            FieldRule::OneOf { values } => {
                let matches = values
                    .iter()
                    .any(|allowed| allowed.trim().eq_ignore_ascii_case(value));
                (!matches).then(|| format!("{field} must be one of: {}", values.join(", ")))
            }
            FieldRule::MinLength { len } => (value.chars().count() < *len)
                .then(|| format!("{field} must be at least {len} characters")),
            FieldRule::MaxLength { len } => (value.chars().count() > *len)
                .then(|| format!("{field} must be at most {len} characters")),
        }
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

fn is_email_shape(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

fn is_phone_shape(value: &str) -> bool {
    let allowed = value
        .char_indices()
        .all(|(idx, c)| c.is_ascii_digit() || " -().".contains(c) || (c == '+' && idx == 0));
    let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
    allowed && (7..=15).contains(&digits)
}

/// How rows sharing a unique key are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Every row that shares the value is flagged.
    #[default]
    Symmetric,
    /// The first occurrence is accepted, later ones are flagged.
    FirstWins,
}

/// Everything the row validator needs besides the rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationContext {
    pub required: Vec<String>,
    pub rules: BTreeMap<String, Vec<FieldRule>>,
    pub unique_key: Option<String>,
    pub duplicate_policy: DuplicatePolicy,
}

impl ValidationContext {
    pub fn is_required(&self, field: &str) -> bool {
        self.required.iter().any(|name| name == field)
    }
}

/// Per-row validation messages keyed by original row index.
///
/// Only rows with at least one message are stored; every other row reads as
/// an empty slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorMap {
    entries: BTreeMap<usize, Vec<String>>,
}

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row_idx: usize, message: impl Into<String>) {
        self.entries.entry(row_idx).or_default().push(message.into());
    }

    pub fn extend(&mut self, row_idx: usize, messages: Vec<String>) {
        if messages.is_empty() {
            return;
        }
        self.entries.entry(row_idx).or_default().extend(messages);
    }

    pub fn errors_for(&self, row_idx: usize) -> &[String] {
        self.entries
            .get(&row_idx)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_errors(&self, row_idx: usize) -> bool {
        self.entries.contains_key(&row_idx)
    }

    /// Number of rows with at least one error.
    pub fn invalid_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.entries
            .iter()
            .map(|(row_idx, messages)| (*row_idx, messages.as_slice()))
    }
}
