use std::fmt;

use serde::Serialize;

/// Prefix given to columns whose header cell was blank.
pub const PLACEHOLDER_PREFIX: &str = "To be named";

/// Synthetic header for a blank header cell at 1-based `position`.
pub fn placeholder_name(position: usize) -> String {
    format!("{PLACEHOLDER_PREFIX} {position}")
}

pub fn is_placeholder(name: &str) -> bool {
    name.strip_prefix(PLACEHOLDER_PREFIX)
        .map(|rest| {
            let rest = rest.trim_start();
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
        })
        .unwrap_or(false)
}

/// Case/whitespace-insensitive form of a header label.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Ordered display columns: required fields first, then dynamic fields in
/// first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnSet {
    required: Vec<String>,
    dynamic: Vec<String>,
}

impl ColumnSet {
    pub fn new(required: Vec<String>, dynamic: Vec<String>) -> Self {
        Self { required, dynamic }
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn dynamic(&self) -> &[String] {
        &self.dynamic
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .chain(self.dynamic.iter())
            .map(String::as_str)
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.required.len() + self.dynamic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.iter().any(|column| column == name)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|column| column == name)
    }

    pub fn placeholders(&self) -> Vec<String> {
        self.dynamic
            .iter()
            .filter(|name| is_placeholder(name))
            .cloned()
            .collect()
    }
}

/// Difference between a sheet's dynamic columns and a server template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TemplateMismatch {
    /// Template labels the sheet does not have.
    pub missing: Vec<String>,
    /// Sheet columns the template does not list.
    pub unexpected: Vec<String>,
}

impl TemplateMismatch {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

impl fmt::Display for TemplateMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing: [{}]", self.missing.join(", ")));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!("unexpected: [{}]", self.unexpected.join(", ")));
        }
        write!(f, "columns do not match the template ({})", parts.join("; "))
    }
}
