use crate::domain::entities::columns::{normalize_label, ColumnSet, TemplateMismatch};
use crate::domain::entities::row::ImportRow;
use crate::domain::entities::sheet::ParsedSheet;

/// Display columns plus rows re-keyed onto them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledSheet {
    pub columns: ColumnSet,
    pub rows: Vec<ImportRow>,
}

/// Maps each detected header to its display name: required fields take their
/// canonical spelling, everything else keeps the sheet's spelling.
fn column_sources(headers: &[String], required: &[String]) -> (ColumnSet, Vec<(String, Option<String>)>) {
    let mut claimed = vec![false; headers.len()];
    let mut sources = Vec::with_capacity(required.len() + headers.len());

    for field in required {
        let wanted = normalize_label(field);
        let found = headers
            .iter()
            .enumerate()
            .find(|(idx, header)| !claimed[*idx] && normalize_label(header) == wanted)
            .map(|(idx, header)| {
                claimed[idx] = true;
                header.clone()
            });
        sources.push((field.clone(), found));
    }

    let mut dynamic = Vec::new();
    for (idx, header) in headers.iter().enumerate() {
        if claimed[idx] {
            continue;
        }
        dynamic.push(header.clone());
        sources.push((header.clone(), Some(header.clone())));
    }

    (ColumnSet::new(required.to_vec(), dynamic), sources)
}

/// Symmetric difference between sheet columns and template labels, compared
/// case- and whitespace-insensitively.
pub fn compare_with_template(dynamic: &[String], template: &[String]) -> TemplateMismatch {
    let detected: Vec<String> = dynamic.iter().map(|h| normalize_label(h)).collect();
    let expected: Vec<String> = template.iter().map(|h| normalize_label(h)).collect();

    let mut mismatch = TemplateMismatch::default();
    for (label, normalized) in template.iter().zip(&expected) {
        if !detected.contains(normalized) && !mismatch.missing.contains(label) {
            mismatch.missing.push(label.clone());
        }
    }
    for (header, normalized) in dynamic.iter().zip(&detected) {
        if !expected.contains(normalized) && !mismatch.unexpected.contains(header) {
            mismatch.unexpected.push(header.clone());
        }
    }
    mismatch
}

/// Builds the display column set and, with a template, enforces that the
/// dynamic columns match it. Matching columns take the template's spelling.
pub fn reconcile(
    sheet: &ParsedSheet,
    required: &[String],
    template: Option<&[String]>,
) -> Result<ReconciledSheet, TemplateMismatch> {
    let (mut columns, mut sources) = column_sources(&sheet.headers, required);

    if let Some(template) = template {
        let mismatch = compare_with_template(columns.dynamic(), template);
        if !mismatch.is_empty() {
            tracing::warn!(%mismatch, "sheet does not match template");
            return Err(mismatch);
        }

        let renamed: Vec<String> = columns
            .dynamic()
            .iter()
            .map(|header| {
                let wanted = normalize_label(header);
                template
                    .iter()
                    .find(|label| normalize_label(label) == wanted)
                    .cloned()
                    .unwrap_or_else(|| header.clone())
            })
            .collect();
        let offset = required.len();
        for (idx, name) in renamed.iter().enumerate() {
            sources[offset + idx].0 = name.clone();
        }
        columns = ColumnSet::new(required.to_vec(), renamed);
    }

    let rows = sheet
        .rows
        .iter()
        .map(|row| {
            ImportRow::from_pairs(sources.iter().map(|(name, source)| {
                let value = source.as_deref().map(|s| row.value(s)).unwrap_or("");
                (name.clone(), value.to_string())
            }))
        })
        .collect();

    Ok(ReconciledSheet { columns, rows })
}
