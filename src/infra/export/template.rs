use std::path::Path;

use anyhow::{Context, Result};

use crate::config::ImportProfile;
use crate::domain::entities::columns::normalize_label;

/// Header row of the downloadable template: required fields first, then the
/// server's template labels when known, otherwise the profile's examples.
pub fn template_columns(profile: &ImportProfile, template: Option<&[String]>) -> Vec<String> {
    let mut columns = profile.required_fields.clone();
    let extra = template.unwrap_or(&profile.example_columns);
    for label in extra {
        let wanted = normalize_label(label);
        if !columns.iter().any(|column| normalize_label(column) == wanted) {
            columns.push(label.clone());
        }
    }
    columns
}

/// Writes the template as CSV text: header row plus the profile's example rows.
pub fn write_template<W: std::io::Write>(
    writer: W,
    profile: &ImportProfile,
    template: Option<&[String]>,
) -> Result<()> {
    let columns = template_columns(profile, template);
    let mut csv = csv::WriterBuilder::new().flexible(false).from_writer(writer);
    csv.write_record(&columns)
        .context("failed to write template header")?;
    for example in &profile.example_rows {
        let mut record: Vec<&str> = example.iter().map(String::as_str).collect();
        record.resize(columns.len(), "");
        csv.write_record(&record)
            .context("failed to write template row")?;
    }
    csv.flush().context("failed to flush template")?;
    Ok(())
}

pub fn write_template_file(
    path: &Path,
    profile: &ImportProfile,
    template: Option<&[String]>,
) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_template(file, profile, template)
}
