use crate::config::ImportProfile;
use crate::domain::entities::columns::{normalize_label, placeholder_name, TemplateMismatch};
use crate::domain::entities::row::ImportRow;
use crate::domain::entities::sheet::{FileKind, ParsedSheet, SheetFile};
use crate::infra::import::read_grid;

/// File-level problems. Any of these blocks staging entirely.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SheetError {
    #[error("{name} is not a supported spreadsheet (use .csv, .xls or .xlsx)")]
    UnsupportedType { name: String },
    #[error("{name} is {}, above the {} limit", format_size(.size), format_size(.limit))]
    TooLarge {
        name: String,
        size: usize,
        limit: usize,
    },
    #[error("{name} has no data rows")]
    Empty { name: String },
    #[error("could not read {name}: {reason}")]
    Unreadable { name: String, reason: String },
    #[error("missing required columns: {}", .missing.join(", "))]
    MissingHeaders { missing: Vec<String> },
    #[error("{0}")]
    TemplateMismatch(TemplateMismatch),
    #[error("no file has been selected")]
    NoFile,
}

fn format_size(bytes: &usize) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    let bytes = *bytes;
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / MIB)
    } else {
        format!("{bytes} bytes")
    }
}

/// Turns a spreadsheet file into header names and string-valued rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetParser {
    pub max_file_bytes: usize,
    pub required_fields: Vec<String>,
    pub reject_missing_headers: bool,
}

impl SheetParser {
    pub fn from_profile(profile: &ImportProfile) -> Self {
        Self {
            max_file_bytes: profile.max_file_bytes,
            required_fields: profile.required_fields.clone(),
            reject_missing_headers: profile.reject_missing_headers,
        }
    }

    /// Type and size checks, done before any decoding.
    pub fn check_file(&self, file: &SheetFile) -> Result<FileKind, SheetError> {
        let kind = match file.mime.as_deref().map(str::trim) {
            Some(mime) if !mime.is_empty() && mime != "application/octet-stream" => {
                FileKind::from_mime(mime, &file.name)
            }
            _ => FileKind::from_extension(&file.name),
        }
        .ok_or_else(|| SheetError::UnsupportedType {
            name: file.name.clone(),
        })?;

        if file.size() > self.max_file_bytes {
            return Err(SheetError::TooLarge {
                name: file.name.clone(),
                size: file.size(),
                limit: self.max_file_bytes,
            });
        }

        Ok(kind)
    }

    pub fn parse(&self, file: &SheetFile) -> Result<ParsedSheet, SheetError> {
        let kind = self.check_file(file)?;
        let grid = read_grid(kind, &file.bytes).map_err(|err| SheetError::Unreadable {
            name: file.name.clone(),
            reason: format!("{err:#}"),
        })?;

        let mut records = grid.into_iter();
        let Some(header_cells) = records.next() else {
            return Err(SheetError::Empty {
                name: file.name.clone(),
            });
        };
        // Record 1 is the header, so data records are numbered from 2.
        let (source_rows, data): (Vec<usize>, Vec<Vec<String>>) = records
            .enumerate()
            .filter(|(_, cells)| cells.iter().any(|cell| !cell.trim().is_empty()))
            .map(|(idx, cells)| (idx + 2, cells))
            .unzip();
        if data.is_empty() {
            return Err(SheetError::Empty {
                name: file.name.clone(),
            });
        }

        let mut width = data
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header_cells.len()))
            .max()
            .unwrap_or(0);
        while width > 0 && is_blank_column(&header_cells, &data, width - 1) {
            width -= 1;
        }
        let headers = resolve_headers(&header_cells, width);

        if self.reject_missing_headers {
            let missing = missing_required(&headers, &self.required_fields);
            if !missing.is_empty() {
                return Err(SheetError::MissingHeaders { missing });
            }
        }

        let rows = data
            .iter()
            .map(|cells| {
                ImportRow::from_pairs(headers.iter().enumerate().map(|(col_idx, header)| {
                    let value = cells.get(col_idx).map(String::as_str).unwrap_or("");
                    (header.clone(), value.to_string())
                }))
            })
            .collect::<Vec<_>>();

        tracing::info!(
            file = %file.name,
            kind = kind.label(),
            columns = headers.len(),
            rows = rows.len(),
            "parsed sheet"
        );

        Ok(ParsedSheet {
            kind,
            headers,
            rows,
            source_rows,
        })
    }
}

/// A column with a blank header cell and no data. Only trailing ones are
/// trimmed, which covers the trailing commas some exporters write.
fn is_blank_column(header_cells: &[String], data: &[Vec<String>], col_idx: usize) -> bool {
    let header_blank = header_cells
        .get(col_idx)
        .map(|cell| cell.trim().is_empty())
        .unwrap_or(true);
    header_blank
        && data
            .iter()
            .all(|cells| !cells.get(col_idx).is_some_and(|cell| !cell.trim().is_empty()))
}

/// Trims header cells, names blank ones `To be named N` and suffixes repeated
/// names so no column shares a key with another.
fn resolve_headers(header_cells: &[String], width: usize) -> Vec<String> {
    let mut headers: Vec<String> = Vec::with_capacity(width);
    for col_idx in 0..width {
        let raw = header_cells
            .get(col_idx)
            .map(|cell| cell.trim())
            .unwrap_or("");
        let base = if raw.is_empty() {
            placeholder_name(col_idx + 1)
        } else {
            raw.to_string()
        };

        let mut name = base.clone();
        let mut copy = 2;
        while headers.contains(&name) {
            name = format!("{base} ({copy})");
            copy += 1;
        }
        headers.push(name);
    }
    headers
}

fn missing_required(headers: &[String], required: &[String]) -> Vec<String> {
    let present: Vec<String> = headers.iter().map(|h| normalize_label(h)).collect();
    required
        .iter()
        .filter(|field| !present.contains(&normalize_label(field)))
        .cloned()
        .collect()
}
