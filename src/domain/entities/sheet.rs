use std::path::Path;

use anyhow::{Context, Result};

use crate::domain::entities::columns::is_placeholder;
use crate::domain::entities::row::ImportRow;

pub const MIME_CSV: &str = "text/csv";
pub const MIME_XLS: &str = "application/vnd.ms-excel";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xls,
    Xlsx,
}

impl FileKind {
    /// Maps an allow-listed MIME type. Browsers and some OSes report CSV as
    /// the legacy Excel type, so that MIME is only trusted together with the
    /// file extension.
    pub fn from_mime(mime: &str, file_name: &str) -> Option<Self> {
        let mime = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            MIME_CSV | "application/csv" | "text/comma-separated-values" => Some(FileKind::Csv),
            MIME_XLSX => Some(FileKind::Xlsx),
            MIME_XLS => match Self::from_extension(file_name) {
                Some(FileKind::Csv) => Some(FileKind::Csv),
                _ => Some(FileKind::Xls),
            },
            _ => None,
        }
    }

    pub fn from_extension(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_ascii_lowercase())?;
        match ext.as_str() {
            "csv" => Some(FileKind::Csv),
            "xls" => Some(FileKind::Xls),
            "xlsx" => Some(FileKind::Xlsx),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FileKind::Csv => "CSV",
            FileKind::Xls => "XLS",
            FileKind::Xlsx => "XLSX",
        }
    }
}

/// A user-supplied file before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetFile {
    pub name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl SheetFile {
    pub fn new(name: impl Into<String>, mime: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime,
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self::new(name, None, bytes))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Parser output: resolved headers in file order and one row per data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSheet {
    pub kind: FileKind,
    pub headers: Vec<String>,
    pub rows: Vec<ImportRow>,
    /// Spreadsheet row number of each entry in `rows`, the header being row 1.
    /// Blank rows are skipped, so these can have gaps.
    pub source_rows: Vec<usize>,
}

impl ParsedSheet {
    pub fn placeholder_headers(&self) -> Vec<&str> {
        self.headers
            .iter()
            .map(String::as_str)
            .filter(|name| is_placeholder(name))
            .collect()
    }
}
