pub mod csv;
pub mod xlsx;

use anyhow::Result;

use crate::domain::entities::sheet::FileKind;

/// Decodes a spreadsheet payload into raw cell text, header row included.
pub fn read_grid(kind: FileKind, bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    match kind {
        FileKind::Csv => csv::read_csv_grid(bytes),
        FileKind::Xls | FileKind::Xlsx => xlsx::read_workbook_grid(bytes),
    }
}
