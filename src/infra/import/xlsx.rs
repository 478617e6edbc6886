use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};

pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(v) => v.to_string(),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(v) => v.to_string(),
        Data::DateTimeIso(v) => v.to_string(),
        Data::DurationIso(v) => v.to_string(),
        Data::Error(v) => format!("{v:?}"),
        Data::Empty => String::new(),
    }
}

/// Reads the first worksheet of an XLS/XLSX payload. Other sheets are ignored.
pub fn read_workbook_grid(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).context("failed to open workbook")?;

    let sheet_names = workbook.sheet_names();
    if sheet_names.len() > 1 {
        tracing::debug!(
            sheets = sheet_names.len(),
            "workbook has several sheets, reading the first"
        );
    }

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook has no worksheets"))?
        .context("failed to read first worksheet")?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_to_string_renders_numbers_without_trailing_zeroes() {
        assert_eq!(cell_to_string(&Data::Float(720.0)), "720");
        assert_eq!(cell_to_string(&Data::Float(12.5)), "12.5");
        assert_eq!(cell_to_string(&Data::Int(3)), "3");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }

    const CABINETS_XLSX: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/cabinets.xlsx"
    ));

    #[test]
    fn workbook_grid_reads_only_the_first_sheet() {
        let grid = read_workbook_grid(CABINETS_XLSX).expect("fixture should open");

        assert_eq!(grid.len(), 3, "the Notes sheet is not read");
        assert_eq!(grid[0], ["code", "description", "height", "width"]);
        assert_eq!(grid[1], ["BC-600", "Base cabinet", "720", "12.5"]);
        assert_eq!(grid[2], ["WC-400", "Wall cabinet", "", "40"]);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(read_workbook_grid(b"definitely not a workbook").is_err());
    }
}
