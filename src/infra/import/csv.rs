use anyhow::{Context, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads every CSV record as text. Record lengths may differ; the sheet
/// parser pads short rows.
pub fn read_csv_grid(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut grid = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("failed to parse csv record {}", line + 1))?;
        grid.push(record.iter().map(str::to_string).collect());
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_ragged_records_and_strips_bom() {
        let grid = read_csv_grid(b"\xEF\xBB\xBFcode,description\nA,\"Base, 600\"\nB\n")
            .expect("csv should parse");

        assert_eq!(grid[0], vec!["code", "description"]);
        assert_eq!(grid[1], vec!["A", "Base, 600"]);
        assert_eq!(grid[2], vec!["B"]);
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        assert!(read_csv_grid(b"code\n\xFF\xFE\n").is_err());
    }
}
