//! CSV reader with encoding detection

use crate::error::{PanelError, PanelResult};
use crate::types::{CellValue, Record, RowStore};
use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Read a CSV file whose first record is the header.
///
/// UTF-8 (with or without BOM) is tried first; bytes that are not valid UTF-8
/// are decoded as Windows-1252, which never fails.
pub fn read_csv(path: &Path) -> PanelResult<RowStore> {
    let bytes = fs::read(path)?;
    let text = decode(&bytes);
    if matches!(text, Cow::Owned(_)) {
        warn!(path = %path.display(), "file is not valid UTF-8, decoded as Windows-1252");
    }
    let store = parse_csv(&text)?;
    debug!(
        path = %path.display(),
        rows = store.len(),
        columns = store.columns().len(),
        "csv loaded"
    );
    Ok(store)
}

/// UTF-8 with the BOM stripped, or Windows-1252 when the bytes are not UTF-8
pub fn decode(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            Cow::Owned(text.into_owned())
        }
    }
}

/// Parse CSV text into a row store; cells go through [`CellValue::parse`]
pub fn parse_csv(text: &str) -> PanelResult<RowStore> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    for (i, name) in columns.iter().enumerate() {
        if columns[..i].contains(name) {
            return Err(PanelError::Parse(format!("Duplicate column header '{}'", name)));
        }
    }

    let mut store = RowStore::new(columns.clone());
    for row in reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (name, raw) in columns.iter().zip(row.iter()) {
            let value = CellValue::parse(raw);
            if !value.is_absent() {
                record.insert(name.clone(), value);
            }
        }
        store.push(record);
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_blanks_numbers_and_text() {
        let store = parse_csv("Firm,Year,Revenue\nA,2020,10\nA,2021,\nB,2020,n/a\n").unwrap();
        assert_eq!(store.columns(), &["Firm", "Year", "Revenue"]);
        assert_eq!(store.len(), 3);
        assert_eq!(store.cell(0, "Revenue"), &CellValue::Number(10.0));
        assert!(store.cell(1, "Revenue").is_absent());
        assert_eq!(store.cell(2, "Revenue"), &CellValue::text("n/a"));
    }

    #[test]
    fn test_bom_is_stripped() {
        let text = decode(b"\xEF\xBB\xBFFirm,V\nA,1\n");
        let store = parse_csv(&text).unwrap();
        assert_eq!(store.columns(), &["Firm", "V"]);
    }

    #[test]
    fn test_non_utf8_fallback() {
        // "Société" in Latin-1
        let bytes = b"Firm,V\nSoci\xE9t\xE9,1\n";
        let text = decode(bytes);
        assert!(matches!(text, Cow::Owned(_)));
        let store = parse_csv(&text).unwrap();
        assert_eq!(store.cell(0, "Firm"), &CellValue::text("Société"));
    }

    #[test]
    fn test_windows_1252_punctuation() {
        // euro sign and curly quotes live in 0x80-0x9F
        let text = decode(b"Firm,Unit\nA,\x80 \x93x\x94\n");
        let store = parse_csv(&text).unwrap();
        assert_eq!(store.cell(0, "Unit"), &CellValue::text("\u{20ac} \u{201c}x\u{201d}"));
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let result = parse_csv("a,b\n1,2,3\n");
        assert!(matches!(result, Err(PanelError::Csv(_))));
    }

    #[test]
    fn test_duplicate_headers() {
        assert!(matches!(parse_csv("a,a\n1,2\n"), Err(PanelError::Parse(_))));
    }

    #[test]
    fn test_read_csv_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Firm,Revenue\nA,1.5\n").unwrap();
        let store = read_csv(file.path()).unwrap();
        assert_eq!(store.cell(0, "Revenue"), &CellValue::Number(1.5));
    }
}
