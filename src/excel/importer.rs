//! Excel importer: one worksheet (.xlsx / .xls) → row store

use crate::error::{PanelError, PanelResult};
use crate::types::{CellValue, Record, RowStore};
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads one worksheet: the first row is the header, every later row a record
pub struct ExcelImporter {
    path: PathBuf,
    sheet: Option<String>,
}

impl ExcelImporter {
    #[must_use]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sheet: None,
        }
    }

    /// Read `sheet` instead of the first worksheet
    #[must_use]
    pub fn with_sheet(mut self, sheet: Option<String>) -> Self {
        self.sheet = sheet;
        self
    }

    pub fn import(&self) -> PanelResult<RowStore> {
        let mut workbook = open_workbook_auto(&self.path)
            .map_err(|e| PanelError::Excel(format!("Failed to open Excel file: {}", e)))?;

        let sheet_name = match &self.sheet {
            Some(name) => name.clone(),
            None => workbook.sheet_names().first().cloned().ok_or_else(|| {
                PanelError::Excel(format!("{} has no worksheets", self.path.display()))
            })?,
        };

        let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
            PanelError::Excel(format!("Failed to read sheet '{}': {}", sheet_name, e))
        })?;

        let store = read_range(&range)?;
        debug!(
            path = %self.path.display(),
            sheet = %sheet_name,
            rows = store.len(),
            "worksheet loaded"
        );
        Ok(store)
    }
}

/// Convert a sheet range (header + data rows) into a row store
fn read_range(range: &Range<Data>) -> PanelResult<RowStore> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(RowStore::default());
    };

    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(col, cell)| {
            let name = cell.to_string();
            let name = name.trim();
            if name.is_empty() {
                format!("col_{}", col + 1)
            } else {
                name.to_string()
            }
        })
        .collect();

    for (i, name) in columns.iter().enumerate() {
        if columns[..i].contains(name) {
            return Err(PanelError::Excel(format!("Duplicate column header '{}'", name)));
        }
    }

    let mut store = RowStore::new(columns.clone());
    for row in rows {
        let mut record = Record::new();
        for (name, cell) in columns.iter().zip(row) {
            record.insert(name.clone(), cell_value(cell));
        }
        store.push(record);
    }
    Ok(store)
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::number(*i as f64),
        Data::Float(f) => CellValue::number(*f),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::String(s) if s.trim().is_empty() => CellValue::Absent,
        Data::String(s) => CellValue::Text(s.clone()),
        // Serial date numbers stay numeric so they sort and subtract
        Data::DateTime(dt) => CellValue::number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => {
            debug!(error = ?e, "spreadsheet error cell read as blank");
            CellValue::Absent
        }
        Data::Empty => CellValue::Absent,
    }
}
