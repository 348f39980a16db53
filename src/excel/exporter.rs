//! Excel exporter: row store → one-sheet .xlsx workbook

use crate::error::{PanelError, PanelResult};
use crate::types::{CellValue, RowStore};
use rust_xlsxwriter::{Format, Note, Workbook, Worksheet};
use std::collections::BTreeMap;
use std::path::Path;

/// Writes a [`RowStore`] to a single worksheet, header in row 0
pub struct ExcelExporter<'a> {
    store: &'a RowStore,
    sheet_name: String,
    /// column name → source label(s), attached as header notes
    column_notes: BTreeMap<String, String>,
}

impl<'a> ExcelExporter<'a> {
    #[must_use]
    pub fn new(store: &'a RowStore) -> Self {
        Self {
            store,
            sheet_name: "Results".to_string(),
            column_notes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }

    #[must_use]
    pub fn with_column_notes(mut self, notes: BTreeMap<String, String>) -> Self {
        self.column_notes = notes;
        self
    }

    /// Export to an Excel .xlsx file. Absent cells are left empty.
    pub fn export(&self, output_path: &Path) -> PanelResult<()> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&self.sheet_name)
            .map_err(|e| PanelError::Export(format!("Failed to set worksheet name: {}", e)))?;

        self.write_header(worksheet)?;

        for (row_idx, record) in self.store.rows().iter().enumerate() {
            // +1 for the header row
            let row = u32::try_from(row_idx + 1)
                .map_err(|_| PanelError::Export("Too many rows for a worksheet".to_string()))?;
            for (col_idx, column) in self.store.columns().iter().enumerate() {
                write_cell(worksheet, row, column_index(col_idx)?, record.get(column))?;
            }
        }

        workbook
            .save(output_path)
            .map_err(|e| PanelError::Export(format!("Failed to save Excel file: {}", e)))?;

        Ok(())
    }

    fn write_header(&self, worksheet: &mut Worksheet) -> PanelResult<()> {
        let bold = Format::new().set_bold();
        for (col_idx, name) in self.store.columns().iter().enumerate() {
            let col = column_index(col_idx)?;
            worksheet
                .write_string_with_format(0, col, name, &bold)
                .map_err(|e| PanelError::Export(format!("Failed to write header: {}", e)))?;

            if let Some(source) = self.column_notes.get(name) {
                let note = Note::new(format!("Source: {}", source)).set_author("panelcalc");
                worksheet
                    .insert_note(0, col, &note)
                    .map_err(|e| PanelError::Export(format!("Failed to add note: {}", e)))?;
            }
        }
        Ok(())
    }
}

fn column_index(idx: usize) -> PanelResult<u16> {
    u16::try_from(idx)
        .map_err(|_| PanelError::Export("Too many columns for a worksheet".to_string()))
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, value: &CellValue) -> PanelResult<()> {
    let result = match value {
        CellValue::Number(n) => worksheet.write_number(row, col, *n).map(|_| ()),
        CellValue::Text(s) => worksheet.write_string(row, col, s).map(|_| ()),
        CellValue::Boolean(b) => worksheet.write_boolean(row, col, *b).map(|_| ()),
        CellValue::Absent => Ok(()),
    };
    result.map_err(|e| {
        PanelError::Export(format!("Failed to write cell ({}, {}): {}", row, col, e))
    })
}
