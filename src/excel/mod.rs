//! Excel import/export
//!
//! - Import: one worksheet (.xlsx / .xls) → row store
//! - Export: row store → .xlsx with source notes on the header

mod exporter;
mod importer;

pub use exporter::ExcelExporter;
pub use importer::ExcelImporter;
