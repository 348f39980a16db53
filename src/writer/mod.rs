//! Result writers, chosen by output file extension
//!
//! `.csv` (UTF-8 with BOM so spreadsheet apps detect the encoding),
//! `.yaml`/`.yml` and `.json` (a sequence of row mappings, blanks as `null`),
//! `.xlsx` (see [`ExcelExporter`]).

use crate::error::{PanelError, PanelResult};
use crate::excel::ExcelExporter;
use crate::types::{CellValue, RowStore};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Yaml,
    Json,
    Xlsx,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> PanelResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            "xlsx" => Ok(OutputFormat::Xlsx),
            _ => Err(PanelError::Export(format!(
                "Unsupported output format for {} (expected .csv, .yaml, .json or .xlsx)",
                path.display()
            ))),
        }
    }
}

/// Write `store` to `path`; `column_sources` labels headers where the format allows
pub fn write_output(
    store: &RowStore,
    path: &Path,
    column_sources: &BTreeMap<String, String>,
) -> PanelResult<()> {
    let format = OutputFormat::from_path(path)?;
    match format {
        OutputFormat::Csv => write_csv(store, path)?,
        OutputFormat::Yaml => fs::write(path, serde_yaml::to_string(&row_mappings(store))?)?,
        OutputFormat::Json => {
            fs::write(path, serde_json::to_string_pretty(&row_mappings(store))?)?
        }
        OutputFormat::Xlsx => ExcelExporter::new(store)
            .with_column_notes(column_sources.clone())
            .export(path)?,
    }
    info!(path = %path.display(), rows = store.len(), ?format, "results written");
    Ok(())
}

pub fn write_csv(store: &RowStore, path: &Path) -> PanelResult<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(UTF8_BOM)?;
    write_csv_to(store, file)
}

/// CSV without BOM to any writer
pub fn write_csv_to<W: Write>(store: &RowStore, writer: W) -> PanelResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(store.columns())?;
    for record in store.rows() {
        csv.write_record(store.columns().iter().map(|c| record.get(c).to_string()))?;
    }
    csv.flush()?;
    Ok(())
}

/// Rows as ordered mappings, serializable to both YAML and JSON
pub fn row_mappings(store: &RowStore) -> Vec<Mapping> {
    store
        .rows()
        .iter()
        .map(|record| {
            store
                .columns()
                .iter()
                .map(|c| (Value::String(c.clone()), yaml_value(record.get(c))))
                .collect()
        })
        .collect()
}

fn yaml_value(value: &CellValue) -> Value {
    match value {
        // Format nicely: whole numbers without a trailing .0
        CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
            Value::Number(serde_yaml::Number::from(*n as i64))
        }
        CellValue::Number(n) => Value::Number(serde_yaml::Number::from(*n)),
        CellValue::Text(s) => Value::String(s.clone()),
        CellValue::Boolean(b) => Value::Bool(*b),
        CellValue::Absent => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn results() -> RowStore {
        RowStore::from_records(
            vec!["Firm".to_string(), "Year".to_string(), "Growth".to_string()],
            vec![
                Record::new().with("Firm", "A").with("Year", 2020.0),
                Record::new()
                    .with("Firm", "A")
                    .with("Year", 2021.0)
                    .with("Growth", 0.5),
            ],
        )
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("a.CSV")).unwrap(), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_path(Path::new("a.yml")).unwrap(), OutputFormat::Yaml);
        assert_eq!(OutputFormat::from_path(Path::new("a.xlsx")).unwrap(), OutputFormat::Xlsx);
        assert!(OutputFormat::from_path(Path::new("a.parquet")).is_err());
        assert!(OutputFormat::from_path(Path::new("results")).is_err());
    }

    #[test]
    fn test_csv_blanks_are_empty() {
        let mut buffer = Vec::new();
        write_csv_to(&results(), &mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "Firm,Year,Growth\nA,2020,\nA,2021,0.5\n"
        );
    }

    #[test]
    fn test_csv_file_starts_with_bom() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        write_output(&results(), &path, &BTreeMap::new()).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
    }

    #[test]
    fn test_json_keeps_column_order_and_nulls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        write_output(&results(), &path, &BTreeMap::new()).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json[0]["Growth"], serde_json::Value::Null);
        assert_eq!(json[1]["Growth"], serde_json::json!(0.5));
        assert_eq!(json[1]["Year"], serde_json::json!(2021));
    }

    #[test]
    fn test_yaml_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.yaml");
        write_output(&results(), &path, &BTreeMap::new()).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("Growth: null"));
        assert!(content.contains("Firm: A"));
    }
}
