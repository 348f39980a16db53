//! Loading panel data from files
//!
//! Dispatches on extension (`.csv`, `.xlsx`/`.xls`, `.yaml`/`.yml`, `.json`)
//! and outer-merges several sources on (id, time).

pub mod csv_file;
pub mod merge;

pub use merge::{column_sources, merge_on_keys, sort_on_keys, LoadedTable};

use crate::config::PanelConfig;
use crate::error::{PanelError, PanelResult};
use crate::excel::ExcelImporter;
use crate::types::{CellValue, Record, RowStore};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// A data file to load
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub path: PathBuf,
    pub label: String,
    /// Worksheet to read from a workbook (first sheet when unset)
    pub sheet: Option<String>,
}

impl DataSource {
    /// Source labelled with its file stem
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path,
            label,
            sheet: None,
        }
    }
}

/// Loaded data plus the provenance of every column
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPanel {
    pub store: RowStore,
    pub column_sources: BTreeMap<String, String>,
}

impl LoadedPanel {
    /// Inline rows with no file behind them
    #[must_use]
    pub fn inline(store: RowStore) -> Self {
        let column_sources = store
            .columns()
            .iter()
            .map(|c| (c.clone(), "inline".to_string()))
            .collect();
        Self {
            store,
            column_sources,
        }
    }
}

/// Load one file, choosing the reader by extension
pub fn load_file(path: &Path, sheet: Option<&str>) -> PanelResult<RowStore> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => csv_file::read_csv(path),
        "xlsx" | "xlsm" | "xls" => ExcelImporter::new(path)
            .with_sheet(sheet.map(str::to_string))
            .import(),
        "yaml" | "yml" => {
            let rows: Vec<Mapping> = serde_yaml::from_str(&fs::read_to_string(path)?)?;
            rows_from_mappings(rows)
        }
        // Mapping keeps keys in file order, unlike serde_json::Map
        "json" => {
            let rows: Vec<Mapping> = serde_json::from_str(&fs::read_to_string(path)?)?;
            rows_from_mappings(rows)
        }
        _ => Err(PanelError::Parse(format!(
            "Unsupported data file {} (expected .csv, .xlsx, .xls, .yaml or .json)",
            path.display()
        ))),
    }
}

/// Load every source and merge them on (id, time).
///
/// With both key columns configured the result is sorted by (id, time), even
/// for a single source, so `x-1` is the previous period. A single source with
/// no time column keeps its file order.
pub fn load_sources(sources: &[DataSource], config: &PanelConfig) -> PanelResult<LoadedPanel> {
    if sources.is_empty() {
        return Err(PanelError::Configuration("no data sources given".to_string()));
    }

    let tables = load_tables(sources)?;
    let column_sources = column_sources(&tables);

    let keys = (
        config.group_key_column.as_deref(),
        config.time_column.as_deref(),
    );
    let store = match (tables.as_slice(), keys) {
        ([table], (Some(id), Some(time))) => sort_on_keys(&table.store, id, time),
        ([table], _) => table.store.clone(),
        (_, (Some(id), Some(time))) => merge_on_keys(&tables, id, time)?,
        _ => {
            return Err(PanelError::Configuration(
                "merging several sources needs both id_column and time_column".to_string(),
            ))
        }
    };

    Ok(LoadedPanel {
        store,
        column_sources,
    })
}

fn load_tables(sources: &[DataSource]) -> PanelResult<Vec<LoadedTable>> {
    let load = |source: &DataSource| -> PanelResult<LoadedTable> {
        let store = load_file(&source.path, source.sheet.as_deref())?;
        info!(
            source = %source.label,
            path = %source.path.display(),
            rows = store.len(),
            "source loaded"
        );
        Ok(LoadedTable {
            label: source.label.clone(),
            store,
        })
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        sources.par_iter().map(load).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        sources.iter().map(load).collect()
    }
}

/// Build a row store from row mappings (YAML/JSON rows, inline job rows)
pub fn rows_from_mappings(rows: Vec<Mapping>) -> PanelResult<RowStore> {
    let mut store = RowStore::default();
    for (index, row) in rows.into_iter().enumerate() {
        let mut record = Record::new();
        for (key, value) in row {
            let column = match key {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(PanelError::Parse(format!(
                        "row {}: column names must be strings, got {:?}",
                        index, other
                    )))
                }
            };
            let cell = cell_from_value(&value).map_err(|message| {
                PanelError::Parse(format!("row {}, column '{}': {}", index, column, message))
            })?;
            record.insert(column, cell);
        }
        store.push(record);
    }
    Ok(store)
}

fn cell_from_value(value: &Value) -> Result<CellValue, String> {
    match value {
        Value::Null => Ok(CellValue::Absent),
        Value::Bool(b) => Ok(CellValue::Boolean(*b)),
        Value::Number(n) => Ok(n.as_f64().map_or(CellValue::Absent, CellValue::number)),
        Value::String(s) if s.trim().is_empty() => Ok(CellValue::Absent),
        Value::String(s) => Ok(CellValue::Text(s.clone())),
        Value::Tagged(tagged) => cell_from_value(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => {
            Err("expected a scalar value, got a list or mapping".to_string())
        }
    }
}
