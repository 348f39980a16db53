//! Outer merge of several sources on (id, time)

use crate::core::GroupKey;
use crate::error::{PanelError, PanelResult};
use crate::types::{CellValue, Record, RowStore};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// One loaded file and the label it is known by (`BS`, `IS`, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTable {
    pub label: String,
    pub store: RowStore,
}

type MergeKey = (Option<GroupKey>, Option<GroupKey>);

/// Which source label(s) supplied each column, joined with `/`
pub fn column_sources(tables: &[LoadedTable]) -> BTreeMap<String, String> {
    let mut sources: BTreeMap<String, String> = BTreeMap::new();
    for table in tables {
        for column in table.store.columns() {
            match sources.get_mut(column) {
                None => {
                    sources.insert(column.clone(), table.label.clone());
                }
                Some(labels) => {
                    if !labels.split('/').any(|l| l == table.label) {
                        labels.push('/');
                        labels.push_str(&table.label);
                    }
                }
            }
        }
    }
    sources
}

/// Outer-merge `tables` on `(id, time)` and sort by those keys.
///
/// Rows with equal keys in different sources become one row. Where two
/// sources share a non-key column, the first concrete value wins. Repeated
/// keys inside one source are paired by occurrence with the other sources.
pub fn merge_on_keys(tables: &[LoadedTable], id: &str, time: &str) -> PanelResult<RowStore> {
    let mut columns = vec![id.to_string(), time.to_string()];
    let mut rows: Vec<Record> = Vec::new();
    let mut index: HashMap<(MergeKey, usize), usize> = HashMap::new();

    for table in tables {
        for key in [id, time] {
            if !table.store.has_column(key) {
                return Err(PanelError::Configuration(format!(
                    "source '{}' has no '{}' column to merge on",
                    table.label, key
                )));
            }
        }
        for column in table.store.columns() {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }

        let mut occurrences: HashMap<MergeKey, usize> = HashMap::new();
        for record in table.store.rows() {
            let key = (
                GroupKey::from_cell(record.get(id)),
                GroupKey::from_cell(record.get(time)),
            );
            let seen = occurrences.entry(key.clone()).or_insert(0);
            let occurrence = *seen;
            *seen += 1;
            if occurrence == 1 {
                warn!(
                    source = %table.label,
                    id = %record.get(id),
                    time = %record.get(time),
                    "repeated (id, time) key"
                );
            }

            match index.get(&(key.clone(), occurrence)) {
                Some(&position) => {
                    let merged = &mut rows[position];
                    for column in table.store.columns() {
                        let value = record.get(column);
                        if merged.get(column).is_absent() && !value.is_absent() {
                            merged.insert(column.clone(), value.clone());
                        }
                    }
                }
                None => {
                    index.insert((key, occurrence), rows.len());
                    rows.push(record.clone());
                }
            }
        }
    }

    sort_rows(&mut rows, id, time);

    info!(sources = tables.len(), rows = rows.len(), "sources merged");
    Ok(RowStore::from_records(columns, rows))
}

/// Copy of `store` stably sorted by `(id, time)`
pub fn sort_on_keys(store: &RowStore, id: &str, time: &str) -> RowStore {
    let mut rows = store.rows().to_vec();
    sort_rows(&mut rows, id, time);
    RowStore::from_records(store.columns().to_vec(), rows)
}

fn sort_rows(rows: &mut [Record], id: &str, time: &str) {
    rows.sort_by(|a, b| {
        compare_cells(a.get(id), b.get(id)).then_with(|| compare_cells(a.get(time), b.get(time)))
    });
}

/// Sort order for key cells: numbers, booleans, text, then blanks
pub fn compare_cells(a: &CellValue, b: &CellValue) -> Ordering {
    fn rank(v: &CellValue) -> u8 {
        match v {
            CellValue::Number(_) => 0,
            CellValue::Boolean(_) => 1,
            CellValue::Text(_) => 2,
            CellValue::Absent => 3,
        }
    }
    match (a, b) {
        (CellValue::Number(x), CellValue::Number(y)) => x.total_cmp(y),
        (CellValue::Boolean(x), CellValue::Boolean(y)) => x.cmp(y),
        (CellValue::Text(x), CellValue::Text(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
