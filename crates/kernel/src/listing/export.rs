//! Export tables.
//!
//! Exporters (spreadsheet, PDF) render a table of cells; this module only
//! shapes flattened rows into that table. Column order is the order of the
//! column definitions and cell values are looked up by stable row field name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::FlatRow;

/// An export column: header label and the row field it reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub label: String,
    pub field: String,
}

impl ColumnDef {
    pub fn new(label: &str, field: &str) -> Self {
        Self {
            label: label.to_string(),
            field: field.to_string(),
        }
    }
}

/// Rows projected onto export columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTable {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Value>>,
}

impl ExportTable {
    /// Project `rows` onto `columns`. A row without a column's field yields
    /// a null cell.
    pub fn build(columns: &[ColumnDef], rows: &[FlatRow]) -> Self {
        let cells = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| row.get(&column.field).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self {
            columns: columns.to_vec(),
            rows: cells,
        }
    }

    /// Header labels in column order.
    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.label.as_str()).collect()
    }
}
