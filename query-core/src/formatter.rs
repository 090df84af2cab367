//! Canonical, serializable records from raw rows.
//!
//! Timestamps become ISO-8601 text, exact numerics stay strings, binary data
//! is base64. Record keys follow the table's declared column order.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::models::query::Record;
use common::models::schema::{ColumnDescriptor, TypeCategory};
use serde_json::{Map, Number, Value};

use crate::value::{Cell, Row};

pub fn canonical_value(cell: &Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Bool(b) => Value::Bool(*b),
        Cell::Int(i) => Value::Number((*i).into()),
        Cell::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        Cell::Decimal(s) | Cell::Text(s) => Value::String(s.clone()),
        Cell::Bytes(bytes) => Value::String(STANDARD.encode(bytes)),
        Cell::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        Cell::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
        Cell::DateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        Cell::Timestamp(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.fZ").to_string()),
    }
}

/// Canonical value of `cell` read from `column`. Boolean columns stored as
/// integers or single-bit fields render as booleans.
pub fn column_value(column: &ColumnDescriptor, cell: &Cell) -> Value {
    if column.category == TypeCategory::Boolean {
        match cell {
            Cell::Int(i) => return Value::Bool(*i != 0),
            Cell::Bytes(bytes) if bytes.len() == 1 => return Value::Bool(bytes[0] != 0),
            _ => {}
        }
    }
    canonical_value(cell)
}

/// One row as a record. Declared columns the row lacks are null.
pub fn format_row(row: &Row, columns: &[ColumnDescriptor]) -> Record {
    let mut map = Map::with_capacity(columns.len());
    for column in columns {
        let value = row
            .get(&column.name)
            .map(|cell| column_value(column, cell))
            .unwrap_or(Value::Null);
        map.insert(column.name.clone(), value);
    }
    Record(map)
}

pub fn format_rows(rows: &[Row], columns: &[ColumnDescriptor]) -> Vec<Record> {
    rows.iter().map(|row| format_row(row, columns)).collect()
}

pub fn format_single(row: Option<&Row>, columns: &[ColumnDescriptor]) -> Option<Record> {
    row.map(|row| format_row(row, columns))
}
