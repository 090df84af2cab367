//! Driver rows to backend-neutral [`Row`]s.
//!
//! Each backend reports its own type names; decoding dispatches on them and
//! falls back through the common Rust types for anything unrecognized.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use common::errors::{AppError, AppResult, QueryErrorKind};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use crate::value::{Cell, Row};

fn column_labels<R: sqlx::Row>(row: &R) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

fn undecodable(column: &str, type_name: &str) -> AppError {
    AppError::query(
        QueryErrorKind::Other,
        format!("cannot decode column '{}' of type {}", column, type_name),
    )
}

/// Tries each listed Rust type in turn, wrapping the first success.
macro_rules! decode_first {
    ($row:expr, $idx:expr, $($ty:ty => $wrap:expr),+ $(,)?) => {{
        let mut decoded = None;
        $(
            if decoded.is_none() {
                if let Ok(v) = $row.try_get::<$ty, _>($idx) {
                    decoded = Some(($wrap)(v));
                }
            }
        )+
        decoded
    }};
}

pub(crate) fn pg_row(row: &PgRow) -> AppResult<Row> {
    let columns = column_labels(row);
    let mut cells = Vec::with_capacity(columns.len());

    for (i, column) in row.columns().iter().enumerate() {
        if row.try_get_raw(i).map_err(crate::classifier::classify)?.is_null() {
            cells.push(Cell::Null);
            continue;
        }
        let type_name = column.type_info().name();
        let cell = match type_name {
            "BOOL" => decode_first!(row, i, bool => Cell::Bool),
            "INT2" => decode_first!(row, i, i16 => |v: i16| Cell::Int(v.into())),
            "INT4" => decode_first!(row, i, i32 => |v: i32| Cell::Int(v.into())),
            "INT8" => decode_first!(row, i, i64 => Cell::Int),
            "FLOAT4" => decode_first!(row, i, f32 => |v: f32| Cell::Float(v.into())),
            "FLOAT8" => decode_first!(row, i, f64 => Cell::Float),
            "DATE" => decode_first!(row, i, NaiveDate => Cell::Date),
            "TIME" => decode_first!(row, i, NaiveTime => Cell::Time),
            "TIMESTAMP" => decode_first!(row, i, NaiveDateTime => Cell::DateTime),
            "TIMESTAMPTZ" => decode_first!(row, i, DateTime<Utc> => Cell::Timestamp),
            "BYTEA" => decode_first!(row, i, Vec<u8> => Cell::Bytes),
            _ => decode_first!(
                row, i,
                String => Cell::Text,
                i64 => Cell::Int,
                f64 => Cell::Float,
                Vec<u8> => Cell::Bytes,
            ),
        };
        cells.push(cell.ok_or_else(|| undecodable(column.name(), type_name))?);
    }

    Ok(Row::new(columns, cells))
}

pub(crate) fn mysql_row(row: &MySqlRow) -> AppResult<Row> {
    let columns = column_labels(row);
    let mut cells = Vec::with_capacity(columns.len());

    for (i, column) in row.columns().iter().enumerate() {
        if row.try_get_raw(i).map_err(crate::classifier::classify)?.is_null() {
            cells.push(Cell::Null);
            continue;
        }
        let type_name = column.type_info().name();
        let cell = match type_name {
            "BOOLEAN" => decode_first!(row, i, bool => Cell::Bool),
            name if name.ends_with("UNSIGNED") => decode_first!(
                row, i,
                u64 => |v: u64| i64::try_from(v)
                    .map(Cell::Int)
                    .unwrap_or_else(|_| Cell::Decimal(v.to_string())),
            ),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => decode_first!(
                row, i,
                i64 => Cell::Int,
                u16 => |v: u16| Cell::Int(v.into()),
            ),
            "FLOAT" => decode_first!(row, i, f32 => |v: f32| Cell::Float(v.into())),
            "DOUBLE" => decode_first!(row, i, f64 => Cell::Float),
            "DATE" => decode_first!(row, i, NaiveDate => Cell::Date, String => Cell::Text),
            "TIME" => decode_first!(row, i, NaiveTime => Cell::Time, String => Cell::Text),
            "DATETIME" => decode_first!(
                row, i,
                NaiveDateTime => Cell::DateTime,
                String => Cell::Text,
            ),
            "TIMESTAMP" => decode_first!(
                row, i,
                DateTime<Utc> => Cell::Timestamp,
                NaiveDateTime => Cell::DateTime,
            ),
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
                decode_first!(row, i, Vec<u8> => Cell::Bytes)
            }
            _ => decode_first!(
                row, i,
                String => Cell::Text,
                i64 => Cell::Int,
                f64 => Cell::Float,
                Vec<u8> => |v: Vec<u8>| match String::from_utf8(v) {
                    Ok(s) => Cell::Text(s),
                    Err(e) => Cell::Bytes(e.into_bytes()),
                },
            ),
        };
        cells.push(cell.ok_or_else(|| undecodable(column.name(), type_name))?);
    }

    Ok(Row::new(columns, cells))
}

/// SQLite declares types loosely, so temporal affinities fall back to the
/// stored text when it does not parse.
pub(crate) fn sqlite_row(row: &SqliteRow) -> AppResult<Row> {
    let columns = column_labels(row);
    let mut cells = Vec::with_capacity(columns.len());

    for (i, column) in row.columns().iter().enumerate() {
        if row.try_get_raw(i).map_err(crate::classifier::classify)?.is_null() {
            cells.push(Cell::Null);
            continue;
        }
        let type_name = column.type_info().name();
        let cell = match type_name {
            "BOOLEAN" => decode_first!(row, i, bool => Cell::Bool, i64 => Cell::Int),
            "DATE" => decode_first!(row, i, NaiveDate => Cell::Date, String => Cell::Text),
            "TIME" => decode_first!(row, i, NaiveTime => Cell::Time, String => Cell::Text),
            "DATETIME" => decode_first!(
                row, i,
                NaiveDateTime => Cell::DateTime,
                DateTime<Utc> => Cell::Timestamp,
                String => Cell::Text,
                i64 => Cell::Int,
            ),
            "REAL" => decode_first!(row, i, f64 => Cell::Float),
            "TEXT" => decode_first!(row, i, String => Cell::Text),
            "BLOB" => decode_first!(row, i, Vec<u8> => Cell::Bytes),
            _ => decode_first!(
                row, i,
                i64 => Cell::Int,
                f64 => Cell::Float,
                String => Cell::Text,
                Vec<u8> => Cell::Bytes,
            ),
        };
        cells.push(cell.ok_or_else(|| undecodable(column.name(), type_name))?);
    }

    Ok(Row::new(columns, cells))
}
