//! Maps driver errors onto the shared error taxonomy.
//!
//! Raw driver text only ever lands in `detail`, which is logged and never
//! shown to callers.

use common::errors::{AppError, QueryErrorKind};
use sqlx::error::{DatabaseError, ErrorKind};
use sqlx::mysql::MySqlDatabaseError;
use sqlx::sqlite::SqliteError;

/// Classifies a driver error.
pub fn classify(error: sqlx::Error) -> AppError {
    let detail = error.to_string();
    match error {
        sqlx::Error::PoolTimedOut => AppError::timeout("timed out waiting for a pooled connection"),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => AppError::connection(detail),
        sqlx::Error::Database(db) => classify_database(db.as_ref(), detail),
        sqlx::Error::RowNotFound => AppError::not_found("no matching record"),
        _ => AppError::query(QueryErrorKind::Other, detail),
    }
}

/// Classifies an error raised while opening the pool. Anything that is not a
/// connection failure still means the backend is unusable.
pub fn classify_connect(error: sqlx::Error) -> AppError {
    match classify(error) {
        err @ AppError::Connection { .. } => err,
        other => AppError::connection(other.detail().unwrap_or("connect failed").to_string()),
    }
}

fn classify_database(db: &dyn DatabaseError, detail: String) -> AppError {
    if let Some(sqlite) = db.try_downcast_ref::<SqliteError>() {
        let code = sqlite
            .code()
            .and_then(|c| c.parse::<u32>().ok())
            .unwrap_or_default();
        return classify_sqlite_code(code, detail);
    }

    if let Some(mysql) = db.try_downcast_ref::<MySqlDatabaseError>() {
        if let Some(err) = classify_mysql_number(mysql.number(), &detail) {
            return err;
        }
    }

    if !matches!(db.kind(), ErrorKind::Other) {
        return AppError::query(QueryErrorKind::Constraint, detail);
    }

    match db.code() {
        Some(code) => classify_sqlstate(&code, detail),
        None => AppError::query(QueryErrorKind::Other, detail),
    }
}

/// Classifies a five-character SQLSTATE.
pub(crate) fn classify_sqlstate(code: &str, detail: String) -> AppError {
    let class = code.get(..2).unwrap_or_default();
    match (class, code) {
        ("08", _) | ("28", _) | ("3D", _) | ("53", _) => AppError::connection(detail),
        (_, "57P01") | (_, "57P02") | (_, "57P03") => AppError::connection(detail),
        (_, "57014") | (_, "HYT00") | (_, "70100") => {
            AppError::query(QueryErrorKind::Timeout, detail)
        }
        (_, "42501") => AppError::query(QueryErrorKind::Permission, detail),
        ("42", _) => AppError::query(QueryErrorKind::Syntax, detail),
        ("23", _) => AppError::query(QueryErrorKind::Constraint, detail),
        _ => AppError::query(QueryErrorKind::Other, detail),
    }
}

/// MySQL reuses SQLSTATE 42000 for access, schema and syntax errors, so the
/// server error number decides first.
fn classify_mysql_number(number: u16, detail: &str) -> Option<AppError> {
    let detail = detail.to_string();
    let err = match number {
        1044 | 1045 | 1049 | 2002 | 2003 | 2006 | 2013 => AppError::connection(detail),
        1142 | 1143 | 1227 => AppError::query(QueryErrorKind::Permission, detail),
        1064 | 1054 | 1146 => AppError::query(QueryErrorKind::Syntax, detail),
        1205 | 3024 => AppError::query(QueryErrorKind::Timeout, detail),
        _ => return None,
    };
    Some(err)
}

/// Classifies an (extended) SQLite result code by its primary code.
pub(crate) fn classify_sqlite_code(code: u32, detail: String) -> AppError {
    match code & 0xff {
        1 => AppError::query(QueryErrorKind::Syntax, detail),
        3 | 8 | 23 => AppError::query(QueryErrorKind::Permission, detail),
        5 | 6 => AppError::timeout(detail),
        9 => AppError::query(QueryErrorKind::Timeout, detail),
        10 | 14 | 26 => AppError::connection(detail),
        19 => AppError::query(QueryErrorKind::Constraint, detail),
        _ => AppError::query(QueryErrorKind::Other, detail),
    }
}
