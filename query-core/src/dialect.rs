//! Per-backend SQL dialects.
//!
//! The query builder and schema inspector only talk to [`Dialect`]; each
//! backend supplies identifier quoting, placeholder syntax, its catalog
//! statement, and the few column expressions that need casts.

use common::models::connection::DbType;
use common::models::query::Operator;
use common::models::schema::{ColumnDescriptor, TypeCategory};

use crate::value::{BoundValue, Statement};

/// Columns every catalog statement returns, in this order.
pub const CATALOG_COLUMNS: [&str; 5] = [
    "table_name",
    "column_name",
    "data_type",
    "is_nullable",
    "is_primary",
];

/// Columns every foreign-key statement returns, in this order.
pub const FOREIGN_KEY_COLUMNS: [&str; 4] = [
    "table_name",
    "column_name",
    "referenced_table",
    "referenced_column",
];

/// How a backend's schema is read.
#[derive(Debug, Clone, Copy)]
pub enum Catalog {
    /// One statement covering every table and view, ordered by table name.
    Single(&'static str),
    /// `objects` lists `(table_name, object_type)`; `columns` then reads one
    /// object at a time, so a view that no longer compiles only loses itself.
    PerObject {
        objects: &'static str,
        columns: fn(&str) -> Statement,
    },
}

/// Backend-specific syntax capabilities.
pub trait Dialect: Send + Sync + std::fmt::Debug {
    fn db_type(&self) -> DbType;

    /// Quotes an identifier taken from the schema snapshot.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Placeholder for the 1-based parameter `position`.
    fn placeholder(&self, position: usize) -> String;

    /// Column discovery, returning [`CATALOG_COLUMNS`] in declaration order.
    fn catalog(&self) -> Catalog;

    /// Declared foreign keys, returning [`FOREIGN_KEY_COLUMNS`].
    fn foreign_key_catalog(&self) -> Catalog;

    /// Expression used in a select list for `column`.
    fn select_column(&self, column: &ColumnDescriptor) -> String {
        self.quote_identifier(&column.name)
    }

    /// Left-hand side of a `WHERE` comparison on `column`.
    fn filter_column(&self, column: &ColumnDescriptor, _operator: Operator) -> String {
        self.quote_identifier(&column.name)
    }
}

/// Returns the dialect for a backend.
pub fn dialect_for(db_type: DbType) -> &'static dyn Dialect {
    match db_type {
        DbType::Postgres => &PostgresDialect,
        DbType::MySQL => &MySqlDialect,
        DbType::SQLite => &SqliteDialect,
    }
}

fn quote_with(ident: &str, quote: char) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    out.push(quote);
    for ch in ident.chars() {
        if ch == quote {
            out.push(quote);
        }
        out.push(ch);
    }
    out.push(quote);
    out
}

#[derive(Debug, Clone, Copy)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Types sqlx decodes as `String` without a cast.
    fn is_native_text(data_type: &str) -> bool {
        matches!(
            data_type.to_lowercase().as_str(),
            "text" | "character varying" | "varchar" | "character" | "char" | "bpchar" | "name"
        )
    }

    /// Types the row decoder reads directly; anything else is selected as
    /// text.
    fn decodes_natively(data_type: &str) -> bool {
        Self::is_native_text(data_type)
            || matches!(
                data_type.to_lowercase().as_str(),
                "boolean"
                    | "smallint"
                    | "integer"
                    | "bigint"
                    | "real"
                    | "double precision"
                    | "date"
                    | "time without time zone"
                    | "timestamp without time zone"
                    | "timestamp with time zone"
                    | "bytea"
            )
    }

    /// `bit(1)` used as a flag.
    fn is_bit_flag(column: &ColumnDescriptor) -> bool {
        column.category == TypeCategory::Boolean && column.data_type.to_lowercase().starts_with("bit")
    }

    fn needs_text_cast(column: &ColumnDescriptor) -> bool {
        column.is_exact_numeric() || !Self::decodes_natively(&column.data_type)
    }
}

impl Dialect for PostgresDialect {
    fn db_type(&self) -> DbType {
        DbType::Postgres
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '"')
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${}", position)
    }

    fn catalog(&self) -> Catalog {
        Catalog::Single(
            "SELECT c.table_name::text AS table_name, \
                c.column_name::text AS column_name, \
                CASE WHEN c.data_type IN ('bit', 'bit varying') \
                      AND c.character_maximum_length IS NOT NULL \
                     THEN c.data_type || '(' || c.character_maximum_length || ')' \
                     ELSE c.data_type::text END AS data_type, \
                c.is_nullable::text AS is_nullable, \
                CASE WHEN pk.column_name IS NULL THEN 'NO' ELSE 'YES' END AS is_primary \
         FROM information_schema.columns c \
         JOIN information_schema.tables t \
           ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
         LEFT JOIN ( \
             SELECT kcu.table_name, kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON kcu.constraint_name = tc.constraint_name \
              AND kcu.table_schema = tc.table_schema \
              AND kcu.table_name = tc.table_name \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
               AND tc.table_schema = current_schema() \
               AND kcu.ordinal_position = 1 \
         ) pk ON pk.table_name = c.table_name AND pk.column_name = c.column_name \
         WHERE c.table_schema = current_schema() \
           AND t.table_type IN ('BASE TABLE', 'VIEW') \
         ORDER BY c.table_name, c.ordinal_position",
        )
    }

    fn foreign_key_catalog(&self) -> Catalog {
        Catalog::Single(
            "SELECT kcu.table_name::text AS table_name, \
                    kcu.column_name::text AS column_name, \
                    ccu.table_name::text AS referenced_table, \
                    ccu.column_name::text AS referenced_column \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON kcu.constraint_name = tc.constraint_name \
              AND kcu.table_schema = tc.table_schema \
             JOIN information_schema.constraint_column_usage ccu \
               ON ccu.constraint_name = tc.constraint_name \
              AND ccu.table_schema = tc.table_schema \
             WHERE tc.constraint_type = 'FOREIGN KEY' \
               AND tc.table_schema = current_schema() \
             ORDER BY kcu.table_name, kcu.ordinal_position",
        )
    }

    fn select_column(&self, column: &ColumnDescriptor) -> String {
        let quoted = self.quote_identifier(&column.name);
        if Self::is_bit_flag(column) {
            format!("CAST({q} AS INTEGER) AS {q}", q = quoted)
        } else if Self::needs_text_cast(column) {
            format!("CAST({q} AS TEXT) AS {q}", q = quoted)
        } else {
            quoted
        }
    }

    fn filter_column(&self, column: &ColumnDescriptor, operator: Operator) -> String {
        let quoted = self.quote_identifier(&column.name);
        if Self::is_bit_flag(column) && operator != Operator::Like {
            return format!("(CAST({} AS INTEGER) = 1)", quoted);
        }
        let like_on_non_text = operator == Operator::Like
            && !(column.category == TypeCategory::Text && Self::is_native_text(&column.data_type));
        let text_like_type =
            column.category == TypeCategory::Text && !Self::is_native_text(&column.data_type);
        if like_on_non_text || text_like_type {
            format!("CAST({} AS TEXT)", quoted)
        } else {
            quoted
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn db_type(&self) -> DbType {
        DbType::MySQL
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '`')
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn catalog(&self) -> Catalog {
        Catalog::Single(
            "SELECT CAST(c.TABLE_NAME AS CHAR) AS table_name, \
                CAST(c.COLUMN_NAME AS CHAR) AS column_name, \
                CAST(IF(c.DATA_TYPE = 'bit', c.COLUMN_TYPE, c.DATA_TYPE) AS CHAR) AS data_type, \
                CAST(c.IS_NULLABLE AS CHAR) AS is_nullable, \
                CAST(IF(c.COLUMN_KEY = 'PRI', 'YES', 'NO') AS CHAR) AS is_primary \
         FROM information_schema.COLUMNS c \
         WHERE c.TABLE_SCHEMA = DATABASE() \
         ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION",
        )
    }

    fn foreign_key_catalog(&self) -> Catalog {
        Catalog::Single(
            "SELECT CAST(k.TABLE_NAME AS CHAR) AS table_name, \
                    CAST(k.COLUMN_NAME AS CHAR) AS column_name, \
                    CAST(k.REFERENCED_TABLE_NAME AS CHAR) AS referenced_table, \
                    CAST(k.REFERENCED_COLUMN_NAME AS CHAR) AS referenced_column \
             FROM information_schema.KEY_COLUMN_USAGE k \
             WHERE k.TABLE_SCHEMA = DATABASE() \
               AND k.REFERENCED_TABLE_NAME IS NOT NULL \
             ORDER BY k.TABLE_NAME, k.ORDINAL_POSITION",
        )
    }

    fn select_column(&self, column: &ColumnDescriptor) -> String {
        let quoted = self.quote_identifier(&column.name);
        if column.is_exact_numeric() {
            format!("CAST({q} AS CHAR) AS {q}", q = quoted)
        } else {
            quoted
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn db_type(&self) -> DbType {
        DbType::SQLite
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '"')
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn catalog(&self) -> Catalog {
        Catalog::PerObject {
            objects: SQLITE_OBJECTS,
            columns: sqlite_object_columns,
        }
    }

    fn foreign_key_catalog(&self) -> Catalog {
        Catalog::PerObject {
            objects: SQLITE_TABLES,
            columns: sqlite_object_foreign_keys,
        }
    }

    fn select_column(&self, column: &ColumnDescriptor) -> String {
        let quoted = self.quote_identifier(&column.name);
        if column.is_exact_numeric() {
            format!("CAST({q} AS TEXT) AS {q}", q = quoted)
        } else {
            quoted
        }
    }
}

const SQLITE_OBJECTS: &str = "SELECT name AS table_name, type AS object_type \
                              FROM sqlite_master \
                              WHERE type IN ('table', 'view') \
                                AND name NOT LIKE 'sqlite_%' \
                              ORDER BY name";

const SQLITE_TABLES: &str = "SELECT name AS table_name, type AS object_type \
                             FROM sqlite_master \
                             WHERE type = 'table' \
                               AND name NOT LIKE 'sqlite_%' \
                             ORDER BY name";

fn sqlite_object_foreign_keys(object: &str) -> Statement {
    Statement::new(
        "SELECT ? AS table_name, \
                f.\"from\" AS column_name, \
                f.\"table\" AS referenced_table, \
                f.\"to\" AS referenced_column \
         FROM pragma_foreign_key_list(?) f \
         ORDER BY f.id, f.seq",
    )
    .bind(BoundValue::Text(object.to_string()))
    .bind(BoundValue::Text(object.to_string()))
}

fn sqlite_object_columns(object: &str) -> Statement {
    Statement::new(
        "SELECT ? AS table_name, \
                p.name AS column_name, \
                p.type AS data_type, \
                CASE WHEN p.\"notnull\" = 0 THEN 'YES' ELSE 'NO' END AS is_nullable, \
                CASE WHEN p.pk = 1 THEN 'YES' ELSE 'NO' END AS is_primary \
         FROM pragma_table_info(?) p \
         ORDER BY p.cid",
    )
    .bind(BoundValue::Text(object.to_string()))
    .bind(BoundValue::Text(object.to_string()))
}
