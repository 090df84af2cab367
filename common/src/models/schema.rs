//! Schema models discovered from the backend catalog.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Coarse type category of a column, independent of the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    Text,
    Numeric,
    Temporal,
    Binary,
    Boolean,
}

impl TypeCategory {
    /// Maps a declared catalog type (`character varying`, `DECIMAL(10,2)`,
    /// `timestamp with time zone`, `BLOB`, ...) onto a category.
    pub fn from_declared(data_type: &str) -> Self {
        let lower = data_type.trim().to_lowercase();
        let base = lower.split('(').next().unwrap_or_default().trim();

        if base.starts_with("bool") {
            return TypeCategory::Boolean;
        }
        if base == "bit" {
            let width = lower.split('(').nth(1).map(|w| w.trim_end_matches(')').trim());
            return match width {
                None | Some("1") => TypeCategory::Boolean,
                Some(_) => TypeCategory::Binary,
            };
        }
        if base.contains("blob")
            || base.contains("binary")
            || base == "bytea"
            || base == "raw"
            || base == "bit varying"
            || base == "varbit"
        {
            return TypeCategory::Binary;
        }
        // Durations and zoned times have no chrono counterpart and compare as text.
        if base == "interval" || base == "timetz" || base == "time with time zone" {
            return TypeCategory::Text;
        }
        if base.starts_with("date") || base.starts_with("time") || base == "year" {
            return TypeCategory::Temporal;
        }
        let word = base.split_whitespace().next().unwrap_or_default();
        if word.starts_with("int")
            || matches!(word, "tinyint" | "smallint" | "mediumint" | "bigint")
            || base.ends_with(" int")
            || word.contains("serial")
            || matches!(
                word,
                "decimal" | "numeric" | "number" | "real" | "double" | "float" | "money"
            )
            || word.starts_with("float")
        {
            return TypeCategory::Numeric;
        }
        TypeCategory::Text
    }
}

/// One column of a table or view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ColumnDescriptor {
    /// Column name as declared.
    pub name: String,
    /// Type category.
    pub category: TypeCategory,
    /// Declared type as reported by the catalog.
    pub data_type: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            category: TypeCategory::from_declared(&data_type),
            data_type,
            nullable,
        }
    }

    /// Exact numerics (`DECIMAL`, `NUMERIC`, `MONEY`) that must not pass
    /// through a float.
    pub fn is_exact_numeric(&self) -> bool {
        let lower = self.data_type.to_lowercase();
        self.category == TypeCategory::Numeric
            && (lower.starts_with("decimal")
                || lower.starts_with("numeric")
                || lower.starts_with("money")
                || lower.starts_with("number"))
    }
}

/// Declared reference from a column to a column of another table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// A table or view with its columns in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDescriptor {
    /// Exact, case-sensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Tables this one references, sorted and without duplicates.
    pub fn referenced_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self
            .foreign_keys
            .iter()
            .map(|fk| fk.referenced_table.clone())
            .collect();
        tables.sort();
        tables.dedup();
        tables
    }
}

/// Table descriptor plus its current row count, as listed by the REST surface.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
    pub record_count: i64,
}

impl TableInfo {
    pub fn new(table: &TableDescriptor, record_count: i64) -> Self {
        Self {
            name: table.name.clone(),
            columns: table.columns.clone(),
            primary_key: table.primary_key.clone(),
            foreign_keys: table.foreign_keys.clone(),
            record_count,
        }
    }
}

/// Listing of every discovered table.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TablesResponse {
    pub tables: Vec<TableInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        use TypeCategory::*;
        let cases = [
            ("integer", Numeric),
            ("INTEGER", Numeric),
            ("bigint", Numeric),
            ("tinyint", Numeric),
            ("DECIMAL(10,2)", Numeric),
            ("double precision", Numeric),
            ("bigserial", Numeric),
            ("character varying", Text),
            ("VARCHAR(255)", Text),
            ("tinytext", Text),
            ("uuid", Text),
            ("point", Text),
            ("timestamp without time zone", Temporal),
            ("DATETIME", Temporal),
            ("date", Temporal),
            ("interval", Text),
            ("time with time zone", Text),
            ("time without time zone", Temporal),
            ("bit", Boolean),
            ("bit(1)", Boolean),
            ("bit(8)", Binary),
            ("bit varying(4)", Binary),
            ("bytea", Binary),
            ("BLOB", Binary),
            ("varbinary", Binary),
            ("boolean", Boolean),
            ("", Text),
        ];
        for (declared, expected) in cases {
            assert_eq!(TypeCategory::from_declared(declared), expected, "{declared}");
        }
    }

    #[test]
    fn test_exact_numeric() {
        assert!(ColumnDescriptor::new("price", "numeric(12,4)", true).is_exact_numeric());
        assert!(ColumnDescriptor::new("price", "DECIMAL", true).is_exact_numeric());
        assert!(!ColumnDescriptor::new("qty", "integer", true).is_exact_numeric());
        assert!(!ColumnDescriptor::new("ratio", "real", true).is_exact_numeric());
    }

    #[test]
    fn test_column_lookup_is_case_sensitive() {
        let table = TableDescriptor {
            name: "users".into(),
            columns: vec![ColumnDescriptor::new("Email", "text", true)],
            primary_key: None,
            foreign_keys: Vec::new(),
        };
        assert!(table.column("Email").is_some());
        assert!(table.column("email").is_none());
    }

    #[test]
    fn test_referenced_tables_are_unique() {
        let fk = |column: &str, table: &str| ForeignKey {
            column: column.into(),
            referenced_table: table.into(),
            referenced_column: "id".into(),
        };
        let table = TableDescriptor {
            name: "orders".into(),
            columns: Vec::new(),
            primary_key: Some("id".into()),
            foreign_keys: vec![fk("user_id", "users"), fk("buyer_id", "users"), fk("sku", "items")],
        };
        assert_eq!(table.referenced_tables(), vec!["items", "users"]);
    }
}
