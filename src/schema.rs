//! Database schema metadata.
//!
//! Plain records built from the rows of the catalog queries in
//! `dialect::introspect`:
//! - Column information
//! - Index information
//! - Primary key and sequence

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dialect::{extract_limit, simplified_type, AbstractType};
use crate::error::{AdapterError, Result};
use crate::executor::Row;
use crate::wire::types::Value;

/// Information about a table column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as the server renders it (e.g. `varchar(32)`)
    pub sql_type: String,
    pub default: Option<String>,
    pub nullable: bool,
    /// Abstract type the declared type maps back to, if recognized
    pub abstract_type: Option<AbstractType>,
    pub limit: Option<u32>,
}

impl ColumnInfo {
    pub fn new(
        name: impl Into<String>,
        default: Option<String>,
        sql_type: impl Into<String>,
        nullable: bool,
    ) -> Self {
        let sql_type = sql_type.into();
        Self {
            name: name.into(),
            abstract_type: simplified_type(&sql_type),
            limit: extract_limit(&sql_type),
            sql_type,
            default,
            nullable,
        }
    }

    /// Build from a `list_columns` row: name, default, type, `YES`/`NO`.
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self::new(
            required_text(row, 0, "column_name")?,
            optional_text(row, 1),
            required_text(row, 2, "column type")?,
            is_yes(row.get(3)),
        ))
    }
}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ColumnInfo(name='{}', type='{}', nullable={})",
            self.name, self.sql_type, self.nullable
        )
    }
}

/// Information about a secondary index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub table: String,
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
    /// Columns ordered descending
    pub descending: Vec<String>,
}

impl IndexInfo {
    /// Build from a `list_indexes` row and the `index_columns` rows of that
    /// index.
    pub fn from_rows(table: &str, index_row: &Row, column_rows: &[Row]) -> Result<Self> {
        let mut columns = Vec::with_capacity(column_rows.len());
        let mut descending = Vec::new();
        for row in column_rows {
            let column = required_text(row, 0, "column_name")?;
            if is_no(row.get(1)) {
                descending.push(column.clone());
            }
            columns.push(column);
        }
        Ok(Self {
            table: table.to_string(),
            name: required_text(index_row, 0, "index_name")?,
            unique: is_yes(index_row.get(1)),
            columns,
            descending,
        })
    }
}

impl fmt::Display for IndexInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IndexInfo(name='{}', columns={:?}, unique={})",
            self.name, self.columns, self.unique
        )
    }
}

/// A table's primary key column and the sequence feeding it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyInfo {
    pub column: String,
    pub sequence_schema: Option<String>,
    pub sequence_name: Option<String>,
}

impl PrimaryKeyInfo {
    /// Build from the rows of `primary_key_of`.
    ///
    /// Composite keys and tables without a key yield `None`.
    pub fn from_rows(rows: &[Row], with_sequence_schema: bool) -> Result<Option<Self>> {
        let [row] = rows else {
            return Ok(None);
        };
        let column = required_text(row, 0, "column_name")?;
        let (sequence_schema, sequence_name) = if with_sequence_schema {
            (optional_text(row, 1), optional_text(row, 2))
        } else {
            (None, optional_text(row, 1))
        };
        Ok(Some(Self {
            column,
            sequence_schema,
            sequence_name,
        }))
    }
}

fn optional_text(row: &Row, idx: usize) -> Option<String> {
    row.get(idx).and_then(Value::to_text)
}

fn required_text(row: &Row, idx: usize, what: &str) -> Result<String> {
    optional_text(row, idx)
        .ok_or_else(|| AdapterError::Type(format!("Catalog row is missing {}", what)))
}

fn is_yes(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(v) => v
            .as_str()
            .map(|s| s.eq_ignore_ascii_case("YES"))
            .unwrap_or(false),
        None => false,
    }
}

fn is_no(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => !*b,
        Some(v) => v
            .as_str()
            .map(|s| s.eq_ignore_ascii_case("NO"))
            .unwrap_or(false),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_column_from_row() {
        let row: Row = smallvec![text("nick"), Value::Null, text("varchar(32)"), text("YES")];
        let col = ColumnInfo::from_row(&row).unwrap();
        assert_eq!(col.name, "nick");
        assert_eq!(col.default, None);
        assert!(col.nullable);
        assert_eq!(col.abstract_type, Some(AbstractType::String));
        assert_eq!(col.limit, Some(32));

        let row: Row = smallvec![text("id"), Value::Null, text("BIGINT"), text("NO")];
        let col = ColumnInfo::from_row(&row).unwrap();
        assert!(!col.nullable);
        assert_eq!(col.limit, Some(8));

        let row: Row = smallvec![Value::Null, Value::Null, text("int"), text("NO")];
        assert!(ColumnInfo::from_row(&row).is_err());
    }

    #[test]
    fn test_index_from_rows() {
        let index_row: Row = smallvec![text("idx_email"), text("YES")];
        let cols: Vec<Row> = vec![
            smallvec![text("email"), text("YES")],
            smallvec![text("created_at"), text("NO")],
        ];
        let idx = IndexInfo::from_rows("users", &index_row, &cols).unwrap();
        assert_eq!(idx.name, "idx_email");
        assert!(idx.unique);
        assert_eq!(idx.columns, vec!["email", "created_at"]);
        assert_eq!(idx.descending, vec!["created_at"]);
    }

    #[test]
    fn test_primary_key_from_rows() {
        let rows: Vec<Row> = vec![smallvec![text("id"), text("test"), text("users_id_seq")]];
        let pk = PrimaryKeyInfo::from_rows(&rows, true).unwrap().unwrap();
        assert_eq!(pk.column, "id");
        assert_eq!(pk.sequence_schema.as_deref(), Some("test"));
        assert_eq!(pk.sequence_name.as_deref(), Some("users_id_seq"));

        let rows: Vec<Row> = vec![smallvec![text("id"), Value::Null]];
        let pk = PrimaryKeyInfo::from_rows(&rows, false).unwrap().unwrap();
        assert_eq!(pk.sequence_name, None);

        // Composite key
        let rows: Vec<Row> = vec![smallvec![text("a"), Value::Null], smallvec![text("b"), Value::Null]];
        assert_eq!(PrimaryKeyInfo::from_rows(&rows, false).unwrap(), None);
        assert_eq!(PrimaryKeyInfo::from_rows(&[], false).unwrap(), None);
    }
}
