//! Catalog queries.
//!
//! Each function returns SQL text only. Names are embedded as quoted string
//! literals (catalog lookups) or quoted identifiers (data queries). A
//! schema-qualified table name selects that schema; otherwise the query is
//! scoped to `CURRENT_SCHEMA`.

use super::quoting::{quote_column_name, quote_literal, quote_table_name, split_table_name};
use super::{Catalog, Dialect};

/// Schema predicate value for an optional schema name.
fn schema_value(schema: Option<&str>) -> String {
    match schema {
        Some(schema) => quote_literal(schema),
        None => "CURRENT_SCHEMA".to_string(),
    }
}

impl Dialect {
    /// Base tables in `schema` (or the current schema), optionally restricted
    /// to one table name.
    ///
    /// Returns one column: `table_name`.
    pub fn list_tables(&self, schema: Option<&str>, table: Option<&str>) -> String {
        let mut sql = String::from("SELECT table_name FROM information_schema.tables WHERE ");
        if self.catalog() == Catalog::Standard {
            sql.push_str("table_type = 'TABLE' AND ");
        }
        sql.push_str("table_schema = ");
        sql.push_str(&schema_value(schema));
        if let Some(table) = table {
            sql.push_str(" AND table_name = ");
            sql.push_str(&quote_literal(table));
        }
        sql
    }

    /// Columns of a table in declaration order.
    ///
    /// Returns `column_name`, `column_default`, declared type, `is_nullable`
    /// (`YES`/`NO`).
    pub fn list_columns(&self, table_name: &str) -> String {
        let (schema, table) = split_table_name(table_name);
        match self.catalog() {
            Catalog::Standard => format!(
                "SELECT column_name, column_default, \
                 REPLACE(COLUMN_TYPE_STRING(table_schema, table_name, column_name), ' ', ''), \
                 is_nullable \
                 FROM information_schema.columns \
                 WHERE table_schema = {} AND table_name = {} \
                 ORDER BY ordinal_position",
                schema_value(schema),
                quote_literal(table)
            ),
            Catalog::Legacy => format!(
                "SELECT column_name, NULL, type, nullable \
                 FROM information_schema.columns \
                 WHERE table_schema = {} AND table_name = {} \
                 ORDER BY position",
                schema_value(schema),
                quote_literal(table)
            ),
        }
    }

    /// Secondary indexes of a table.
    ///
    /// Returns `index_name`, `is_unique` (`YES`/`NO`).
    pub fn list_indexes(&self, table_name: &str) -> String {
        let (schema, table) = split_table_name(table_name);
        format!(
            "SELECT index_name, is_unique \
             FROM information_schema.indexes \
             WHERE table_schema = {} AND table_name = {} AND index_type <> 'PRIMARY' \
             ORDER BY index_name",
            schema_value(schema),
            quote_literal(table)
        )
    }

    /// Columns of one index in key order.
    ///
    /// Returns `column_name`, `is_ascending`.
    pub fn index_columns(&self, table_name: &str, index_name: &str) -> String {
        let (schema, table) = split_table_name(table_name);
        format!(
            "SELECT column_name, is_ascending \
             FROM information_schema.index_columns \
             WHERE index_table_schema = {} AND index_table_name = {} AND index_name = {} \
             ORDER BY ordinal_position",
            schema_value(schema),
            quote_literal(table),
            quote_literal(index_name)
        )
    }

    /// Primary key column and its backing sequence.
    ///
    /// Returns `column_name`, then `sequence_schema` when
    /// `with_sequence_schema` is set, then `sequence_name`. Sequence columns
    /// are NULL when the key has no sequence.
    pub fn primary_key_of(&self, table_name: &str, with_sequence_schema: bool) -> String {
        let (schema, table) = split_table_name(table_name);
        match self.catalog() {
            Catalog::Standard => format!(
                "SELECT kc.column_name, {}c.sequence_name \
                 FROM information_schema.table_constraints tc \
                 INNER JOIN information_schema.key_column_usage kc \
                 ON tc.table_schema = kc.table_schema \
                 AND tc.table_name = kc.table_name \
                 AND tc.constraint_name = kc.constraint_name \
                 LEFT JOIN information_schema.columns c \
                 ON kc.table_schema = c.table_schema \
                 AND kc.table_name = c.table_name \
                 AND kc.column_name = c.column_name \
                 WHERE tc.table_schema = {} AND tc.table_name = {} \
                 AND tc.constraint_type = 'PRIMARY KEY'",
                if with_sequence_schema {
                    "c.sequence_schema, "
                } else {
                    ""
                },
                schema_value(schema),
                quote_literal(table)
            ),
            Catalog::Legacy => format!(
                "SELECT column_name, {}NULL \
                 FROM information_schema.index_columns \
                 WHERE index_table_schema = {} AND index_table_name = {} \
                 AND index_name = 'PRIMARY' \
                 ORDER BY ordinal_position",
                if with_sequence_schema { "NULL, " } else { "" },
                schema_value(schema),
                quote_literal(table)
            ),
        }
    }

    /// Next value a primary key sequence should produce: the current maximum
    /// plus the increment, or the sequence minimum for an empty table.
    pub fn sequence_bounds(
        &self,
        table_name: &str,
        primary_key: &str,
        sequence_schema: &str,
        sequence_name: &str,
    ) -> String {
        let from_where = format!(
            "FROM information_schema.sequences WHERE sequence_schema = {} AND sequence_name = {}",
            quote_literal(sequence_schema),
            quote_literal(sequence_name)
        );
        format!(
            "SELECT COALESCE(MAX({} + (SELECT increment {})), (SELECT minimum_value {})) FROM {}",
            quote_column_name(primary_key),
            from_where,
            from_where,
            quote_table_name(table_name)
        )
    }

    /// Restart a sequence at `value`.
    pub fn restart_sequence(&self, sequence_schema: &str, sequence_name: &str, value: i64) -> String {
        format!(
            "CALL sys.alter_seq_restart({}, {}, {})",
            quote_literal(sequence_schema),
            quote_literal(sequence_name),
            value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_tables() {
        let d = Dialect::fdbsql();
        assert_eq!(
            d.list_tables(None, None),
            "SELECT table_name FROM information_schema.tables \
             WHERE table_type = 'TABLE' AND table_schema = CURRENT_SCHEMA"
        );
        assert_eq!(
            d.list_tables(Some("test"), Some("users")),
            "SELECT table_name FROM information_schema.tables \
             WHERE table_type = 'TABLE' AND table_schema = 'test' AND table_name = 'users'"
        );
        assert_eq!(
            Dialect::akiban().list_tables(Some("test"), None),
            "SELECT table_name FROM information_schema.tables WHERE table_schema = 'test'"
        );
    }

    #[test]
    fn test_names_cannot_escape_literals() {
        let d = Dialect::fdbsql();
        let sql = d.list_columns("x' OR '1'='1");
        assert!(sql.contains("table_name = 'x'' OR ''1''=''1'"));

        let sql = d.index_columns("t", "i'; DROP TABLE t; --");
        assert!(sql.contains("index_name = 'i''; DROP TABLE t; --'"));
    }

    #[test]
    fn test_schema_qualified_table() {
        let sql = Dialect::fdbsql().list_indexes("shop.orders");
        assert!(sql.contains("table_schema = 'shop' AND table_name = 'orders'"));
        assert!(sql.contains("index_type <> 'PRIMARY'"));

        let sql = Dialect::fdbsql().list_columns("orders");
        assert!(sql.contains("table_schema = CURRENT_SCHEMA AND table_name = 'orders'"));
        assert!(sql.ends_with("ORDER BY ordinal_position"));
    }

    #[test]
    fn test_primary_key_queries() {
        let sql = Dialect::fdbsql().primary_key_of("users", false);
        assert!(sql.starts_with("SELECT kc.column_name, c.sequence_name FROM"));
        assert!(sql.contains("tc.constraint_type = 'PRIMARY KEY'"));

        let sql = Dialect::fdbsql().primary_key_of("users", true);
        assert!(sql.starts_with("SELECT kc.column_name, c.sequence_schema, c.sequence_name"));

        let sql = Dialect::akiban().primary_key_of("users", true);
        assert!(sql.starts_with("SELECT column_name, NULL, NULL FROM"));
        assert!(sql.contains("index_name = 'PRIMARY'"));
    }

    #[test]
    fn test_sequence_statements() {
        let d = Dialect::fdbsql();
        let sql = d.sequence_bounds("users", "id", "test", "users_id_seq");
        assert!(sql.starts_with("SELECT COALESCE(MAX(\"id\" + (SELECT increment FROM"));
        assert!(sql.ends_with("FROM \"users\""));
        assert_eq!(
            d.restart_sequence("test", "users_id_seq", 42),
            "CALL sys.alter_seq_restart('test', 'users_id_seq', 42)"
        );
    }
}
