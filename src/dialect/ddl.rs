//! Schema change statements.
//!
//! Operations that need more than one statement return them in execution
//! order; the server has no transactional DDL, so each runs on its own.

use crate::error::{AdapterError, Result};
use crate::wire::types::Value;

use super::quoting::{quote_column_name, quote_table_name, quote_value};
use super::{AbstractType, Dialect};

/// Column attributes for `add_column`, `change_column` and `create_table`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnOptions {
    pub limit: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    /// `Some(Value::Null)` sets an explicit NULL default
    pub default: Option<Value>,
    /// `Some(false)` adds NOT NULL
    pub null: Option<bool>,
}

impl ColumnOptions {
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn null(mut self, null: bool) -> Self {
        self.null = Some(null);
        self
    }
}

/// One column of a `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub type_name: String,
    pub options: ColumnOptions,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            options: ColumnOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ColumnOptions) -> Self {
        self.options = options;
        self
    }
}

/// Options for `add_index`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexOptions {
    /// Defaults to `index_<table>_on_<col>_and_<col>`
    pub name: Option<String>,
    pub unique: bool,
    /// Columns to order descending; ignored without index sort order support
    pub descending: Vec<String>,
}

impl Dialect {
    fn column_sql(&self, type_name: &str, options: &ColumnOptions) -> Result<String> {
        let mut sql = self.type_to_sql(type_name, options.limit, options.precision, options.scale)?;
        add_column_options(&mut sql, options);
        Ok(sql)
    }

    /// `CREATE TABLE`, with a leading primary key column when `primary_key`
    /// is given.
    pub fn create_table(
        &self,
        table_name: &str,
        primary_key: Option<&str>,
        columns: &[ColumnDefinition],
    ) -> Result<String> {
        let mut defs = Vec::with_capacity(columns.len() + 1);
        if let Some(pk) = primary_key {
            defs.push(format!(
                "{} {}",
                quote_column_name(pk),
                self.type_to_sql(AbstractType::PrimaryKey.as_str(), None, None, None)?
            ));
        }
        for column in columns {
            defs.push(format!(
                "{} {}",
                quote_column_name(&column.name),
                self.column_sql(&column.type_name, &column.options)?
            ));
        }
        if defs.is_empty() {
            return Err(AdapterError::Config(format!(
                "Table {} must have at least one column",
                table_name
            )));
        }
        Ok(format!(
            "CREATE TABLE {} ({})",
            quote_table_name(table_name),
            defs.join(", ")
        ))
    }

    pub fn drop_table(&self, table_name: &str, if_exists: bool) -> String {
        format!(
            "DROP TABLE {}{}",
            if if_exists { "IF EXISTS " } else { "" },
            quote_table_name(table_name)
        )
    }

    pub fn rename_table(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "RENAME TABLE {} TO {}",
            quote_table_name(old_name),
            quote_table_name(new_name)
        )
    }

    /// `ADD COLUMN`. Identity cannot be declared in `ADD COLUMN`, so a
    /// primary key column is added first and made an identity column by a
    /// second statement.
    pub fn add_column(
        &self,
        table_name: &str,
        column_name: &str,
        type_name: &str,
        options: &ColumnOptions,
    ) -> Result<Vec<String>> {
        let table = quote_table_name(table_name);
        let column = quote_column_name(column_name);
        let is_pk = type_name == AbstractType::PrimaryKey.as_str();

        let mut definition = if is_pk {
            self.pk_base.to_string()
        } else {
            self.type_to_sql(type_name, options.limit, options.precision, options.scale)?
        };
        add_column_options(&mut definition, options);

        let mut statements = vec![format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            table, column, definition
        )];
        if let (true, Some(identity)) = (is_pk, self.identity) {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} SET {}",
                table, column, identity
            ));
        }
        Ok(statements)
    }

    pub fn remove_column(&self, table_name: &str, column_name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_table_name(table_name),
            quote_column_name(column_name)
        )
    }

    /// Change a column's type, then its default and nullability when given.
    pub fn change_column(
        &self,
        table_name: &str,
        column_name: &str,
        type_name: &str,
        options: &ColumnOptions,
    ) -> Result<Vec<String>> {
        let mut statements = vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} SET DATA TYPE {}",
            quote_table_name(table_name),
            quote_column_name(column_name),
            self.type_to_sql(type_name, options.limit, options.precision, options.scale)?
        )];
        if let Some(default) = &options.default {
            statements.push(self.change_column_default(table_name, column_name, default));
        }
        if let Some(null) = options.null {
            statements.push(self.change_column_null(table_name, column_name, null));
        }
        Ok(statements)
    }

    pub fn change_column_default(&self, table_name: &str, column_name: &str, default: &Value) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
            quote_table_name(table_name),
            quote_column_name(column_name),
            quote_value(default)
        )
    }

    pub fn change_column_null(&self, table_name: &str, column_name: &str, null: bool) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {}",
            quote_table_name(table_name),
            quote_column_name(column_name),
            if null { "NULL" } else { "NOT NULL" }
        )
    }

    pub fn rename_column(&self, table_name: &str, column_name: &str, new_column_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            quote_table_name(table_name),
            quote_column_name(column_name),
            quote_column_name(new_column_name)
        )
    }

    /// Default index name for a set of columns.
    pub fn index_name(&self, table_name: &str, columns: &[&str]) -> String {
        format!("index_{}_on_{}", table_name, columns.join("_and_"))
    }

    pub fn add_index(
        &self,
        table_name: &str,
        columns: &[&str],
        options: &IndexOptions,
    ) -> Result<String> {
        if columns.is_empty() {
            return Err(AdapterError::Config(format!(
                "No columns given for index on {}",
                table_name
            )));
        }
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| self.index_name(table_name, columns));
        let limit = self.limits().index_name_length;
        if name.chars().count() > limit {
            return Err(AdapterError::Config(format!(
                "Index name '{}' on table '{}' is too long; the limit is {} characters",
                name, table_name, limit
            )));
        }

        let sort_order = self.features().index_sort_order;
        let column_list: Vec<String> = columns
            .iter()
            .map(|c| {
                let quoted = quote_column_name(c);
                if sort_order && options.descending.iter().any(|d| d == c) {
                    format!("{} DESC", quoted)
                } else {
                    quoted
                }
            })
            .collect();

        Ok(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if options.unique { "UNIQUE " } else { "" },
            quote_column_name(&name),
            quote_table_name(table_name),
            column_list.join(", ")
        ))
    }

    pub fn remove_index(&self, table_name: &str, index_name: &str) -> String {
        format!(
            "DROP INDEX {}.{}",
            quote_table_name(table_name),
            quote_column_name(index_name)
        )
    }

    pub fn create_schema(&self, name: &str) -> String {
        format!("CREATE SCHEMA {}", quote_table_name(name))
    }

    pub fn drop_schema(&self, name: &str) -> String {
        format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_table_name(name))
    }
}

fn add_column_options(sql: &mut String, options: &ColumnOptions) {
    if let Some(default) = &options.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&quote_value(default));
    }
    if options.null == Some(false) {
        sql.push_str(" NOT NULL");
    }
}
