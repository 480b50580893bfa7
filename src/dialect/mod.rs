//! SQL dialects.
//!
//! A [`Dialect`] is plain data: native type names, integer width rules,
//! feature flags and limits for one server flavour. Everything that renders
//! SQL for a dialect lives in `impl Dialect` blocks spread over the
//! submodules:
//! - `quoting`: identifiers and literals
//! - `introspect`: catalog queries
//! - `ddl`: schema changes
//! - `binds`: inline parameter substitution

pub mod binds;
pub mod ddl;
pub mod introspect;
pub mod quoting;

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};

pub use binds::substitute_binds;
pub use ddl::{ColumnDefinition, ColumnOptions, IndexOptions};
pub use quoting::{
    quote_binary, quote_bound, quote_column_name, quote_ident, quote_literal, quote_string,
    quote_table_name, quote_value, split_table_name,
};

/// Capabilities a dialect declares. Consulted before emitting syntax the
/// server would reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub row_locks: bool,
    pub savepoints: bool,
    pub bulk_alter: bool,
    pub ddl_transactions: bool,
    /// ASC/DESC on index columns
    pub index_sort_order: bool,
    pub explain: bool,
    pub insert_returning: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub table_alias_length: usize,
    pub index_name_length: usize,
}

/// Application-level column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstractType {
    PrimaryKey,
    String,
    Text,
    Integer,
    Float,
    Decimal,
    #[serde(rename = "datetime")]
    DateTime,
    Timestamp,
    Time,
    Date,
    Binary,
    Boolean,
}

impl AbstractType {
    pub fn as_str(self) -> &'static str {
        match self {
            AbstractType::PrimaryKey => "primary_key",
            AbstractType::String => "string",
            AbstractType::Text => "text",
            AbstractType::Integer => "integer",
            AbstractType::Float => "float",
            AbstractType::Decimal => "decimal",
            AbstractType::DateTime => "datetime",
            AbstractType::Timestamp => "timestamp",
            AbstractType::Time => "time",
            AbstractType::Date => "date",
            AbstractType::Binary => "binary",
            AbstractType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for AbstractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbstractType {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "primary_key" => AbstractType::PrimaryKey,
            "string" => AbstractType::String,
            "text" => AbstractType::Text,
            "integer" => AbstractType::Integer,
            "float" => AbstractType::Float,
            "decimal" => AbstractType::Decimal,
            "datetime" => AbstractType::DateTime,
            "timestamp" => AbstractType::Timestamp,
            "time" => AbstractType::Time,
            "date" => AbstractType::Date,
            "binary" => AbstractType::Binary,
            "boolean" => AbstractType::Boolean,
            other => {
                return Err(AdapterError::Config(format!(
                    "Unknown column type: {}",
                    other
                )))
            }
        })
    }
}

/// Native type name and its default length, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeType {
    pub name: &'static str,
    pub limit: Option<u32>,
}

const fn native(name: &'static str) -> NativeType {
    NativeType { name, limit: None }
}

/// Integer type selection by byte width.
#[derive(Debug, Clone, Copy)]
struct IntegerRule {
    /// Used when no width is requested
    unspecified: &'static str,
    /// Inclusive byte ranges
    widths: &'static [(u32, u32, &'static str)],
}

/// Which catalog layout the server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    /// `information_schema` with constraint and index views (SQL Layer)
    Standard,
    /// Older layout with `type`/`nullable`/`position` column attributes and
    /// primary keys exposed as the `PRIMARY` index (Akiban)
    Legacy,
}

/// Largest decimal precision either server accepts.
pub const MAX_DECIMAL_PRECISION: u32 = 31;

/// Data describing one target server's SQL.
#[derive(Debug, Clone)]
pub struct Dialect {
    name: &'static str,
    features: Features,
    limits: Limits,
    native_types: &'static [(AbstractType, NativeType)],
    integers: IntegerRule,
    max_decimal_precision: u32,
    /// Type of a primary key column as added by `ALTER TABLE ... ADD COLUMN`
    pk_base: &'static str,
    /// Clause applied in a second statement after adding a primary key column
    identity: Option<&'static str>,
    catalog: Catalog,
}

static FDBSQL_TYPES: [(AbstractType, NativeType); 12] = [
    (
        AbstractType::PrimaryKey,
        native("bigint not null primary key generated by default as identity"),
    ),
    (
        AbstractType::String,
        NativeType {
            name: "varchar",
            limit: Some(255),
        },
    ),
    (AbstractType::Text, native("clob")),
    (AbstractType::Integer, native("integer")),
    (AbstractType::Float, native("float")),
    (AbstractType::Decimal, native("decimal")),
    (AbstractType::DateTime, native("datetime")),
    // Alias for datetime on the server
    (AbstractType::Timestamp, native("timestamp")),
    (AbstractType::Time, native("time")),
    (AbstractType::Date, native("date")),
    (AbstractType::Binary, native("blob")),
    (AbstractType::Boolean, native("boolean")),
];

static AKIBAN_TYPES: [(AbstractType, NativeType); 12] = [
    (AbstractType::PrimaryKey, native("serial primary key")),
    (
        AbstractType::String,
        NativeType {
            name: "varchar",
            limit: Some(255),
        },
    ),
    (AbstractType::Text, native("blob")),
    (AbstractType::Integer, native("integer")),
    (AbstractType::Float, native("float")),
    (AbstractType::Decimal, native("decimal")),
    (AbstractType::DateTime, native("datetime")),
    (AbstractType::Timestamp, native("timestamp")),
    (AbstractType::Time, native("time")),
    (AbstractType::Date, native("date")),
    (AbstractType::Binary, native("blob")),
    (AbstractType::Boolean, native("boolean")),
];

/// ASC/DESC and NULLS FIRST/LAST modifiers of an ORDER BY term.
static ORDER_MODIFIERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+(ASC|DESC)\s*(NULLS\s+(FIRST|LAST)\s*)?").expect("valid regex")
});

static TYPE_LIMIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d+)\)").expect("valid regex"));

impl Dialect {
    /// FoundationDB SQL Layer.
    pub fn fdbsql() -> Self {
        Self {
            name: "FDBSQL",
            features: Features {
                row_locks: false,
                savepoints: false,
                bulk_alter: false,
                ddl_transactions: false,
                index_sort_order: false,
                explain: true,
                insert_returning: true,
            },
            limits: Limits {
                table_alias_length: 64,
                index_name_length: 63,
            },
            native_types: &FDBSQL_TYPES,
            integers: IntegerRule {
                unspecified: "int",
                widths: &[(1, 4, "int"), (5, 8, "bigint")],
            },
            max_decimal_precision: MAX_DECIMAL_PRECISION,
            pk_base: "bigint not null primary key",
            identity: Some("generated by default as identity"),
            catalog: Catalog::Standard,
        }
    }

    /// The Akiban server the SQL Layer grew out of.
    pub fn akiban() -> Self {
        Self {
            name: "Akiban",
            features: Features {
                row_locks: false,
                savepoints: false,
                bulk_alter: false,
                ddl_transactions: false,
                index_sort_order: true,
                explain: true,
                insert_returning: true,
            },
            limits: Limits {
                table_alias_length: 64,
                index_name_length: 63,
            },
            native_types: &AKIBAN_TYPES,
            integers: IntegerRule {
                unspecified: "integer",
                widths: &[(1, 2, "smallint"), (3, 4, "integer"), (5, 8, "bigint")],
            },
            max_decimal_precision: MAX_DECIMAL_PRECISION,
            pk_base: "serial primary key",
            identity: None,
            catalog: Catalog::Legacy,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn catalog(&self) -> Catalog {
        self.catalog
    }

    pub fn native_type(&self, ty: AbstractType) -> Option<NativeType> {
        self.native_types
            .iter()
            .find(|(t, _)| *t == ty)
            .map(|(_, native)| *native)
    }

    /// Error for an operation the dialect cannot express.
    pub fn unsupported(&self, feature: &str) -> AdapterError {
        AdapterError::Unsupported {
            dialect: self.name.to_string(),
            feature: feature.to_string(),
        }
    }

    /// Native SQL type for an abstract column type.
    ///
    /// Integer widths outside every known range and unknown type names are
    /// `Config` errors. Decimal precision above the server maximum is clamped.
    pub fn type_to_sql(
        &self,
        type_name: &str,
        limit: Option<u32>,
        precision: Option<u32>,
        scale: Option<u32>,
    ) -> Result<String> {
        let ty: AbstractType = type_name.parse()?;
        match ty {
            AbstractType::Integer => self.integer_type(limit).map(str::to_string),
            AbstractType::Decimal => {
                let name = self.native_name(ty)?;
                match (precision, scale) {
                    (Some(p), Some(s)) => {
                        Ok(format!("{}({},{})", name, p.min(self.max_decimal_precision), s))
                    }
                    (Some(p), None) => Ok(format!("{}({})", name, p.min(self.max_decimal_precision))),
                    (None, Some(_)) => Err(AdapterError::Config(
                        "Error adding decimal column: precision cannot be empty if scale is specified"
                            .to_string(),
                    )),
                    (None, None) => Ok(name.to_string()),
                }
            }
            AbstractType::PrimaryKey => self.native_name(ty).map(str::to_string),
            _ => {
                let native = self
                    .native_type(ty)
                    .ok_or_else(|| AdapterError::Config(format!("Unknown column type: {}", ty)))?;
                match limit.or(native.limit) {
                    Some(limit) => Ok(format!("{}({})", native.name, limit)),
                    None => Ok(native.name.to_string()),
                }
            }
        }
    }

    fn native_name(&self, ty: AbstractType) -> Result<&'static str> {
        self.native_type(ty)
            .map(|n| n.name)
            .ok_or_else(|| AdapterError::Config(format!("Unknown column type: {}", ty)))
    }

    fn integer_type(&self, limit: Option<u32>) -> Result<&'static str> {
        let Some(limit) = limit else {
            return Ok(self.integers.unspecified);
        };
        self.integers
            .widths
            .iter()
            .find(|(lo, hi, _)| (*lo..=*hi).contains(&limit))
            .map(|(_, _, name)| *name)
            .ok_or_else(|| {
                AdapterError::Config(format!(
                    "No integer type has byte size {}. Use a decimal with precision 0 instead.",
                    limit
                ))
            })
    }

    /// Select list for `SELECT DISTINCT` combined with `ORDER BY`.
    ///
    /// The server requires every ORDER BY expression to appear in the select
    /// list, so each ordering expression that is not already selected is
    /// appended as `expr AS alias_<n>`, numbered from zero in order.
    pub fn distinct(&self, columns: &[&str], orders: &[&str]) -> String {
        let selected = columns.join(", ");
        let extra: Vec<String> = orders
            .iter()
            .map(|order| ORDER_MODIFIERS.replace_all(order, "").trim().to_string())
            .filter(|expr| !expr.is_empty())
            .filter(|expr| !columns.iter().any(|c| c.trim() == expr.as_str()))
            .enumerate()
            .map(|(i, expr)| format!("{} AS alias_{}", expr, i))
            .collect();

        if extra.is_empty() {
            format!("DISTINCT {}", selected)
        } else {
            format!("DISTINCT {}, {}", selected, extra.join(", "))
        }
    }

    /// Row-lock clause to append to a SELECT, or nothing when the server
    /// has no row locks.
    pub fn lock_clause<'a>(&self, requested: &'a str) -> Option<&'a str> {
        if self.features.row_locks && !requested.is_empty() {
            Some(requested)
        } else {
            None
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::fdbsql()
    }
}

/// Abstract type for a declared column type string.
pub fn simplified_type(sql_type: &str) -> Option<AbstractType> {
    let t = sql_type.to_ascii_lowercase();
    let ty = if t.contains("int") {
        AbstractType::Integer
    } else if t.contains("float") || t.contains("double") || t.contains("real") {
        AbstractType::Float
    } else if t.contains("decimal") || t.contains("numeric") {
        if extract_scale(&t) == Some(0) {
            AbstractType::Integer
        } else {
            AbstractType::Decimal
        }
    } else if t.contains("datetime") {
        AbstractType::DateTime
    } else if t.contains("timestamp") {
        AbstractType::Timestamp
    } else if t.contains("time") {
        AbstractType::Time
    } else if t.contains("date") {
        AbstractType::Date
    } else if t.contains("clob") || t.contains("text") {
        AbstractType::Text
    } else if t.contains("blob") || t.contains("binary") {
        AbstractType::Binary
    } else if t.contains("char") || t.contains("string") {
        AbstractType::String
    } else if t.contains("bool") {
        AbstractType::Boolean
    } else {
        return None;
    };
    Some(ty)
}

/// Declared length of a type string; `bigint` is 8 bytes.
pub fn extract_limit(sql_type: &str) -> Option<u32> {
    if sql_type.to_ascii_lowercase().starts_with("bigint") {
        return Some(8);
    }
    TYPE_LIMIT
        .captures(sql_type)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Scale of `decimal(p,s)`; `decimal(p)` has scale 0.
pub fn extract_scale(sql_type: &str) -> Option<u32> {
    let (_, args) = sql_type.split_once('(')?;
    let args = args.split_once(')')?.0;
    match args.split_once(',') {
        Some((_, scale)) => scale.trim().parse().ok(),
        None => Some(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_width_selection() {
        let d = Dialect::fdbsql();
        assert_eq!(d.type_to_sql("integer", Some(4), None, None).unwrap(), "int");
        assert_eq!(d.type_to_sql("integer", Some(1), None, None).unwrap(), "int");
        assert_eq!(d.type_to_sql("integer", None, None, None).unwrap(), "int");
        assert_eq!(d.type_to_sql("integer", Some(8), None, None).unwrap(), "bigint");

        let err = d.type_to_sql("integer", Some(16), None, None).unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)));
        assert!(d.type_to_sql("integer", Some(0), None, None).is_err());
    }

    #[test]
    fn test_akiban_integer_widths() {
        let d = Dialect::akiban();
        assert_eq!(d.type_to_sql("integer", None, None, None).unwrap(), "integer");
        assert_eq!(d.type_to_sql("integer", Some(2), None, None).unwrap(), "smallint");
        assert_eq!(d.type_to_sql("integer", Some(3), None, None).unwrap(), "integer");
        assert_eq!(d.type_to_sql("integer", Some(6), None, None).unwrap(), "bigint");
        assert!(d.type_to_sql("integer", Some(9), None, None).is_err());
    }

    #[test]
    fn test_decimal_precision_clamped() {
        let d = Dialect::fdbsql();
        assert_eq!(
            d.type_to_sql("decimal", None, Some(40), Some(2)).unwrap(),
            "decimal(31,2)"
        );
        assert_eq!(
            d.type_to_sql("decimal", None, Some(10), Some(2)).unwrap(),
            "decimal(10,2)"
        );
        assert_eq!(d.type_to_sql("decimal", None, Some(12), None).unwrap(), "decimal(12)");
        assert_eq!(d.type_to_sql("decimal", None, None, None).unwrap(), "decimal");
        assert!(d.type_to_sql("decimal", None, None, Some(2)).is_err());
    }

    #[test]
    fn test_native_type_names() {
        let d = Dialect::fdbsql();
        assert_eq!(d.type_to_sql("string", None, None, None).unwrap(), "varchar(255)");
        assert_eq!(d.type_to_sql("string", Some(40), None, None).unwrap(), "varchar(40)");
        assert_eq!(d.type_to_sql("text", None, None, None).unwrap(), "clob");
        assert_eq!(d.type_to_sql("binary", None, None, None).unwrap(), "blob");
        assert_eq!(
            d.type_to_sql("primary_key", None, None, None).unwrap(),
            "bigint not null primary key generated by default as identity"
        );

        let a = Dialect::akiban();
        assert_eq!(a.type_to_sql("text", None, None, None).unwrap(), "blob");
        assert_eq!(
            a.type_to_sql("primary_key", None, None, None).unwrap(),
            "serial primary key"
        );
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        let err = Dialect::fdbsql()
            .type_to_sql("geometry", None, None, None)
            .unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)));
    }

    #[test]
    fn test_distinct_aliases_order_columns() {
        let d = Dialect::fdbsql();
        assert_eq!(
            d.distinct(&["name"], &["created_at DESC"]),
            "DISTINCT name, created_at AS alias_0"
        );
        assert_eq!(
            d.distinct(&["id", "name"], &["name ASC", "posts.score desc nulls last", "LOWER(title)"]),
            "DISTINCT id, name, posts.score AS alias_0, LOWER(title) AS alias_1"
        );
        assert_eq!(d.distinct(&["name"], &[]), "DISTINCT name");
        assert_eq!(d.distinct(&["name"], &["  "]), "DISTINCT name");
    }

    #[test]
    fn test_feature_flags() {
        let f = Dialect::fdbsql().features();
        assert!(!f.row_locks);
        assert!(!f.savepoints);
        assert!(!f.bulk_alter);
        assert!(!f.ddl_transactions);
        assert!(!f.index_sort_order);
        assert!(f.explain);
        assert!(f.insert_returning);
        assert!(Dialect::akiban().features().index_sort_order);

        let limits = Dialect::fdbsql().limits();
        assert_eq!(limits.table_alias_length, 64);
        assert_eq!(limits.index_name_length, 63);
    }

    #[test]
    fn test_lock_clause_dropped_without_row_locks() {
        assert_eq!(Dialect::fdbsql().lock_clause("FOR UPDATE"), None);
    }

    #[test]
    fn test_simplified_type_and_limit() {
        assert_eq!(simplified_type("BIGINT"), Some(AbstractType::Integer));
        assert_eq!(simplified_type("decimal(10,0)"), Some(AbstractType::Integer));
        assert_eq!(simplified_type("decimal(10,2)"), Some(AbstractType::Decimal));
        assert_eq!(simplified_type("varchar(32)"), Some(AbstractType::String));
        assert_eq!(simplified_type("datetime"), Some(AbstractType::DateTime));
        assert_eq!(simplified_type("time"), Some(AbstractType::Time));
        assert_eq!(simplified_type("clob"), Some(AbstractType::Text));
        assert_eq!(simplified_type("double"), Some(AbstractType::Float));
        assert_eq!(simplified_type("geometry"), None);

        assert_eq!(extract_limit("bigint"), Some(8));
        assert_eq!(extract_limit("varchar(32)"), Some(32));
        assert_eq!(extract_limit("int"), None);
        assert_eq!(extract_scale("decimal(10,2)"), Some(2));
        assert_eq!(extract_scale("decimal"), None);
    }
}
