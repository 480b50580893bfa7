//! Uniform result shapes returned by the execution engine.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{AdapterError, Result};
use crate::wire::types::{Format, TypeId, Value, WireType};

/// Description of one result-set field, resolved against the type registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared SQL type (e.g. `decimal(10,2)`)
    pub sql_type: String,
    pub nullable: bool,
    /// Wire type whose codec decodes this column
    pub wire_type: WireType,
    /// Type id as the server reported it
    pub type_id: TypeId,
    pub format: Format,
}

/// A decoded row.
/// Uses SmallVec to inline storage for rows with ≤16 columns (most tables),
/// avoiding heap allocation for typical workloads.
pub type Row = SmallVec<[Value; 16]>;

/// Shared column descriptions - wrapped in Arc so rows can be handed out
/// without copying them.
pub type SharedColumns = Arc<Vec<ColumnDescriptor>>;

/// Rows and field descriptors of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: SharedColumns,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn new(columns: Vec<ColumnDescriptor>, rows: Vec<Row>) -> Self {
        Self {
            columns: Arc::new(columns),
            rows,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Get a single row, failing if there is not exactly one.
    pub fn one(&self) -> Result<&Row> {
        match self.rows.as_slice() {
            [row] => Ok(row),
            rows => Err(AdapterError::Type(format!(
                "Expected exactly 1 row, got {}",
                rows.len()
            ))),
        }
    }

    /// First column of the first row, or NULL when there are no rows.
    pub fn scalar(&self) -> Value {
        self.rows
            .first()
            .and_then(|row| row.first())
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// First column of every row.
    pub fn scalars(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.first().cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// All values of the named column.
    pub fn column(&self, name: &str) -> Result<Vec<Value>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| AdapterError::Type(format!("Column '{}' not found", name)))?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(idx).cloned().unwrap_or(Value::Null))
            .collect())
    }
}

/// Outcome of one executed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecResult {
    /// The statement produced a row set.
    Rows(QueryResult),
    /// The statement changed data or schema; count of affected rows.
    Affected(u64),
}

impl ExecResult {
    /// Rows of a query; an empty result for a mutation.
    pub fn into_rows(self) -> QueryResult {
        match self {
            ExecResult::Rows(result) => result,
            ExecResult::Affected(_) => QueryResult::empty(),
        }
    }

    /// Affected count of a mutation; the row count for a query.
    pub fn affected(&self) -> u64 {
        match self {
            ExecResult::Rows(result) => result.len() as u64,
            ExecResult::Affected(n) => *n,
        }
    }
}
