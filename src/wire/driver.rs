//! Seam between the adapter core and the transport.
//!
//! A [`Driver`] owns one physical connection and speaks the wire protocol.
//! The core only needs raw text queries, named prepared statements and
//! liveness control from it.

use async_trait::async_trait;
use bytes::Bytes;

use super::error::DriverResult;
use super::types::{Format, TypeId, WireParameter};

/// Transaction state reported by the server after each round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Idle (not in a transaction block)
    Idle,
    /// In a transaction block
    InTransaction,
    /// In a failed transaction block
    Failed,
}

impl From<u8> for TransactionStatus {
    fn from(b: u8) -> Self {
        match b {
            b'T' => TransactionStatus::InTransaction,
            b'E' => TransactionStatus::Failed,
            _ => TransactionStatus::Idle,
        }
    }
}

/// Description of one result field as reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    pub name: String,
    pub type_id: TypeId,
    /// Type modifier (`-1` when absent). Decimals pack precision and scale here.
    pub type_modifier: i32,
    pub format: Format,
    /// Nullability, when the transport knows it.
    pub nullable: Option<bool>,
}

impl RawField {
    pub fn new(name: impl Into<String>, type_id: TypeId) -> Self {
        Self {
            name: name.into(),
            type_id,
            type_modifier: -1,
            format: Format::Text,
            nullable: None,
        }
    }

    pub fn with_modifier(mut self, type_modifier: i32) -> Self {
        self.type_modifier = type_modifier;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }
}

/// Undecoded result of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub fields: Vec<RawField>,
    /// Row payloads; `None` is SQL NULL.
    pub rows: Vec<Vec<Option<Bytes>>>,
    /// Command tag (e.g., "SELECT 5" or "INSERT 0 1")
    pub command_tag: String,
}

impl RawResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Result of a command that returns no rows.
    pub fn command(tag: impl Into<String>) -> Self {
        Self {
            command_tag: tag.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Whether the statement produced a row set (even an empty one).
    #[inline]
    pub fn returns_rows(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Number of rows affected, taken from the trailing count of the command tag.
    pub fn affected_rows(&self) -> u64 {
        self.command_tag
            .rsplit(' ')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }
}

/// A transport capable of executing SQL on one physical connection.
///
/// Calls on a driver are strictly sequential: the `&mut self` receivers mean
/// at most one round trip is ever in flight.
#[async_trait]
pub trait Driver: Send {
    /// Send SQL text directly, without preparing it.
    async fn simple_query(&mut self, sql: &str) -> DriverResult<RawResult>;

    /// Create a named server-side prepared statement.
    async fn prepare(&mut self, name: &str, sql: &str) -> DriverResult<()>;

    /// Execute a previously prepared statement with encoded parameters.
    async fn execute_prepared(
        &mut self,
        name: &str,
        params: &[WireParameter],
    ) -> DriverResult<RawResult>;

    /// Release a named prepared statement.
    async fn deallocate(&mut self, name: &str) -> DriverResult<()>;

    /// Whether the physical connection is still usable.
    fn is_alive(&self) -> bool;

    /// Re-establish the physical connection. Server-side statements do not
    /// survive this.
    async fn reset(&mut self) -> DriverResult<()>;

    /// Close the physical connection.
    async fn close(&mut self) -> DriverResult<()>;

    /// Transaction state after the last round trip.
    fn transaction_status(&self) -> TransactionStatus {
        TransactionStatus::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affected_rows_from_tag() {
        assert_eq!(RawResult::command("INSERT 0 3").affected_rows(), 3);
        assert_eq!(RawResult::command("UPDATE 12").affected_rows(), 12);
        assert_eq!(RawResult::command("DELETE 0").affected_rows(), 0);
        assert_eq!(RawResult::command("CREATE TABLE").affected_rows(), 0);
        assert_eq!(RawResult::empty().affected_rows(), 0);
    }

    #[test]
    fn test_transaction_status_from_byte() {
        assert_eq!(TransactionStatus::from(b'I'), TransactionStatus::Idle);
        assert_eq!(TransactionStatus::from(b'T'), TransactionStatus::InTransaction);
        assert_eq!(TransactionStatus::from(b'E'), TransactionStatus::Failed);
    }
}
