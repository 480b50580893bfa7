//! Connection and execution engine.
//!
//! A [`Connection`] wraps one [`Driver`] and owns that connection's
//! statement cache. Each operation runs end to end:
//! - choose the cached (prepared) or uncached path
//! - encode parameters and decode rows through the type registry
//! - classify server failures, recovering stale statements locally
//!
//! All methods take `&mut self`, so a connection never has two operations
//! in flight.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use super::driver::{Driver, RawResult, TransactionStatus};
use super::error::{classify_error, DriverError};
use super::statement::StatementCache;
use super::types::{BoundParameter, TypeRegistry, Value, WireParameter};
use crate::config::AdapterConfig;
use crate::dialect::{
    quote_column_name, quote_ident, quote_literal, split_table_name, substitute_binds,
    ColumnDefinition, ColumnOptions, Dialect, IndexOptions,
};
use crate::error::{AdapterError, Result};
use crate::executor::{ExecResult, QueryResult, Row};
use crate::schema::{ColumnInfo, IndexInfo, PrimaryKeyInfo};

/// How many times a statement reported stale is re-prepared and retried.
const STALE_RETRIES: usize = 1;

/// Leading keywords of statements that never go through the statement cache.
const UNCACHED_KEYWORDS: &[&str] = &[
    "CREATE", "ALTER", "DROP", "RENAME", "TRUNCATE", "BEGIN", "START", "COMMIT", "ROLLBACK",
    "SAVEPOINT", "RELEASE", "SET", "CALL",
];

/// Table name of an `INSERT INTO t (...) VALUES (...)` statement.
static INSERT_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)into\s+([^(\s]+)\s*(?:\([^)]*\))?\s*values\s*\(").expect("valid regex")
});

/// Whether `sql` is DDL or administrative and must bypass the cache.
pub fn is_uncached_statement(sql: &str) -> bool {
    let first = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("");
    UNCACHED_KEYWORDS
        .iter()
        .any(|kw| kw.eq_ignore_ascii_case(first))
}

// ============================================================================
// Connection
// ============================================================================

/// One logical connection to the server.
pub struct Connection<D: Driver> {
    driver: D,
    registry: Arc<TypeRegistry>,
    dialect: Dialect,
    config: AdapterConfig,
    /// Prepared statements on this physical connection
    statements: StatementCache,
    open_transactions: u32,
    /// Set after a connection-level failure until `reconnect` succeeds
    broken: bool,
}

impl<D: Driver> Connection<D> {
    /// Wrap a connected driver and apply session settings.
    pub async fn open(driver: D, config: AdapterConfig, registry: Arc<TypeRegistry>) -> Result<Self> {
        config.validate()?;
        let mut conn = Self {
            driver,
            registry,
            dialect: config.dialect.dialect(),
            statements: StatementCache::new(config.statement_limit),
            config,
            open_transactions: 0,
            broken: false,
        };
        conn.configure().await?;
        Ok(conn)
    }

    async fn configure(&mut self) -> Result<()> {
        if let Some(encoding) = self.config.encoding.clone() {
            let sql = format!("SET client_encoding = {}", quote_literal(&encoding));
            self.exec_no_cache(&sql).await?;
        }
        Ok(())
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Get a reference to the statement cache.
    pub fn statement_cache(&self) -> &StatementCache {
        &self.statements
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn open_transactions(&self) -> u32 {
        self.open_transactions
    }

    fn cache_key(&self, sql: &str) -> String {
        format!("{}-{}", self.config.cache_prefix(), sql)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.broken {
            return Err(AdapterError::ConnectionLost(
                "connection must be re-established with reconnect".to_string(),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Execute one statement.
    ///
    /// Without parameters the text is sent as is. With parameters it is
    /// prepared and cached, unless prepared statements are disabled or the
    /// statement is DDL or transaction control, in which case the values are
    /// inlined as literals.
    pub async fn execute(&mut self, sql: &str, params: &[BoundParameter]) -> Result<ExecResult> {
        self.ensure_usable()?;
        let raw = if params.is_empty() {
            self.exec_no_cache(sql).await?
        } else if !self.config.prepared_statements || is_uncached_statement(sql) {
            let text = substitute_binds(sql, params)?;
            self.exec_no_cache(&text).await?
        } else {
            self.exec_cache(sql, params).await?
        };
        self.build_result(raw)
    }

    async fn exec_no_cache(&mut self, sql: &str) -> Result<RawResult> {
        debug!(sql = %sql, "Executing uncached statement");
        match self.driver.simple_query(sql).await {
            Ok(raw) => Ok(raw),
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn exec_cache(&mut self, sql: &str, params: &[BoundParameter]) -> Result<RawResult> {
        let encoded = params
            .iter()
            .map(|p| self.registry.encode_bound(p))
            .collect::<Result<Vec<WireParameter>>>()?;
        let key = self.cache_key(sql);

        let mut attempt = 0;
        loop {
            let stmt = match self.statements.resolve(&mut self.driver, &key, sql).await {
                Ok(stmt) => stmt,
                Err(e) => return Err(self.fail(e).await),
            };

            let err = match self.driver.execute_prepared(&stmt.name, &encoded).await {
                Ok(raw) => return Ok(raw),
                Err(e) => e,
            };

            if attempt < STALE_RETRIES && !err.is_connection_failure() && classify_error(&err).is_stale()
            {
                warn!(statement = %stmt.name, "Prepared statement is stale, preparing again");
                self.statements.delete(&mut self.driver, &key).await;
                attempt += 1;
                continue;
            }
            return Err(self.fail(err).await);
        }
    }

    /// Convert a driver failure. Connection-level failures invalidate every
    /// cached statement and mark the connection unusable.
    async fn fail(&mut self, err: DriverError) -> AdapterError {
        if err.is_connection_failure() {
            warn!(error = %err, "Connection failed, clearing statement cache");
            self.statements.clear(&mut self.driver).await;
            self.broken = true;
            AdapterError::ConnectionLost(err.to_string())
        } else {
            AdapterError::Statement(classify_error(&err))
        }
    }

    fn build_result(&self, raw: RawResult) -> Result<ExecResult> {
        if !raw.returns_rows() {
            return Ok(ExecResult::Affected(raw.affected_rows()));
        }

        let columns: Vec<_> = raw.fields.iter().map(|f| self.registry.describe(f)).collect();
        let mut rows = Vec::with_capacity(raw.rows.len());
        for values in &raw.rows {
            if values.len() != columns.len() {
                return Err(AdapterError::Type(format!(
                    "Row has {} values for {} columns",
                    values.len(),
                    columns.len()
                )));
            }
            let mut row = Row::with_capacity(columns.len());
            for (column, value) in columns.iter().zip(values) {
                row.push(self.registry.decode_column(column, value.as_deref())?);
            }
            rows.push(row);
        }
        Ok(ExecResult::Rows(QueryResult::new(columns, rows)))
    }

    /// Execute and return the row set (empty for statements without rows).
    pub async fn exec_query(&mut self, sql: &str, params: &[BoundParameter]) -> Result<QueryResult> {
        Ok(self.execute(sql, params).await?.into_rows())
    }

    /// Execute an UPDATE and return the number of affected rows.
    pub async fn exec_update(&mut self, sql: &str, params: &[BoundParameter]) -> Result<u64> {
        Ok(self.execute(sql, params).await?.affected())
    }

    /// Execute a DELETE and return the number of affected rows.
    pub async fn exec_delete(&mut self, sql: &str, params: &[BoundParameter]) -> Result<u64> {
        self.exec_update(sql, params).await
    }

    pub async fn select_rows(&mut self, sql: &str, params: &[BoundParameter]) -> Result<Vec<Row>> {
        Ok(self.exec_query(sql, params).await?.rows)
    }

    /// First column of the first row, or NULL.
    pub async fn select_value(&mut self, sql: &str, params: &[BoundParameter]) -> Result<Value> {
        Ok(self.exec_query(sql, params).await?.scalar())
    }

    pub async fn explain(&mut self, sql: &str, params: &[BoundParameter]) -> Result<QueryResult> {
        if !self.dialect.features().explain {
            return Err(self.dialect.unsupported("EXPLAIN"));
        }
        self.exec_query(&format!("EXPLAIN {}", sql), params).await
    }

    /// Execute an INSERT and return the generated key.
    ///
    /// The key column defaults to the primary key of the table named in the
    /// statement. Returns NULL when no key can be determined or the dialect
    /// cannot return it.
    pub async fn insert_returning(
        &mut self,
        sql: &str,
        primary_key: Option<&str>,
        params: &[BoundParameter],
    ) -> Result<Value> {
        let pk = match primary_key {
            Some(pk) => Some(pk.to_string()),
            None => match INSERT_TABLE.captures(sql).and_then(|c| c.get(1)) {
                Some(table) => {
                    let table = table.as_str().replace('"', "");
                    self.primary_key(&table).await?
                }
                None => None,
            },
        };

        match pk {
            Some(pk) if self.dialect.features().insert_returning => {
                let sql = format!("{} RETURNING {}", sql, quote_column_name(&pk));
                self.select_value(&sql, params).await
            }
            _ => {
                self.execute(sql, params).await?;
                Ok(Value::Null)
            }
        }
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    pub async fn begin_db_transaction(&mut self) -> Result<()> {
        if self.open_transactions > 0 && !self.dialect.features().savepoints {
            return Err(AdapterError::Transaction(format!(
                "Nested transactions are not supported by {}",
                self.dialect.name()
            )));
        }
        self.execute("BEGIN", &[]).await?;
        self.open_transactions += 1;
        Ok(())
    }

    pub async fn commit_db_transaction(&mut self) -> Result<()> {
        if self.open_transactions == 0 {
            return Err(AdapterError::Transaction(
                "No transaction in progress".to_string(),
            ));
        }
        // The server ends the transaction even when COMMIT fails
        self.open_transactions -= 1;
        self.execute("COMMIT", &[]).await?;
        Ok(())
    }

    pub async fn rollback_db_transaction(&mut self) -> Result<()> {
        if self.open_transactions == 0 {
            return Err(AdapterError::Transaction(
                "No transaction in progress".to_string(),
            ));
        }
        self.open_transactions -= 1;
        self.execute("ROLLBACK", &[]).await?;
        Ok(())
    }

    /// Whether the server reports no open transaction.
    pub fn outside_transaction(&self) -> bool {
        self.driver.transaction_status() == TransactionStatus::Idle
    }

    pub async fn create_savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_statement("SAVEPOINT", name).await
    }

    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_statement("RELEASE SAVEPOINT", name).await
    }

    pub async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_statement("ROLLBACK TO SAVEPOINT", name).await
    }

    async fn savepoint_statement(&mut self, verb: &str, name: &str) -> Result<()> {
        if !self.dialect.features().savepoints {
            return Err(self.dialect.unsupported("savepoints"));
        }
        self.execute(&format!("{} {}", verb, quote_ident(name)), &[])
            .await?;
        Ok(())
    }

    // ========================================================================
    // Connection management
    // ========================================================================

    /// Round-trip a trivial query.
    ///
    /// A connection-level failure marks the connection broken like any
    /// other operation would.
    pub async fn is_active(&mut self) -> bool {
        if self.broken {
            return false;
        }
        match self.driver.simple_query("SELECT 1").await {
            Ok(_) => true,
            Err(e) => {
                let err = self.fail(e).await;
                debug!(error = %err, "Connection is not active");
                false
            }
        }
    }

    /// Re-establish the physical connection.
    ///
    /// Every cached statement is dropped first: handles do not survive a new
    /// connection.
    pub async fn reconnect(&mut self) -> Result<()> {
        info!(database = %self.config.database, "Reconnecting");
        self.statements.clear(&mut self.driver).await;
        self.driver
            .reset()
            .await
            .map_err(|e| AdapterError::ConnectionLost(e.to_string()))?;
        self.broken = false;
        self.open_transactions = 0;
        self.configure().await
    }

    /// Close the physical connection. Failures are ignored.
    pub async fn disconnect(&mut self) {
        self.statements.clear(&mut self.driver).await;
        if let Err(e) = self.driver.close().await {
            debug!(error = %e, "Error while closing connection");
        }
        self.broken = true;
    }

    pub async fn reset(&mut self) {
        info!("Resetting connection state");
        self.clear_cache().await;
    }

    /// Deallocate and forget every cached statement.
    pub async fn clear_cache(&mut self) {
        self.statements.clear(&mut self.driver).await;
    }

    // ========================================================================
    // Schema
    // ========================================================================

    async fn execute_schema(&mut self, sql: &str) -> Result<()> {
        self.execute(sql, &[]).await?;
        Ok(())
    }

    async fn execute_all(&mut self, statements: Vec<String>) -> Result<()> {
        for sql in statements {
            self.execute_schema(&sql).await?;
        }
        Ok(())
    }

    async fn first_column(&mut self, sql: &str) -> Result<Vec<String>> {
        Ok(self
            .select_rows(sql, &[])
            .await?
            .iter()
            .filter_map(|row| row.first().and_then(Value::to_text))
            .collect())
    }

    /// Tables in `schema`, or the current schema.
    pub async fn tables(&mut self, schema: Option<&str>) -> Result<Vec<String>> {
        let sql = self.dialect.list_tables(schema, None);
        self.first_column(&sql).await
    }

    /// Whether a table exists. A qualified name looks in that schema only.
    pub async fn table_exists(&mut self, table_name: &str) -> Result<bool> {
        if table_name.is_empty() {
            return Ok(false);
        }
        let (schema, table) = split_table_name(table_name);
        let sql = self.dialect.list_tables(schema, Some(table));
        Ok(!self.first_column(&sql).await?.is_empty())
    }

    pub async fn columns(&mut self, table_name: &str) -> Result<Vec<ColumnInfo>> {
        let sql = self.dialect.list_columns(table_name);
        let rows = self.select_rows(&sql, &[]).await?;
        rows.iter().map(ColumnInfo::from_row).collect()
    }

    /// Secondary indexes with their columns.
    pub async fn indexes(&mut self, table_name: &str) -> Result<Vec<IndexInfo>> {
        let sql = self.dialect.list_indexes(table_name);
        let index_rows = self.select_rows(&sql, &[]).await?;

        let mut indexes = Vec::with_capacity(index_rows.len());
        for index_row in &index_rows {
            let Some(name) = index_row.first().and_then(Value::to_text) else {
                continue;
            };
            let sql = self.dialect.index_columns(table_name, &name);
            let column_rows = self.select_rows(&sql, &[]).await?;
            indexes.push(IndexInfo::from_rows(table_name, index_row, &column_rows)?);
        }
        Ok(indexes)
    }

    pub async fn pk_and_sequence_for(&mut self, table_name: &str) -> Result<Option<PrimaryKeyInfo>> {
        let sql = self.dialect.primary_key_of(table_name, true);
        let rows = self.select_rows(&sql, &[]).await?;
        PrimaryKeyInfo::from_rows(&rows, true)
    }

    pub async fn primary_key(&mut self, table_name: &str) -> Result<Option<String>> {
        Ok(self
            .pk_and_sequence_for(table_name)
            .await?
            .map(|pk| pk.column))
    }

    /// Restart the primary key sequence just past the current maximum key.
    ///
    /// Returns the value the sequence was restarted at, or `None` when the
    /// table has no sequence-backed key.
    pub async fn reset_pk_sequence(&mut self, table_name: &str) -> Result<Option<i64>> {
        let Some(pk) = self.pk_and_sequence_for(table_name).await? else {
            return Ok(None);
        };
        let (Some(seq_schema), Some(seq_name)) = (pk.sequence_schema, pk.sequence_name) else {
            warn!(table = %table_name, primary_key = %pk.column, "Primary key has no sequence");
            return Ok(None);
        };

        let sql = self
            .dialect
            .sequence_bounds(table_name, &pk.column, &seq_schema, &seq_name);
        let Some(next) = self.select_value(&sql, &[]).await?.as_i64() else {
            warn!(table = %table_name, primary_key = %pk.column, "Unable to determine max value");
            return Ok(None);
        };

        let restart = self.dialect.restart_sequence(&seq_schema, &seq_name, next);
        if self.open_transactions > 0 {
            // Sequence changes are not transactional; run outside the open transaction
            self.execute_all(vec!["COMMIT".to_string(), restart, "BEGIN".to_string()])
                .await?;
        } else {
            self.execute_schema(&restart).await?;
        }
        Ok(Some(next))
    }

    pub async fn create_database(&mut self, name: &str) -> Result<()> {
        let sql = self.dialect.create_schema(name);
        self.execute_schema(&sql).await
    }

    pub async fn drop_database(&mut self, name: &str) -> Result<()> {
        let sql = self.dialect.drop_schema(name);
        self.execute_schema(&sql).await
    }

    pub async fn recreate_database(&mut self, name: &str) -> Result<()> {
        self.drop_database(name).await?;
        self.create_database(name).await
    }

    pub async fn create_table(
        &mut self,
        table_name: &str,
        primary_key: Option<&str>,
        columns: &[ColumnDefinition],
    ) -> Result<()> {
        let sql = self.dialect.create_table(table_name, primary_key, columns)?;
        self.execute_schema(&sql).await
    }

    pub async fn drop_table(&mut self, table_name: &str, if_exists: bool) -> Result<()> {
        let sql = self.dialect.drop_table(table_name, if_exists);
        self.execute_schema(&sql).await
    }

    pub async fn rename_table(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let sql = self.dialect.rename_table(old_name, new_name);
        self.execute_schema(&sql).await
    }

    pub async fn add_column(
        &mut self,
        table_name: &str,
        column_name: &str,
        type_name: &str,
        options: &ColumnOptions,
    ) -> Result<()> {
        let statements = self
            .dialect
            .add_column(table_name, column_name, type_name, options)?;
        self.execute_all(statements).await
    }

    pub async fn remove_column(&mut self, table_name: &str, column_name: &str) -> Result<()> {
        let sql = self.dialect.remove_column(table_name, column_name);
        self.execute_schema(&sql).await
    }

    pub async fn change_column(
        &mut self,
        table_name: &str,
        column_name: &str,
        type_name: &str,
        options: &ColumnOptions,
    ) -> Result<()> {
        let statements = self
            .dialect
            .change_column(table_name, column_name, type_name, options)?;
        self.execute_all(statements).await
    }

    pub async fn change_column_default(
        &mut self,
        table_name: &str,
        column_name: &str,
        default: &Value,
    ) -> Result<()> {
        let sql = self
            .dialect
            .change_column_default(table_name, column_name, default);
        self.execute_schema(&sql).await
    }

    pub async fn change_column_null(
        &mut self,
        table_name: &str,
        column_name: &str,
        null: bool,
    ) -> Result<()> {
        let sql = self.dialect.change_column_null(table_name, column_name, null);
        self.execute_schema(&sql).await
    }

    /// Rename a column. Cached statements may reference the old name, so the
    /// cache is cleared first.
    pub async fn rename_column(
        &mut self,
        table_name: &str,
        column_name: &str,
        new_column_name: &str,
    ) -> Result<()> {
        let exists = self
            .columns(table_name)
            .await?
            .iter()
            .any(|c| c.name == column_name);
        if !exists {
            return Err(AdapterError::Config(format!(
                "No such column {}.{}",
                table_name, column_name
            )));
        }
        self.clear_cache().await;
        let sql = self
            .dialect
            .rename_column(table_name, column_name, new_column_name);
        self.execute_schema(&sql).await
    }

    pub async fn add_index(
        &mut self,
        table_name: &str,
        columns: &[&str],
        options: &IndexOptions,
    ) -> Result<()> {
        let sql = self.dialect.add_index(table_name, columns, options)?;
        self.execute_schema(&sql).await
    }

    pub async fn remove_index(&mut self, table_name: &str, index_name: &str) -> Result<()> {
        let sql = self.dialect.remove_index(table_name, index_name);
        self.execute_schema(&sql).await
    }
}
