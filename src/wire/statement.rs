//! Prepared statement management and caching.
//!
//! This module provides:
//! - `CachedStatement`: a server-side prepared statement handle
//! - `StatementCache`: a bounded, insertion-ordered cache of those handles
//!
//! One cache belongs to exactly one connection. Handles are only valid on the
//! connection that prepared them, so a cache is never shared.

use std::sync::Arc;

use lru::LruCache;
use tracing::{debug, warn};

use super::driver::Driver;
use super::error::DriverResult;

/// Default number of statements kept per connection.
pub const DEFAULT_STATEMENT_LIMIT: usize = 1000;

// ============================================================================
// Cached Statement
// ============================================================================

/// A prepared statement registered on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedStatement {
    /// Server-side name for this statement (e.g., "fdb_1")
    pub name: String,
    /// The SQL text it was prepared from
    pub sql: String,
    /// Insertion sequence; lower values are evicted first
    pub sequence: u64,
}

// ============================================================================
// Statement Cache (FIFO)
// ============================================================================

/// Bounded cache from cache key to prepared statement.
///
/// Eviction is by insertion order: lookups never refresh an entry. Entries
/// are deallocated on the server before their bookkeeping is dropped.
pub struct StatementCache {
    /// Cache key → statement, oldest insertion at the LRU end. Only `peek`
    /// is used for lookups so the order stays the insertion order.
    cache: LruCache<String, Arc<CachedStatement>>,
    capacity: usize,
    /// Counter for generating unique statement names
    next_id: u64,
}

impl StatementCache {
    /// Create a new statement cache with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::unbounded(),
            capacity: capacity.max(1),
            next_id: 0,
        }
    }

    /// Get a cached statement by key without preparing anything.
    pub fn get(&self, key: &str) -> Option<Arc<CachedStatement>> {
        self.cache.peek(key).map(Arc::clone)
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.cache.contains(key)
    }

    /// Return the statement for `key`, preparing `sql` on the server first if
    /// it is not cached yet.
    ///
    /// A failed prepare propagates and leaves the cache untouched. When the
    /// cache is full the oldest entries are deallocated and evicted before
    /// the new one is registered.
    pub async fn resolve<D>(
        &mut self,
        driver: &mut D,
        key: &str,
        sql: &str,
    ) -> DriverResult<Arc<CachedStatement>>
    where
        D: Driver + ?Sized,
    {
        if let Some(stmt) = self.cache.peek(key) {
            return Ok(Arc::clone(stmt));
        }

        let name = self.next_statement_name();
        driver.prepare(&name, sql).await?;
        debug!(statement = %name, "Prepared statement");

        while self.cache.len() >= self.capacity {
            let Some((_, oldest)) = self.cache.peek_lru() else {
                break;
            };
            let oldest_name = oldest.name.clone();
            dealloc(driver, &oldest_name).await;
            self.cache.pop_lru();
            debug!(statement = %oldest_name, "Evicted prepared statement");
        }

        let stmt = Arc::new(CachedStatement {
            name,
            sql: sql.to_string(),
            sequence: self.next_id,
        });
        self.cache.put(key.to_string(), Arc::clone(&stmt));
        Ok(stmt)
    }

    /// Invalidate one entry, deallocating it on the server.
    ///
    /// Returns whether an entry was present.
    pub async fn delete<D>(&mut self, driver: &mut D, key: &str) -> bool
    where
        D: Driver + ?Sized,
    {
        let Some(name) = self.cache.peek(key).map(|stmt| stmt.name.clone()) else {
            return false;
        };
        dealloc(driver, &name).await;
        self.cache.pop(key);
        true
    }

    /// Invalidate and deallocate every entry.
    ///
    /// Must run whenever the physical connection is reset: handles do not
    /// survive a new connection.
    pub async fn clear<D>(&mut self, driver: &mut D)
    where
        D: Driver + ?Sized,
    {
        for name in self.statement_names() {
            dealloc(driver, &name).await;
        }
        self.cache.clear();
    }

    /// Generate a unique statement name for this connection.
    fn next_statement_name(&mut self) -> String {
        self.next_id += 1;
        format!("fdb_{}", self.next_id)
    }

    /// Get the number of cached statements.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Statement names, oldest first.
    pub fn statement_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.cache.len());
        for (_, stmt) in self.cache.iter().rev() {
            names.push(stmt.name.clone());
        }
        names
    }
}

impl Default for StatementCache {
    fn default() -> Self {
        Self::new(DEFAULT_STATEMENT_LIMIT)
    }
}

/// Deallocate a statement, swallowing failures: if the connection is gone the
/// statement went with it.
async fn dealloc<D>(driver: &mut D, name: &str)
where
    D: Driver + ?Sized,
{
    if !driver.is_alive() {
        return;
    }
    if let Err(e) = driver.deallocate(name).await {
        warn!(statement = %name, error = %e, "Failed to deallocate prepared statement");
    }
}
