//! Per-connection execution machinery.
//!
//! This module sits between the application and a [`Driver`] that speaks the
//! wire protocol:
//! - Caches prepared statements per connection
//! - Converts between wire type ids and application values
//! - Classifies server errors
//!
//! Architecture:
//! - `types`: Wire type registry and value codecs
//! - `statement`: Prepared statement cache
//! - `error`: Driver errors and their classification
//! - `driver`: The transport seam
//! - `connection`: Execution engine and schema operations

pub mod connection;
pub mod driver;
pub mod error;
pub mod statement;
pub mod types;

#[cfg(test)]
pub(crate) mod stub;


// Public API re-exports for library consumers
pub use connection::Connection;
pub use driver::{Driver, RawField, RawResult, TransactionStatus};
pub use error::{classify, classify_error, DriverError, DriverResult, ErrorClass};
pub use statement::{CachedStatement, StatementCache};
#[allow(unused_imports)]
pub use types::{
    BoundParameter, Decimal, Format, LogicalKind, TypeId, TypeRegistry, Value, WireParameter,
    WireType,
};
