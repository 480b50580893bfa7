//! Client adapter core for the FoundationDB SQL Layer.
//!
//! Executes statements through a per-connection prepared statement cache,
//! converts between wire types and application values, renders dialect SQL
//! for schema introspection and DDL, and classifies server errors.
//!
//! The transport is pluggable: anything implementing [`wire::Driver`] can
//! back a [`Connection`].

pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod schema;
pub mod wire;

pub use config::{AdapterConfig, DialectKind};
pub use dialect::Dialect;
pub use error::{AdapterError, Result};
pub use executor::{ColumnDescriptor, ExecResult, QueryResult, Row};
pub use schema::{ColumnInfo, IndexInfo, PrimaryKeyInfo};
pub use wire::{BoundParameter, Connection, ErrorClass, TypeRegistry, Value};
