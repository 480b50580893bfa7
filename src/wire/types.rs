//! Wire type registry and value coercion.
//!
//! The SQL Layer speaks the PostgreSQL protocol, so columns and parameters are
//! tagged with numeric type ids. This module maps those ids to logical kinds
//! and converts between raw wire payloads and [`Value`]s in both directions.
//!
//! The registry is built once and shared read-only (behind an `Arc`) by every
//! connection.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::warn;

use super::driver::RawField;
use crate::error::{AdapterError, Result};
use crate::executor::ColumnDescriptor;

// ============================================================================
// Type IDs
// ============================================================================

/// Wire-level type identifier reported by the server for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub i32);

impl TypeId {
    /// Placeholder for ids the registry does not know.
    pub const UNKNOWN: TypeId = TypeId(-1);

    pub const BOOLEAN: TypeId = TypeId(16);
    pub const BLOB: TypeId = TypeId(17);
    pub const BIGINT: TypeId = TypeId(20);
    pub const INTEGER: TypeId = TypeId(23);
    pub const CLOB: TypeId = TypeId(25);
    pub const DOUBLE: TypeId = TypeId(701);
    pub const VARCHAR: TypeId = TypeId(1043);
    pub const DATE: TypeId = TypeId(1082);
    pub const TIME: TypeId = TypeId(1083);
    pub const DATETIME: TypeId = TypeId(1114);
    pub const DECIMAL: TypeId = TypeId(1700);

    #[inline]
    pub fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload framing of a field or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Text = 0,
    Binary = 1,
}

// ============================================================================
// Logical kinds
// ============================================================================

/// Application-facing value category, independent of the wire id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalKind {
    Boolean,
    Integer,
    Decimal,
    Double,
    String,
    Blob,
    Date,
    DateTime,
    Time,
    Unknown,
}

impl LogicalKind {
    /// Type id sent alongside an encoded parameter of this kind.
    pub fn type_id(self) -> TypeId {
        match self {
            LogicalKind::Boolean => TypeId::BOOLEAN,
            LogicalKind::Integer => TypeId::BIGINT,
            LogicalKind::Decimal => TypeId::DECIMAL,
            LogicalKind::Double => TypeId::DOUBLE,
            LogicalKind::String => TypeId::VARCHAR,
            LogicalKind::Blob => TypeId::BLOB,
            LogicalKind::Date => TypeId::DATE,
            LogicalKind::DateTime => TypeId::DATETIME,
            LogicalKind::Time => TypeId::TIME,
            LogicalKind::Unknown => TypeId::UNKNOWN,
        }
    }

    /// Framing used when sending a parameter of this kind.
    ///
    /// Blobs always travel length-prefixed in binary framing so no byte
    /// sequence is ever reinterpreted as an escape.
    pub fn format(self) -> Format {
        match self {
            LogicalKind::Blob => Format::Binary,
            _ => Format::Text,
        }
    }

    /// Decode a single field payload. `None` is SQL NULL.
    pub fn decode(self, format: Format, raw: Option<&[u8]>) -> Result<Value> {
        let Some(data) = raw else {
            return Ok(Value::Null);
        };

        if format == Format::Binary {
            return self.decode_binary(data);
        }

        let text = std::str::from_utf8(data)
            .map_err(|e| AdapterError::Type(format!("Invalid UTF-8 in {:?} field: {}", self, e)))?;

        match self {
            LogicalKind::Boolean => Ok(Value::Bool(parse_bool(text))),
            LogicalKind::Integer => match parse_integer(text) {
                Ok(v) => Ok(Value::Int(v)),
                Err(e) => wide_integer(text).ok_or(e),
            },
            LogicalKind::Decimal => text.parse::<Decimal>().map(Value::Decimal),
            LogicalKind::Double => text
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|e| AdapterError::Type(format!("Invalid DOUBLE '{}': {}", text, e))),
            LogicalKind::String => Ok(Value::Text(text.to_string())),
            LogicalKind::Blob => unescape_bytea(text).map(Value::Blob),
            LogicalKind::Date => NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
                .map(Value::Date)
                .map_err(|e| AdapterError::Type(format!("Invalid DATE '{}': {}", text, e))),
            LogicalKind::DateTime => parse_datetime(text).map(Value::DateTime),
            LogicalKind::Time => NaiveTime::parse_from_str(text.trim(), TIME_FORMAT)
                .map(Value::Time)
                .map_err(|e| AdapterError::Type(format!("Invalid TIME '{}': {}", text, e))),
            LogicalKind::Unknown => Ok(Value::Unknown {
                type_id: TypeId::UNKNOWN,
                raw: Bytes::copy_from_slice(data),
            }),
        }
    }

    fn decode_binary(self, data: &[u8]) -> Result<Value> {
        match self {
            LogicalKind::Blob => Ok(Value::Blob(data.to_vec())),
            LogicalKind::Boolean => match data {
                [b] => Ok(Value::Bool(*b != 0)),
                _ => Err(AdapterError::Type(format!(
                    "Invalid BOOLEAN length: {}",
                    data.len()
                ))),
            },
            LogicalKind::Integer => match data.len() {
                2 => Ok(Value::Int(i16::from_be_bytes([data[0], data[1]]) as i64)),
                4 => Ok(Value::Int(
                    i32::from_be_bytes([data[0], data[1], data[2], data[3]]) as i64,
                )),
                8 => {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(data);
                    Ok(Value::Int(i64::from_be_bytes(buf)))
                }
                n => Err(AdapterError::Type(format!("Invalid INTEGER length: {}", n))),
            },
            LogicalKind::Double => match data.len() {
                4 => Ok(Value::Double(
                    f32::from_be_bytes([data[0], data[1], data[2], data[3]]) as f64,
                )),
                8 => {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(data);
                    Ok(Value::Double(f64::from_be_bytes(buf)))
                }
                n => Err(AdapterError::Type(format!("Invalid DOUBLE length: {}", n))),
            },
            LogicalKind::Unknown => Ok(Value::Unknown {
                type_id: TypeId::UNKNOWN,
                raw: Bytes::copy_from_slice(data),
            }),
            other => Err(AdapterError::Type(format!(
                "Binary format is not supported for {:?} fields",
                other
            ))),
        }
    }

    /// Encode an application value as a parameter of this kind.
    pub fn encode(self, value: &Value) -> Result<WireParameter> {
        let mut type_id = self.type_id();
        let data: Option<Bytes> = match (self, value) {
            (_, Value::Null) => None,

            (LogicalKind::Boolean, Value::Bool(b)) => Some(bool_text(*b)),
            (LogicalKind::Boolean, Value::Int(i)) => Some(bool_text(*i != 0)),
            (LogicalKind::Boolean, Value::Text(s)) => Some(bool_text(parse_bool(s))),

            (LogicalKind::Integer, Value::Int(i)) => {
                if i32::try_from(*i).is_ok() {
                    type_id = TypeId::INTEGER;
                }
                Some(Bytes::from(i.to_string()))
            }
            (LogicalKind::Integer, Value::Bool(b)) => Some(Bytes::from_static(if *b {
                b"1"
            } else {
                b"0"
            })),
            (LogicalKind::Integer, Value::Decimal(d)) if d.scale() == 0 => {
                Some(Bytes::from(d.as_str().to_string()))
            }
            (LogicalKind::Integer, Value::Text(s)) => {
                Some(Bytes::from(parse_integer(s)?.to_string()))
            }

            (LogicalKind::Decimal, Value::Decimal(d)) => Some(Bytes::from(d.as_str().to_string())),
            (LogicalKind::Decimal, Value::Int(i)) => Some(Bytes::from(i.to_string())),
            (LogicalKind::Decimal, Value::Text(s)) => {
                Some(Bytes::from(s.parse::<Decimal>()?.as_str().to_string()))
            }

            (LogicalKind::Double, Value::Double(f)) => Some(Bytes::from(double_text(*f))),
            (LogicalKind::Double, Value::Int(i)) => Some(Bytes::from(double_text(*i as f64))),
            (LogicalKind::Double, Value::Decimal(d)) => Some(Bytes::from(d.as_str().to_string())),

            (LogicalKind::String, Value::Blob(_)) | (LogicalKind::String, Value::Unknown { .. }) => {
                return Err(mismatch(self, value));
            }
            (LogicalKind::String, v) => v.to_text().map(Bytes::from),

            (LogicalKind::Blob, Value::Blob(b)) => Some(Bytes::copy_from_slice(b)),
            (LogicalKind::Blob, Value::Text(s)) => Some(Bytes::copy_from_slice(s.as_bytes())),

            (LogicalKind::Date, Value::Date(d)) => Some(Bytes::from(d.format(DATE_FORMAT).to_string())),
            (LogicalKind::DateTime, Value::DateTime(dt)) => {
                Some(Bytes::from(dt.format(DATETIME_FORMAT).to_string()))
            }
            (LogicalKind::DateTime, Value::Date(d)) => Some(Bytes::from(
                d.and_time(NaiveTime::MIN).format(DATETIME_FORMAT).to_string(),
            )),
            (LogicalKind::Time, Value::Time(t)) => Some(Bytes::from(t.format(TIME_FORMAT).to_string())),
            (LogicalKind::Date | LogicalKind::DateTime | LogicalKind::Time, Value::Text(s)) => {
                // Validate before handing the text to the server.
                self.decode(Format::Text, Some(s.as_bytes()))?;
                Some(Bytes::copy_from_slice(s.as_bytes()))
            }

            (LogicalKind::Unknown, Value::Unknown { type_id: id, raw }) => {
                type_id = *id;
                Some(raw.clone())
            }
            (LogicalKind::Unknown, v) => match v.to_text() {
                Some(text) => Some(Bytes::from(text)),
                None => return Err(mismatch(self, value)),
            },

            _ => return Err(mismatch(self, value)),
        };

        Ok(WireParameter {
            type_id,
            format: self.format(),
            data,
        })
    }
}

impl FromStr for LogicalKind {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "boolean" => Ok(LogicalKind::Boolean),
            "integer" => Ok(LogicalKind::Integer),
            "decimal" => Ok(LogicalKind::Decimal),
            "double" | "float" => Ok(LogicalKind::Double),
            "string" | "text" => Ok(LogicalKind::String),
            "blob" | "binary" => Ok(LogicalKind::Blob),
            "date" => Ok(LogicalKind::Date),
            "datetime" | "timestamp" => Ok(LogicalKind::DateTime),
            "time" => Ok(LogicalKind::Time),
            other => Err(AdapterError::Config(format!("Unknown logical kind: {}", other))),
        }
    }
}

fn mismatch(kind: LogicalKind, value: &Value) -> AdapterError {
    AdapterError::Type(format!("Cannot encode {} as {:?}", value.describe(), kind))
}

// ============================================================================
// Values
// ============================================================================

/// Exact decimal number kept in its textual form.
///
/// Decimals never pass through floating point, so every digit the server
/// sends is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal(String);

impl Decimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of digits after the decimal point.
    pub fn scale(&self) -> usize {
        self.0.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
    }

    /// Total number of significant digit positions.
    pub fn precision(&self) -> usize {
        self.0.chars().filter(|c| c.is_ascii_digit()).count()
    }
}

impl FromStr for Decimal {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let unsigned = trimmed
            .strip_prefix('-')
            .or_else(|| trimmed.strip_prefix('+'))
            .unwrap_or(trimmed);
        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (unsigned, None),
        };

        let digits_ok = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        let valid = !int_part.is_empty()
            && digits_ok(int_part)
            && frac_part.map_or(true, |f| !f.is_empty() && digits_ok(f));
        if !valid {
            return Err(AdapterError::Type(format!("Invalid DECIMAL: '{}'", s)));
        }

        let negative = trimmed.starts_with('-');
        let mut out = String::with_capacity(unsigned.len() + 1);
        if negative {
            out.push('-');
        }
        out.push_str(unsigned);
        Ok(Decimal(out))
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Decimal(v.to_string())
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An application-side value.
///
/// `Null` is the single canonical absence value for every kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    /// Payload of a field whose type id is not registered, kept verbatim.
    Unknown { type_id: TypeId, raw: Bytes },
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Kind inferred from the value itself, used when a parameter carries no
    /// column context.
    pub fn kind(&self) -> LogicalKind {
        match self {
            Value::Null => LogicalKind::String,
            Value::Bool(_) => LogicalKind::Boolean,
            Value::Int(_) => LogicalKind::Integer,
            Value::Decimal(_) => LogicalKind::Decimal,
            Value::Double(_) => LogicalKind::Double,
            Value::Text(_) => LogicalKind::String,
            Value::Blob(_) => LogicalKind::Blob,
            Value::Date(_) => LogicalKind::Date,
            Value::DateTime(_) => LogicalKind::DateTime,
            Value::Time(_) => LogicalKind::Time,
            Value::Unknown { .. } => LogicalKind::Unknown,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Decimal(d) if d.scale() == 0 => d.as_str().parse().ok(),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Decimal(d) => Some(d.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            Value::Unknown { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// Text rendering for scalar values; `None` for NULL and byte payloads.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null | Value::Blob(_) => None,
            Value::Bool(b) => Some(if *b { "t" } else { "f" }.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            Value::Double(f) => Some(double_text(*f)),
            Value::Text(s) => Some(s.clone()),
            Value::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => Some(dt.format(DATETIME_FORMAT).to_string()),
            Value::Time(t) => Some(t.format(TIME_FORMAT).to_string()),
            Value::Unknown { raw, .. } => std::str::from_utf8(raw).ok().map(str::to_string),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::Double(_) => "double",
            Value::Text(_) => "string",
            Value::Blob(_) => "blob",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Time(_) => "time",
            Value::Unknown { .. } => "raw value",
        }
    }
}

/// A value bound to a statement placeholder together with its column context.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub value: Value,
    pub kind: LogicalKind,
    pub column: Option<String>,
}

impl BoundParameter {
    /// Bind a value, inferring its kind from the value.
    pub fn new(value: Value) -> Self {
        let kind = value.kind();
        Self {
            value,
            kind,
            column: None,
        }
    }

    /// Bind a value for a column of a known kind.
    pub fn typed(kind: LogicalKind, value: Value) -> Self {
        Self {
            value,
            kind,
            column: None,
        }
    }

    pub fn for_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

impl From<Value> for BoundParameter {
    fn from(value: Value) -> Self {
        BoundParameter::new(value)
    }
}

/// An encoded parameter ready for the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct WireParameter {
    pub type_id: TypeId,
    pub format: Format,
    /// `None` is SQL NULL.
    pub data: Option<Bytes>,
}

// ============================================================================
// Registry
// ============================================================================

/// A registered wire type: id, name and the kind whose codec it uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireType {
    pub id: TypeId,
    pub name: String,
    pub kind: LogicalKind,
}

impl WireType {
    pub fn decode(&self, format: Format, raw: Option<&[u8]>) -> Result<Value> {
        match self.kind.decode(format, raw)? {
            Value::Unknown { raw, .. } => Ok(Value::Unknown {
                type_id: self.id,
                raw,
            }),
            v => Ok(v),
        }
    }

    pub fn encode(&self, value: &Value) -> Result<WireParameter> {
        self.kind.encode(value)
    }

    /// Declared SQL type, including width information from the type modifier.
    pub fn sql_type(&self, type_modifier: i32) -> String {
        if type_modifier < 4 {
            return self.name.clone();
        }
        let m = type_modifier - 4;
        match self.kind {
            LogicalKind::Decimal => format!("{}({},{})", self.name, (m >> 16) & 0xffff, m & 0xffff),
            LogicalKind::String if self.id == TypeId::VARCHAR => format!("{}({})", self.name, m),
            _ => self.name.clone(),
        }
    }
}

/// Bidirectional mapping between wire type ids and logical kinds.
///
/// Built once via [`TypeRegistry::standard`] or [`TypeRegistry::builder`];
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    by_id: HashMap<TypeId, WireType>,
    by_name: HashMap<String, TypeId>,
    unknown: WireType,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// The SQL Layer's type table.
    pub fn standard() -> Result<Self> {
        let registry = Self::builder()
            .add_type("blob", TypeId::BLOB, LogicalKind::Blob)?
            .add_type("boolean", TypeId::BOOLEAN, LogicalKind::Boolean)?
            .add_type("date", TypeId::DATE, LogicalKind::Date)?
            .add_type("datetime", TypeId::DATETIME, LogicalKind::DateTime)?
            .add_type("decimal", TypeId::DECIMAL, LogicalKind::Decimal)?
            .add_type("double", TypeId::DOUBLE, LogicalKind::Double)?
            .add_type("integer", TypeId::INTEGER, LogicalKind::Integer)?
            .add_type("varchar", TypeId::VARCHAR, LogicalKind::String)?
            .add_type("time", TypeId::TIME, LogicalKind::Time)?
            // SERIAL maps to BIGINT: its own id, same codec as integer
            .add_alias("bigint", "integer", Some(TypeId::BIGINT))?
            // CLOB maps to LONGTEXT: its own id, same codec as varchar
            .add_alias("clob", "varchar", Some(TypeId::CLOB))?
            .add_alias("float", "double", None)?
            .add_alias("timestamp", "datetime", None)?
            .build();
        Ok(registry)
    }

    pub fn by_id(&self, id: TypeId) -> Option<&WireType> {
        self.by_id.get(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&WireType> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .and_then(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All registered wire types (excluding the unknown placeholder).
    pub fn types(&self) -> impl Iterator<Item = &WireType> {
        self.by_id.values()
    }

    /// Resolve the wire type for a result field.
    ///
    /// A decimal whose modifier carries zero fractional digits resolves to
    /// integer so that identity/serial columns read back as integers.
    pub fn fetch_type(&self, field_name: &str, id: TypeId, type_modifier: i32) -> &WireType {
        let id = if id == TypeId::DECIMAL && (type_modifier.wrapping_sub(4) & 0xffff) == 0 {
            TypeId::INTEGER
        } else {
            id
        };
        match self.by_id.get(&id) {
            Some(wire_type) => wire_type,
            None => {
                warn!(field = field_name, type_id = id.0, "Unknown field type");
                &self.unknown
            }
        }
    }

    /// Build the descriptor for a result field.
    pub fn describe(&self, field: &RawField) -> ColumnDescriptor {
        let wire_type = self.fetch_type(&field.name, field.type_id, field.type_modifier);
        let sql_type = if wire_type.id == TypeId::UNKNOWN {
            format!("unknown({})", field.type_id)
        } else {
            wire_type.sql_type(field.type_modifier)
        };
        ColumnDescriptor {
            name: field.name.clone(),
            sql_type,
            nullable: field.nullable.unwrap_or(true),
            wire_type: wire_type.clone(),
            type_id: field.type_id,
            format: field.format,
        }
    }

    /// Decode a raw payload by wire type id.
    ///
    /// Unregistered ids never fail: the payload is returned untouched as
    /// [`Value::Unknown`] and a diagnostic is logged.
    pub fn decode(&self, id: TypeId, format: Format, raw: Option<&[u8]>) -> Result<Value> {
        match self.by_id.get(&id) {
            Some(wire_type) => wire_type.decode(format, raw),
            None => {
                let Some(data) = raw else {
                    return Ok(Value::Null);
                };
                warn!(type_id = id.0, "Unknown wire type, passing value through raw");
                Ok(Value::Unknown {
                    type_id: id,
                    raw: Bytes::copy_from_slice(data),
                })
            }
        }
    }

    /// Decode a field payload using a resolved column descriptor.
    pub fn decode_column(&self, column: &ColumnDescriptor, raw: Option<&[u8]>) -> Result<Value> {
        match column.wire_type.decode(column.format, raw)? {
            Value::Unknown { raw, .. } => Ok(Value::Unknown {
                type_id: column.type_id,
                raw,
            }),
            v => Ok(v),
        }
    }

    /// Encode a value for the given logical kind.
    pub fn encode(&self, kind: LogicalKind, value: &Value) -> Result<WireParameter> {
        kind.encode(value)
    }

    pub fn encode_bound(&self, param: &BoundParameter) -> Result<WireParameter> {
        param.kind.encode(&param.value).map_err(|e| match (&param.column, e) {
            (Some(column), AdapterError::Type(msg)) => {
                AdapterError::Type(format!("{} (column {})", msg, column))
            }
            (_, e) => e,
        })
    }
}

/// Builder enforcing that every id and name is registered at most once.
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    by_id: HashMap<TypeId, WireType>,
    by_name: HashMap<String, TypeId>,
}

impl TypeRegistryBuilder {
    pub fn add_type(mut self, name: &str, id: TypeId, kind: LogicalKind) -> Result<Self> {
        let key = name.to_ascii_lowercase();
        if key.is_empty() {
            return Err(AdapterError::Config("Empty type name".to_string()));
        }
        if self.by_name.contains_key(&key) {
            return Err(AdapterError::Config(format!("Duplicate type name: {}", name)));
        }
        if self.by_id.contains_key(&id) || id == TypeId::UNKNOWN {
            return Err(AdapterError::Config(format!("Duplicate type id: {}", id)));
        }
        self.by_name.insert(key.clone(), id);
        self.by_id.insert(id, WireType { id, name: key, kind });
        Ok(self)
    }

    /// Register `name` as another spelling of `alias_for`.
    ///
    /// With an id, a distinct wire type sharing the codec is registered;
    /// without one, the name simply resolves to the existing id.
    pub fn add_alias(self, name: &str, alias_for: &str, id: Option<TypeId>) -> Result<Self> {
        let target_id = *self
            .by_name
            .get(&alias_for.to_ascii_lowercase())
            .ok_or_else(|| AdapterError::Config(format!("Unknown alias target: {}", alias_for)))?;
        let kind = self
            .by_id
            .get(&target_id)
            .map(|t| t.kind)
            .ok_or_else(|| AdapterError::Config(format!("Unknown alias target: {}", alias_for)))?;

        match id {
            Some(id) => self.add_type(name, id, kind),
            None => {
                let mut builder = self;
                let key = name.to_ascii_lowercase();
                if builder.by_name.contains_key(&key) {
                    return Err(AdapterError::Config(format!("Duplicate type name: {}", name)));
                }
                builder.by_name.insert(key, target_id);
                Ok(builder)
            }
        }
    }

    pub fn build(self) -> TypeRegistry {
        TypeRegistry {
            by_id: self.by_id,
            by_name: self.by_name,
            unknown: WireType {
                id: TypeId::UNKNOWN,
                name: "unknown".to_string(),
                kind: LogicalKind::Unknown,
            },
        }
    }
}

// ============================================================================
// Text helpers
// ============================================================================

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Truthiness of a textual boolean as the server and applications spell it.
pub fn parse_bool(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "t" | "true" | "1" | "on" | "yes" | "y"
    )
}

fn bool_text(b: bool) -> Bytes {
    Bytes::from_static(if b { b"t" } else { b"f" })
}

fn parse_integer(text: &str) -> Result<i64> {
    let trimmed = text.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(v);
    }
    // Zero-scale decimals may arrive with a trailing ".000".
    match trimmed.split_once('.') {
        Some((int_part, frac)) if !frac.is_empty() && frac.bytes().all(|b| b == b'0') => int_part
            .parse::<i64>()
            .map_err(|e| AdapterError::Type(format!("Invalid INTEGER '{}': {}", text, e))),
        _ => Err(AdapterError::Type(format!("Invalid INTEGER '{}'", text))),
    }
}

/// An integral value too wide for i64, as a zero-scale decimal.
///
/// `decimal(p,0)` columns read through the integer codec can exceed i64 up
/// to the maximum decimal precision.
fn wide_integer(text: &str) -> Option<Value> {
    let d = text.parse::<Decimal>().ok()?;
    match d.as_str().split_once('.') {
        None => Some(Value::Decimal(d)),
        Some((int_part, frac)) if frac.bytes().all(|b| b == b'0') => {
            int_part.parse::<Decimal>().ok().map(Value::Decimal)
        }
        Some(_) => None,
    }
}

fn double_text(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f == f64::INFINITY {
        "Infinity".to_string()
    } else if f == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        f.to_string()
    }
}

fn parse_datetime(text: &str) -> Result<NaiveDateTime> {
    let trimmed = text.trim();
    NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|e| AdapterError::Type(format!("Invalid DATETIME '{}': {}", text, e)))
}

/// Undo bytea text escaping (`\x` hex or backslash-octal escape format).
pub fn unescape_bytea(text: &str) -> Result<Vec<u8>> {
    if let Some(hex) = text.strip_prefix("\\x") {
        if hex.len() % 2 != 0 {
            return Err(AdapterError::Type("Odd-length hex bytea".to_string()));
        }
        return (0..hex.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&hex[i..i + 2], 16)
                    .map_err(|e| AdapterError::Type(format!("Invalid hex bytea: {}", e)))
            })
            .collect();
    }

    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
        } else if bytes.get(i + 1) == Some(&b'\\') {
            out.push(b'\\');
            i += 2;
        } else if i + 4 <= bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let v = bytes[i + 1..i + 4]
                .iter()
                .fold(0u16, |acc, b| acc * 8 + u16::from(b - b'0'));
            let byte = u8::try_from(v)
                .map_err(|_| AdapterError::Type(format!("Escaped bytea value out of range: {}", v)))?;
            out.push(byte);
            i += 4;
        } else {
            return Err(AdapterError::Type(format!(
                "Invalid escape at byte {} in bytea",
                i
            )));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::standard().unwrap()
    }

    fn roundtrip(reg: &TypeRegistry, id: TypeId, value: Value) {
        let wire_type = reg.by_id(id).unwrap();
        let param = wire_type.encode(&value).unwrap();
        let decoded = reg
            .decode(id, param.format, param.data.as_deref())
            .unwrap();
        assert_eq!(decoded, value, "roundtrip through {}", wire_type.name);
    }

    #[test]
    fn test_standard_registry_contents() {
        let reg = registry();
        assert_eq!(reg.len(), 11);
        assert_eq!(reg.by_name("FLOAT").unwrap().id, TypeId::DOUBLE);
        assert_eq!(reg.by_name("timestamp").unwrap().id, TypeId::DATETIME);
        assert_eq!(reg.by_id(TypeId::BIGINT).unwrap().kind, LogicalKind::Integer);
        assert_eq!(reg.by_id(TypeId::CLOB).unwrap().kind, LogicalKind::String);
    }

    #[test]
    fn test_duplicate_registration_is_config_error() {
        let dup_id = TypeRegistry::builder()
            .add_type("a", TypeId(1), LogicalKind::Integer)
            .unwrap()
            .add_type("b", TypeId(1), LogicalKind::Integer);
        assert!(matches!(dup_id, Err(AdapterError::Config(_))));

        let dup_name = TypeRegistry::builder()
            .add_type("a", TypeId(1), LogicalKind::Integer)
            .unwrap()
            .add_type("A", TypeId(2), LogicalKind::Integer);
        assert!(matches!(dup_name, Err(AdapterError::Config(_))));

        let dup_alias = TypeRegistry::builder()
            .add_type("a", TypeId(1), LogicalKind::Integer)
            .unwrap()
            .add_alias("a", "a", None);
        assert!(matches!(dup_alias, Err(AdapterError::Config(_))));
    }

    #[test]
    fn test_roundtrip_every_registered_type() {
        let reg = registry();
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let time = NaiveTime::from_hms_micro_opt(23, 59, 58, 123_456).unwrap();

        for id in [TypeId::INTEGER, TypeId::BIGINT] {
            roundtrip(&reg, id, Value::Int(0));
            roundtrip(&reg, id, Value::Int(-42));
            roundtrip(&reg, id, Value::Int(i64::MAX));
            roundtrip(&reg, id, Value::Int(i64::MIN));
        }
        roundtrip(&reg, TypeId::BOOLEAN, Value::Bool(true));
        roundtrip(&reg, TypeId::BOOLEAN, Value::Bool(false));
        roundtrip(&reg, TypeId::DECIMAL, Value::Decimal("0".parse().unwrap()));
        roundtrip(&reg, TypeId::DECIMAL, Value::Decimal("-12.50".parse().unwrap()));
        // 31 digits: the engine's maximum precision
        roundtrip(
            &reg,
            TypeId::DECIMAL,
            Value::Decimal("123456789012345678901.2345678901".parse().unwrap()),
        );
        roundtrip(&reg, TypeId::DOUBLE, Value::Double(0.0));
        roundtrip(&reg, TypeId::DOUBLE, Value::Double(-1.5e-300));
        roundtrip(&reg, TypeId::DOUBLE, Value::Double(f64::MAX));
        roundtrip(&reg, TypeId::DOUBLE, Value::Double(f64::INFINITY));
        for id in [TypeId::VARCHAR, TypeId::CLOB] {
            roundtrip(&reg, id, Value::Text(String::new()));
            roundtrip(&reg, id, Value::Text("it's \\ \"quoted\"".to_string()));
        }
        roundtrip(&reg, TypeId::BLOB, Value::Blob(vec![]));
        roundtrip(&reg, TypeId::BLOB, Value::Blob(vec![0, b'\\', b'x', b'\'', 255]));
        roundtrip(&reg, TypeId::DATE, Value::Date(date));
        roundtrip(&reg, TypeId::TIME, Value::Time(time));
        roundtrip(&reg, TypeId::DATETIME, Value::DateTime(date.and_time(time)));
        roundtrip(&reg, TypeId::DATETIME, Value::DateTime(date.and_time(NaiveTime::MIN)));

        for wire_type in reg.types() {
            roundtrip(&reg, wire_type.id, Value::Null);
        }
    }

    #[test]
    fn test_null_decodes_to_absence_for_every_type() {
        let reg = registry();
        for wire_type in reg.types() {
            for format in [Format::Text, Format::Binary] {
                let v = reg.decode(wire_type.id, format, None).unwrap();
                assert!(v.is_null(), "{} decoded NULL as {:?}", wire_type.name, v);
            }
        }
        assert!(reg.decode(TypeId(9999), Format::Text, None).unwrap().is_null());
    }

    #[test]
    fn test_empty_string_is_not_null() {
        let reg = registry();
        let v = reg.decode(TypeId::VARCHAR, Format::Text, Some(b"")).unwrap();
        assert_eq!(v, Value::Text(String::new()));
    }

    /// Zero-scale decimals resolve to integer. Serial and identity columns
    /// depend on this aliasing to read back as integers.
    #[test]
    fn test_zero_scale_decimal_decodes_as_integer() {
        let reg = registry();
        // numeric(10,0): ((10 << 16) | 0) + 4
        let zero_scale = (10 << 16) + 4;
        let resolved = reg.fetch_type("id", TypeId::DECIMAL, zero_scale);
        assert_eq!(resolved.id, TypeId::INTEGER);

        let field = RawField::new("id", TypeId::DECIMAL).with_modifier(zero_scale);
        let column = reg.describe(&field);
        assert_eq!(
            reg.decode_column(&column, Some(b"42")).unwrap(),
            Value::Int(42)
        );

        // numeric(10,2) stays decimal
        let two_scale = (10 << 16) + 2 + 4;
        assert_eq!(reg.fetch_type("price", TypeId::DECIMAL, two_scale).id, TypeId::DECIMAL);
        // no modifier at all stays decimal
        assert_eq!(reg.fetch_type("price", TypeId::DECIMAL, -1).id, TypeId::DECIMAL);
    }

    #[test]
    fn test_zero_scale_decimal_wider_than_i64() {
        let reg = registry();
        let field = RawField::new("id", TypeId::DECIMAL).with_modifier((31 << 16) + 4);
        let column = reg.describe(&field);
        assert_eq!(column.wire_type.id, TypeId::INTEGER);

        let digits = "1234567890123456789012345678901";
        assert_eq!(
            reg.decode_column(&column, Some(digits.as_bytes())).unwrap(),
            Value::Decimal(digits.parse().unwrap())
        );
        assert_eq!(
            reg.decode_column(&column, Some(b"-9999999999999999999999999999999.000"))
                .unwrap(),
            Value::Decimal("-9999999999999999999999999999999".parse().unwrap())
        );
        // Values that fit keep reading back as integers
        assert_eq!(
            reg.decode_column(&column, Some(b"9223372036854775807")).unwrap(),
            Value::Int(i64::MAX)
        );
        assert!(reg.decode_column(&column, Some(b"12.5")).is_err());
        assert!(reg.decode_column(&column, Some(b"abc")).is_err());
    }

    #[test]
    fn test_unknown_type_is_passed_through() {
        let reg = registry();
        let v = reg.decode(TypeId(2950), Format::Text, Some(b"\x00raw")).unwrap();
        assert_eq!(
            v,
            Value::Unknown {
                type_id: TypeId(2950),
                raw: Bytes::from_static(b"\x00raw"),
            }
        );

        let column = reg.describe(&RawField::new("mystery", TypeId(2950)));
        assert_eq!(column.wire_type.id, TypeId::UNKNOWN);
        assert_eq!(column.sql_type, "unknown(2950)");
        assert_eq!(
            reg.decode_column(&column, Some(b"abc")).unwrap(),
            Value::Unknown {
                type_id: TypeId(2950),
                raw: Bytes::from_static(b"abc"),
            }
        );
    }

    #[test]
    fn test_blob_encodes_in_binary_framing() {
        let payload = b"\\x00'\\\\".to_vec();
        let param = LogicalKind::Blob.encode(&Value::Blob(payload.clone())).unwrap();
        assert_eq!(param.format, Format::Binary);
        assert_eq!(param.type_id, TypeId::BLOB);
        assert_eq!(param.data.as_deref(), Some(&payload[..]));
    }

    #[test]
    fn test_text_bytea_unescape() {
        assert_eq!(unescape_bytea("\\x00ff41").unwrap(), vec![0, 255, b'A']);
        assert_eq!(unescape_bytea("a\\\\b\\001").unwrap(), vec![b'a', b'\\', b'b', 1]);
        assert!(unescape_bytea("\\x0").is_err());
        assert!(unescape_bytea("bad\\9").is_err());
    }

    #[test]
    fn test_boolean_text_spellings() {
        for t in ["t", "TRUE", "1", "on", "yes"] {
            assert_eq!(
                LogicalKind::Boolean.decode(Format::Text, Some(t.as_bytes())).unwrap(),
                Value::Bool(true)
            );
        }
        for f in ["f", "false", "0", "off"] {
            assert_eq!(
                LogicalKind::Boolean.decode(Format::Text, Some(f.as_bytes())).unwrap(),
                Value::Bool(false)
            );
        }
    }

    #[test]
    fn test_binary_integer_widths() {
        let kind = LogicalKind::Integer;
        assert_eq!(kind.decode(Format::Binary, Some(&7i16.to_be_bytes())).unwrap(), Value::Int(7));
        assert_eq!(kind.decode(Format::Binary, Some(&(-7i32).to_be_bytes())).unwrap(), Value::Int(-7));
        assert_eq!(
            kind.decode(Format::Binary, Some(&i64::MAX.to_be_bytes())).unwrap(),
            Value::Int(i64::MAX)
        );
        assert!(kind.decode(Format::Binary, Some(&[1, 2, 3])).is_err());
    }

    #[test]
    fn test_decimal_parsing() {
        assert_eq!("+1.50".parse::<Decimal>().unwrap().as_str(), "1.50");
        let d: Decimal = "-0012.340".parse().unwrap();
        assert_eq!(d.scale(), 3);
        assert_eq!(d.precision(), 7);
        assert!("1.".parse::<Decimal>().is_err());
        assert!("abc".parse::<Decimal>().is_err());
        assert!("1e5".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_encode_type_mismatch() {
        let err = LogicalKind::Date.encode(&Value::Int(3)).unwrap_err();
        assert!(matches!(err, AdapterError::Type(_)));
        let err = LogicalKind::String.encode(&Value::Blob(vec![1])).unwrap_err();
        assert!(matches!(err, AdapterError::Type(_)));

        let reg = registry();
        let param = BoundParameter::typed(LogicalKind::Integer, Value::Text("x".into())).for_column("age");
        let msg = reg.encode_bound(&param).unwrap_err().to_string();
        assert!(msg.contains("column age"));
    }

    #[test]
    fn test_integer_param_type_id_tracks_width() {
        let small = LogicalKind::Integer.encode(&Value::Int(5)).unwrap();
        assert_eq!(small.type_id, TypeId::INTEGER);
        let big = LogicalKind::Integer.encode(&Value::Int(1 << 40)).unwrap();
        assert_eq!(big.type_id, TypeId::BIGINT);
    }

    #[test]
    fn test_sql_type_rendering() {
        let reg = registry();
        let decimal = reg.by_id(TypeId::DECIMAL).unwrap();
        assert_eq!(decimal.sql_type((10 << 16) + 2 + 4), "decimal(10,2)");
        let varchar = reg.by_id(TypeId::VARCHAR).unwrap();
        assert_eq!(varchar.sql_type(255 + 4), "varchar(255)");
        assert_eq!(varchar.sql_type(-1), "varchar");
    }
}
