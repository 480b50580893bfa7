//! Identifier and literal quoting.
//!
//! Every name or value interpolated into generated SQL goes through one of
//! these functions. Backslash is an ordinary character in string literals,
//! so only the quote character itself is doubled.

use std::fmt::Write;

use crate::error::{AdapterError, Result};
use crate::wire::types::{BoundParameter, LogicalKind, Value};

/// Escape a string for use inside a single-quoted literal.
pub fn quote_string(s: &str) -> String {
    s.replace('\'', "''")
}

/// Render a complete single-quoted string literal.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", quote_string(s))
}

/// Quote a single identifier: wrap in double quotes, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    out.push('"');
    for c in ident.chars() {
        // NUL cannot appear in an identifier; drop it rather than truncate
        match c {
            '"' => out.push_str("\"\""),
            '\0' => {}
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub fn quote_column_name(name: &str) -> String {
    quote_ident(name)
}

/// Split an optionally schema-qualified name on its first dot.
///
/// `t` is `(None, "t")`, `test.t` is `(Some("test"), "t")`.
pub fn split_table_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, name),
    }
}

/// Quote a table name, quoting schema and table separately when qualified.
pub fn quote_table_name(name: &str) -> String {
    match split_table_name(name) {
        (Some(schema), table) => format!("{}.{}", quote_ident(schema), quote_ident(table)),
        (None, table) => quote_ident(table),
    }
}

/// Render bytes as a hex binary literal: `x'0aff'`.
pub fn quote_binary(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 3);
    out.push_str("x'");
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out.push('\'');
    out
}

/// Render a value as an SQL literal.
///
/// Date and time values are rendered without fractional seconds; the server
/// does not accept them in literals.
pub fn quote_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Double(f) if f.is_finite() => {
            let text = f.to_string();
            // Keep it a floating literal
            if text.contains(['.', 'e', 'E']) {
                text
            } else {
                format!("{}.0", text)
            }
        }
        Value::Double(f) => {
            let text = if f.is_nan() {
                "NaN"
            } else if *f > 0.0 {
                "Infinity"
            } else {
                "-Infinity"
            };
            quote_literal(text)
        }
        Value::Text(s) => quote_literal(s),
        Value::Blob(bytes) => quote_binary(bytes),
        Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
        Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
        Value::Time(t) => format!("'{}'", t.format("%H:%M:%S")),
        Value::Unknown { raw, .. } => match std::str::from_utf8(raw) {
            Ok(text) => quote_literal(text),
            Err(_) => quote_binary(raw),
        },
    }
}

/// Render a bound parameter as an SQL literal of its column's kind.
///
/// A value whose own kind matches the parameter renders as [`quote_value`]
/// does. Anything else is first coerced the way the prepared path encodes
/// it, so a binary column always gets a hex literal and a boolean column
/// always gets `TRUE`/`FALSE`.
pub fn quote_bound(param: &BoundParameter) -> Result<String> {
    if param.value.is_null() || param.value.kind() == param.kind {
        return Ok(quote_value(&param.value));
    }

    let wire = param.kind.encode(&param.value).map_err(|e| match (&param.column, e) {
        (Some(column), AdapterError::Type(msg)) => {
            AdapterError::Type(format!("{} (column {})", msg, column))
        }
        (_, e) => e,
    })?;
    let Some(data) = wire.data else {
        return Ok("NULL".to_string());
    };

    if param.kind == LogicalKind::Blob {
        return Ok(quote_binary(&data));
    }
    let Ok(text) = std::str::from_utf8(&data) else {
        return Ok(quote_binary(&data));
    };
    Ok(match param.kind {
        LogicalKind::Boolean => if text == "t" { "TRUE" } else { "FALSE" }.to_string(),
        LogicalKind::Integer | LogicalKind::Decimal => text.to_string(),
        LogicalKind::Double if text.parse::<f64>().map_or(false, f64::is_finite) => text.to_string(),
        _ => quote_literal(text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn test_quote_string_doubles_single_quotes_only() {
        assert_eq!(quote_string("O'Reilly"), "O''Reilly");
        assert_eq!(quote_string(r"C:\path"), r"C:\path");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_quote_ident_injection() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(
            quote_ident("x\"; DROP TABLE users; --"),
            "\"x\"\"; DROP TABLE users; --\""
        );
    }

    #[test]
    fn test_quote_table_name_splits_schema() {
        assert_eq!(quote_table_name("t"), "\"t\"");
        assert_eq!(quote_table_name("test.t"), "\"test\".\"t\"");
        assert_eq!(quote_table_name("a.b.c"), "\"a\".\"b.c\"");
        assert_eq!(split_table_name("test.t"), (Some("test"), "t"));
        assert_eq!(split_table_name("t"), (None, "t"));
    }

    #[test]
    fn test_quote_binary() {
        assert_eq!(quote_binary(&[0x00, 0x5c, 0x27, 0xff]), "x'005c27ff'");
        assert_eq!(quote_binary(&[]), "x''");
    }

    #[test]
    fn test_quote_value_literals() {
        assert_eq!(quote_value(&Value::Null), "NULL");
        assert_eq!(quote_value(&Value::Bool(true)), "TRUE");
        assert_eq!(quote_value(&Value::Int(-7)), "-7");
        assert_eq!(quote_value(&Value::Double(2.0)), "2.0");
        assert_eq!(quote_value(&Value::Double(f64::NAN)), "'NaN'");
        assert_eq!(quote_value(&Value::Text("a'b".into())), "'a''b'");
        assert_eq!(
            quote_value(&Value::Decimal("12.50".parse().unwrap())),
            "12.50"
        );
    }

    #[test]
    fn test_quote_value_drops_fractional_seconds() {
        let dt = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_micro_opt(13, 45, 1, 250_000)
            .unwrap();
        assert_eq!(quote_value(&Value::DateTime(dt)), "'2024-02-29 13:45:01'");
        let t = NaiveTime::from_hms_micro_opt(8, 0, 59, 999_999).unwrap();
        assert_eq!(quote_value(&Value::Time(t)), "'08:00:59'");
    }

    #[test]
    fn test_quote_bound_uses_column_kind() {
        let param = BoundParameter::typed(LogicalKind::Blob, Value::Text("ab".into()));
        assert_eq!(quote_bound(&param).unwrap(), "x'6162'");

        let param = BoundParameter::typed(LogicalKind::Boolean, Value::Text("no".into()));
        assert_eq!(quote_bound(&param).unwrap(), "FALSE");

        let param = BoundParameter::typed(LogicalKind::Double, Value::Int(2));
        assert_eq!(quote_bound(&param).unwrap(), "2");

        let param = BoundParameter::typed(LogicalKind::Integer, Value::Null);
        assert_eq!(quote_bound(&param).unwrap(), "NULL");

        // Matching kinds render like plain values
        let param = BoundParameter::new(Value::Blob(vec![0x0a, 0xff]));
        assert_eq!(quote_bound(&param).unwrap(), "x'0aff'");
    }
}
