//! Inline substitution of `$n` placeholders.
//!
//! Used when a statement must be sent as plain text although it carries
//! parameters: prepared statements are disabled, or the statement is DDL or
//! transaction control. Placeholders inside string literals, quoted
//! identifiers, comments and dollar-quoted bodies are left untouched.

use std::borrow::Cow;

use crate::error::{AdapterError, Result};
use crate::wire::types::BoundParameter;

use super::quoting::quote_bound;

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// Replace `$1..$n` with quoted literals of the matching parameters.
///
/// Each literal is rendered for the parameter's kind, not just its value.
/// Returns the input unchanged when it has no placeholders. A placeholder
/// without a matching parameter is a `Config` error.
pub fn substitute_binds<'a>(sql: &'a str, params: &[BoundParameter]) -> Result<Cow<'a, str>> {
    let literals = params.iter().map(quote_bound).collect::<Result<Vec<String>>>()?;
    substitute_literals(sql, &literals)
}

/// Replace `$1..$n` with already-rendered literals.
pub fn substitute_literals<'a>(sql: &'a str, literals: &[String]) -> Result<Cow<'a, str>> {
    let mut out: Option<String> = None;
    // Start of the not-yet-copied tail of `sql`
    let mut copied = 0;
    let mut state = State::Normal;
    let mut idx = 0;
    let bytes = sql.as_bytes();

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((digits_end, n)) = scan_index(bytes, idx + 1) {
                        let literal = n
                            .checked_sub(1)
                            .and_then(|i| literals.get(i))
                            .ok_or_else(|| {
                                AdapterError::Config(format!(
                                    "No value bound for placeholder ${} ({} given)",
                                    n,
                                    literals.len()
                                ))
                            })?;
                        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len()));
                        buf.push_str(&sql[copied..idx]);
                        buf.push_str(literal);
                        copied = digits_end;
                        idx = digits_end;
                        continue;
                    } else if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = advance;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied..]);
            Ok(Cow::Owned(buf))
        }
        None => Ok(Cow::Borrowed(sql)),
    }
}

/// Parse the placeholder number starting at `start`.
fn scan_index(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    let mut idx = start;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == start {
        return None;
    }
    std::str::from_utf8(&bytes[start..idx])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .map(|n| (idx, n))
}

/// Recognize `$tag$` (or `$$`) at `start`; returns the tag and the index of
/// its closing `$`.
fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
        idx += 1;
    }

    if idx < bytes.len() {
        let tag = String::from_utf8(bytes[start + 1..idx].to_vec()).ok()?;
        Some((tag, idx))
    } else {
        None
    }
}

/// Whether `$tag$` closes at `idx`.
fn matches_tag(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    end < bytes.len()
        && bytes[idx + 1..end] == *tag.as_bytes()
        && bytes[end] == b'$'
}
