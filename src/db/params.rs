//! Request parameters and their binding order.
//!
//! sqlx binds SQLite parameters by number only (`?`, `?NNN`, `$NNN`). Named
//! placeholders (`:id`, `@id`, `$id`) are renumbered to `?NNN` in order of
//! first appearance and the JSON object is resolved into that order. Nothing
//! else in the statement text is touched.
//!
//! The same scan reports whether anything follows the first statement, since
//! the driver runs every `;`-separated statement it is given.

use super::DbError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::ops::Range;

/// Parameters supplied alongside a statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum QueryParams {
    /// `{"id": 1}` for `:id`, `@id` or `$id` placeholders.
    Named(Map<String, Value>),
    /// `[1, "x"]` for `?` or `?NNN` placeholders, bound in order.
    Positional(Vec<Value>),
}

/// A statement ready for the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Bindings<'q> {
    pub sql: Cow<'q, str>,
    pub values: Vec<Value>,
    /// Another statement follows the first `;` outside literals and comments.
    pub multiple_statements: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Placeholder {
    /// `?`, `?NNN` or `$NNN`.
    Numbered,
    /// Byte range of the full token including the sigil, e.g. `:id`.
    Named(Range<usize>),
}

/// Resolve `params` against the placeholders in `sql`.
///
/// An empty object counts as no parameters. Named placeholders need a named
/// object that supplies every name; mixing them with numbered placeholders
/// or with an array is refused.
pub fn resolve_bindings<'q>(
    sql: &'q str,
    params: Option<&QueryParams>,
) -> Result<Bindings<'q>, DbError> {
    let params = params.filter(|p| !matches!(p, QueryParams::Named(map) if map.is_empty()));
    let Scan {
        placeholders,
        multiple_statements,
    } = scan(sql);
    let named: Vec<Range<usize>> = placeholders
        .iter()
        .filter_map(|p| match p {
            Placeholder::Named(range) => Some(range.clone()),
            Placeholder::Numbered => None,
        })
        .collect();

    if named.is_empty() {
        return match params {
            None => Ok(Bindings {
                sql: Cow::Borrowed(sql),
                values: Vec::new(),
                multiple_statements,
            }),
            Some(QueryParams::Positional(values)) => Ok(Bindings {
                sql: Cow::Borrowed(sql),
                values: values.clone(),
                multiple_statements,
            }),
            Some(QueryParams::Named(_)) if placeholders.is_empty() => Ok(Bindings {
                sql: Cow::Borrowed(sql),
                values: Vec::new(),
                multiple_statements,
            }),
            Some(QueryParams::Named(_)) => Err(DbError::MixedParameters),
        };
    }

    if named.len() != placeholders.len() {
        return Err(DbError::MixedParameters);
    }
    let values = match params {
        Some(QueryParams::Named(values)) => values,
        Some(QueryParams::Positional(_)) => return Err(DbError::MixedParameters),
        None => {
            let name = &sql[named[0].start + 1..named[0].end];
            return Err(DbError::MissingParameter(name.to_string()));
        }
    };

    let mut order: Vec<&str> = Vec::new();
    let mut rewritten = String::with_capacity(sql.len());
    let mut last = 0;
    for range in named {
        let token = &sql[range.clone()];
        let number = match order.iter().position(|t| *t == token) {
            Some(i) => i + 1,
            None => {
                order.push(token);
                order.len()
            }
        };
        rewritten.push_str(&sql[last..range.start]);
        rewritten.push('?');
        rewritten.push_str(&number.to_string());
        last = range.end;
    }
    rewritten.push_str(&sql[last..]);

    let values = order
        .iter()
        .map(|token| {
            let name = &token[1..];
            values
                .get(name)
                .cloned()
                .ok_or_else(|| DbError::MissingParameter(name.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Bindings {
        sql: Cow::Owned(rewritten),
        values,
        multiple_statements,
    })
}

/// SQLite treats every non-ASCII byte as an identifier character.
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

struct Scan {
    placeholders: Vec<Placeholder>,
    multiple_statements: bool,
}

/// Find placeholders and statement separators outside string literals,
/// quoted identifiers and comments.
fn scan(sql: &str) -> Scan {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut terminated = false;
    let mut multiple_statements = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let is_comment = (b == b'-' && bytes.get(i + 1) == Some(&b'-'))
            || (b == b'/' && bytes.get(i + 1) == Some(&b'*'));
        if terminated && !is_comment && !b.is_ascii_whitespace() && b != b';' {
            multiple_statements = true;
        }

        match b {
            b';' => {
                terminated = true;
                i += 1;
            }
            quote @ (b'\'' | b'"' | b'`') => {
                i = skip_quoted(bytes, i + 1, quote);
            }
            b'[' => {
                while i < bytes.len() && bytes[i] != b']' {
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i += 2;
            }
            b'?' => {
                found.push(Placeholder::Numbered);
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
            b'$' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                found.push(Placeholder::Numbered);
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
            sigil @ (b':' | b'@' | b'$') => {
                let start = i;
                i += 1;
                // `::` is a cast, not a placeholder.
                if sigil == b':' && bytes.get(i) == Some(&b':') {
                    i += 1;
                    continue;
                }
                if bytes.get(i).is_some_and(|b| !b.is_ascii_digit() && is_ident_byte(*b)) {
                    while i < bytes.len() && is_ident_byte(bytes[i]) {
                        i += 1;
                    }
                    found.push(Placeholder::Named(start..i));
                }
            }
            _ => i += 1,
        }
    }

    Scan {
        placeholders: found,
        multiple_statements,
    }
}

/// Skip to just past the closing `quote`. Doubled quotes are escapes.
fn skip_quoted(bytes: &[u8], mut i: usize, quote: u8) -> usize {
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    i
}
