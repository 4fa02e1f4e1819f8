//! Conversion between JSON values and SQLite values.

use base64::prelude::*;
use serde_json::{Map, Number, Value};
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

pub(super) type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind one JSON value.
///
/// Objects and arrays are bound as their JSON text. Integers that do not fit
/// an `i64` are bound as reals.
pub(super) fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// Convert a row into a JSON object keyed by column name, in column order.
///
/// Types come from the stored value, not the declared column type, so
/// expression columns such as `SELECT 1 + 1` convert too. Blobs become
/// base64 strings.
pub(super) fn row_to_json(row: &SqliteRow) -> Result<Map<String, Value>, sqlx::Error> {
    let mut object = Map::with_capacity(row.columns().len());

    for column in row.columns() {
        let idx = column.ordinal();
        let storage = {
            let raw = row.try_get_raw(idx)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_string())
            }
        };

        let value = match storage.as_deref() {
            None => Value::Null,
            Some("INTEGER") => Value::from(row.try_get_unchecked::<i64, _>(idx)?),
            Some("REAL") => Number::from_f64(row.try_get_unchecked::<f64, _>(idx)?)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Some("BLOB") => {
                Value::String(BASE64_STANDARD.encode(row.try_get_unchecked::<Vec<u8>, _>(idx)?))
            }
            Some(_) => Value::String(row.try_get_unchecked::<String, _>(idx)?),
        };

        object.insert(column.name().to_string(), value);
    }

    Ok(object)
}
