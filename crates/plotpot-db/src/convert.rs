//! JSON <-> SQLite value conversion driven by the column kind.

use chrono::{DateTime, SecondsFormat, Utc};
use plotpot_types::BackendError;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::Value;

use crate::schema::{Column, ColumnKind};

pub fn to_sql(column: &Column, value: &Value) -> Result<SqlValue, BackendError> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    let mismatch = || {
        BackendError::Other(format!(
            "invalid input for column {}: {}",
            column.name, value
        ))
    };

    match column.kind {
        ColumnKind::Integer => value.as_i64().map(SqlValue::Integer).ok_or_else(mismatch),
        ColumnKind::Bool => value
            .as_bool()
            .map(|b| SqlValue::Integer(b as i64))
            .ok_or_else(mismatch),
        ColumnKind::Text => value
            .as_str()
            .map(|s| SqlValue::Text(s.to_string()))
            .ok_or_else(mismatch),
        ColumnKind::Uuid => value
            .as_str()
            .and_then(|s| s.parse::<uuid::Uuid>().ok())
            .map(|id| SqlValue::Text(id.to_string()))
            .ok_or_else(mismatch),
        ColumnKind::Timestamp => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| SqlValue::Text(format_timestamp(ts.with_timezone(&Utc))))
            .ok_or_else(mismatch),
        ColumnKind::Json => Ok(SqlValue::Text(value.to_string())),
    }
}

pub fn from_sql(column: &Column, value: ValueRef<'_>) -> Result<Value, BackendError> {
    let corrupt = |what: &str| {
        BackendError::Server(format!("corrupt {} in column {}", what, column.name))
    };

    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => match column.kind {
            ColumnKind::Bool => Value::Bool(n != 0),
            _ => Value::from(n),
        },
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|_| corrupt("text"))?;
            match column.kind {
                ColumnKind::Json => serde_json::from_str(text).map_err(|_| corrupt("json"))?,
                _ => Value::String(text.to_string()),
            }
        }
        ValueRef::Blob(_) => return Err(corrupt("blob")),
    })
}

/// Fixed-width UTC form so lexicographic order matches time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
