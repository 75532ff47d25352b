//! PostgreSQL row decoding.
//!
//! Result rows are shaped into ordered column-name → JSON maps. Columns are
//! decoded by their Postgres type name; anything unrecognized is read as
//! text when its wire bytes are valid UTF-8, and becomes `null` otherwise.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, Decode, Postgres, Row as _, Type, TypeInfo};

use common::models::query::Row;

/// Converts one row into a column-name → value map, in select-list order.
pub fn row_to_json(row: &PgRow) -> Row {
    let mut out = Row::new();
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name());
        out.insert(column.name().to_string(), value);
    }
    out
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Value {
    let value = match type_name {
        "BOOL" => get::<bool>(row, idx).map(Value::Bool),
        "INT2" => get::<i16>(row, idx).map(Value::from),
        "INT4" => get::<i32>(row, idx).map(Value::from),
        "INT8" => get::<i64>(row, idx).map(Value::from),
        "FLOAT4" => get::<f32>(row, idx).map(|v| Value::from(f64::from(v))),
        "FLOAT8" => get::<f64>(row, idx).map(Value::from),
        // Kept as a string to avoid losing precision.
        "NUMERIC" => get::<Decimal>(row, idx).map(|v| Value::String(v.to_string())),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => get::<String>(row, idx).map(Value::String),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, idx).map(|v| Value::String(v.to_rfc3339())),
        // Naive timestamps are taken as UTC.
        "TIMESTAMP" => get::<NaiveDateTime>(row, idx).map(|v| Value::String(v.and_utc().to_rfc3339())),
        "DATE" => get::<NaiveDate>(row, idx).map(|v| Value::String(v.to_string())),
        "TIME" => get::<NaiveTime>(row, idx).map(|v| Value::String(v.to_string())),
        "JSON" | "JSONB" => get::<Value>(row, idx),
        "UUID" => get::<uuid::Uuid>(row, idx).map(|v| Value::String(v.to_string())),
        _ => row
            .try_get_unchecked::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

/// `None` for SQL `NULL` and for values that fail to decode.
fn get<'r, T>(row: &'r PgRow, idx: usize) -> Option<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(column = idx, error = %e, "column decode failed");
            None
        }
    }
}
