//! Decodes a `PgRow` into the `pgrpc_core::Row` shape Shaper operates on.

use pgrpc_core::Row;
use serde_json::Value;
use sqlx::postgres::{PgColumn, PgRow, PgTypeInfo};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

/// Decodes every column of `row` to a JSON value, dispatching on the
/// column's declared Postgres type the way a wire-protocol decoder
/// dispatches on OID, except our decode target is `serde_json::Value`
/// rather than a native Rust type.
pub fn decode_row(row: &PgRow) -> Result<Row, sqlx::Error> {
    let mut out = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        let value = decode_column(row, column)?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode_column(row: &PgRow, column: &PgColumn) -> Result<Value, sqlx::Error> {
    let ordinal = column.ordinal();

    let raw = row.try_get_raw(ordinal)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let ty: &PgTypeInfo = column.type_info();
    let value = match ty.name() {
        "BOOL" => Value::from(row.try_get::<bool, _>(ordinal)?),
        "INT2" => Value::from(row.try_get::<i16, _>(ordinal)?),
        "INT4" => Value::from(row.try_get::<i32, _>(ordinal)?),
        "INT8" => Value::from(row.try_get::<i64, _>(ordinal)?),
        "FLOAT4" => Value::from(row.try_get::<f32, _>(ordinal)?),
        "FLOAT8" => Value::from(row.try_get::<f64, _>(ordinal)?),
        "JSON" | "JSONB" => row.try_get::<Value, _>(ordinal)?,
        "UUID" => Value::from(row.try_get::<uuid::Uuid, _>(ordinal)?.to_string()),
        "TIMESTAMP" => Value::from(
            row.try_get::<chrono::NaiveDateTime, _>(ordinal)?
                .to_string(),
        ),
        "TIMESTAMPTZ" => Value::from(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(ordinal)?
                .to_rfc3339(),
        ),
        "DATE" => Value::from(row.try_get::<chrono::NaiveDate, _>(ordinal)?.to_string()),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            Value::from(row.try_get::<String, _>(ordinal)?)
        }
        // Anything we don't recognise (numeric, arrays, composite types,
        // enums, ...) falls back to the driver's string representation --
        // scalar coercion of argument values is a non-goal, but shaping an
        // unfamiliar *return* type as text is strictly better than failing
        // the whole call.
        _ => match row.try_get::<String, _>(ordinal) {
            Ok(s) => Value::from(s),
            Err(_) => Value::Null,
        },
    };

    Ok(value)
}
