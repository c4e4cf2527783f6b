//! Result-set to [`Table`] conversion for warehouse queries.
//!
//! Results are decoded from the binary protocol when every column has a
//! decoder. Otherwise (intervals, arrays, network types, out-of-range
//! numerics, ...) the statement is read as text and cells are parsed back
//! into typed values where the type is known, or kept as text.

use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Column as PgColumn, Row, SimpleQueryMessage};

use crate::core::{Column, SqlNullType, SqlValue, Table};
use crate::error::{EtlError, Result};

/// Cell type for the PostgreSQL types decoded natively.
fn null_type(ty: &Type) -> Option<SqlNullType> {
    let null = match ty.name() {
        "bool" => SqlNullType::Bool,
        "int2" => SqlNullType::I16,
        "int4" => SqlNullType::I32,
        "int8" | "oid" => SqlNullType::I64,
        "float4" => SqlNullType::F32,
        "float8" => SqlNullType::F64,
        "numeric" => SqlNullType::Decimal,
        "uuid" => SqlNullType::Uuid,
        "timestamp" => SqlNullType::DateTime,
        "timestamptz" => SqlNullType::DateTimeOffset,
        "date" => SqlNullType::Date,
        "time" => SqlNullType::Time,
        "bytea" => SqlNullType::Bytes,
        "json" | "jsonb" => SqlNullType::String,
        _ => return None,
    };
    Some(null)
}

/// Whether values of `ty` can be read from the binary protocol.
pub fn decodes_binary(ty: &Type) -> bool {
    null_type(ty).is_some() || <String as FromSql>::accepts(ty)
}

/// Build a table from the statement's column list and its rows.
///
/// Columns come from the prepared statement, so a query returning no rows
/// still yields a table with the right column names. A cell that cannot be
/// decoded is an [`EtlError::Conversion`].
pub fn rows_to_table(columns: &[PgColumn], rows: &[Row]) -> Result<Table> {
    let mut out = Vec::with_capacity(columns.len());
    for (idx, col) in columns.iter().enumerate() {
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            values.push(convert_value(row, idx, col)?);
        }
        out.push(Column::new(col.name(), values));
    }
    Table::from_columns(out)
}

/// Build a table from a simple-query response.
pub fn text_rows_to_table(
    columns: &[PgColumn],
    messages: &[SimpleQueryMessage],
) -> Result<Table> {
    let rows: Vec<_> = messages
        .iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect();

    let mut out = Vec::with_capacity(columns.len());
    for (idx, col) in columns.iter().enumerate() {
        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            values.push(text_value(col.type_(), row.try_get(idx)?));
        }
        out.push(Column::new(col.name(), values));
    }
    Table::from_columns(out)
}

/// Parse one text-protocol cell of type `ty`.
pub fn text_value(ty: &Type, text: Option<&str>) -> SqlValue {
    match (null_type(ty), text) {
        (Some(SqlNullType::Bytes), Some(s)) if s.starts_with("\\x") => {
            match hex::decode(&s[2..]) {
                Ok(bytes) => SqlValue::Bytes(bytes),
                Err(_) => SqlValue::Text(s.to_string()),
            }
        }
        (Some(null), text) => SqlValue::parse_text(text, null),
        (None, text) => SqlValue::parse_text(text, SqlNullType::String),
    }
}

fn get<'a, T, F>(
    row: &'a Row,
    col: &PgColumn,
    idx: usize,
    null: SqlNullType,
    wrap: F,
) -> Result<SqlValue>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> SqlValue,
{
    let value = row.try_get::<_, Option<T>>(idx).map_err(|e| {
        EtlError::Conversion(format!(
            "column '{}' ({}): {}",
            col.name(),
            col.type_().name(),
            e
        ))
    })?;
    Ok(value.map(wrap).unwrap_or(SqlValue::Null(null)))
}

/// Read one cell, dispatching on the PostgreSQL type name.
fn convert_value(row: &Row, idx: usize, col: &PgColumn) -> Result<SqlValue> {
    match col.type_().name() {
        "bool" => get(row, col, idx, SqlNullType::Bool, SqlValue::Bool),
        "int2" => get(row, col, idx, SqlNullType::I16, SqlValue::I16),
        "int4" => get(row, col, idx, SqlNullType::I32, SqlValue::I32),
        "int8" => get(row, col, idx, SqlNullType::I64, SqlValue::I64),
        "oid" => get(row, col, idx, SqlNullType::I64, |v: u32| {
            SqlValue::I64(i64::from(v))
        }),
        "float4" => get(row, col, idx, SqlNullType::F32, SqlValue::F32),
        "float8" => get(row, col, idx, SqlNullType::F64, SqlValue::F64),
        "numeric" => get(row, col, idx, SqlNullType::Decimal, SqlValue::Decimal),
        "uuid" => get(row, col, idx, SqlNullType::Uuid, SqlValue::Uuid),
        "timestamp" => get(row, col, idx, SqlNullType::DateTime, SqlValue::DateTime),
        "timestamptz" => get(
            row,
            col,
            idx,
            SqlNullType::DateTimeOffset,
            SqlValue::DateTimeOffset,
        ),
        "date" => get(row, col, idx, SqlNullType::Date, SqlValue::Date),
        "time" => get(row, col, idx, SqlNullType::Time, SqlValue::Time),
        "bytea" => get(row, col, idx, SqlNullType::Bytes, SqlValue::Bytes),
        "json" | "jsonb" => get(row, col, idx, SqlNullType::String, |v: serde_json::Value| {
            SqlValue::Text(v.to_string())
        }),
        _ => get(row, col, idx, SqlNullType::String, SqlValue::Text),
    }
}
