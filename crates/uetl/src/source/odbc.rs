//! ODBC plumbing shared by the source adapters.

use std::borrow::Cow;
use std::sync::OnceLock;

use odbc_api::buffers::TextRowSet;
use odbc_api::{Connection, ConnectionOptions, Cursor, DataType, Environment, ResultSetMetadata};
use tracing::{debug, info};

use crate::core::{Column, SqlNullType, SqlValue, Table};
use crate::error::{EtlError, Result};

/// Rows fetched per round trip.
const FETCH_BATCH_SIZE: usize = 1000;

/// Upper bound for a single text cell, in bytes. Longer cells fail the fetch.
const MAX_TEXT_LEN: usize = 65536;

/// SQL Server `uniqueidentifier`.
const SQL_GUID: i16 = -11;

/// SQL Server `datetimeoffset`.
const SQL_SS_TIMESTAMPOFFSET: i16 = -155;

static ODBC_ENV: OnceLock<Environment> = OnceLock::new();

/// The process-wide ODBC environment.
fn environment() -> Result<&'static Environment> {
    if let Some(env) = ODBC_ENV.get() {
        return Ok(env);
    }
    let env = Environment::new()?;
    Ok(ODBC_ENV.get_or_init(|| env))
}

/// Quote a connection-string attribute value when it needs it.
pub fn quote_value(value: &str) -> Cow<'_, str> {
    let needs_braces = value.contains([';', '{', '}'])
        || value.starts_with(' ')
        || value.ends_with(' ');
    if needs_braces {
        Cow::Owned(format!("{{{}}}", value.replace('}', "}}")))
    } else {
        Cow::Borrowed(value)
    }
}

/// `Driver={...}` attribute; the driver name is always braced.
pub fn driver_attribute(driver: &str) -> String {
    format!("Driver={{{}}};", driver.replace('}', "}}"))
}

/// An optional, lazily opened ODBC connection.
#[derive(Default)]
pub struct OdbcHandle {
    connection: Option<Connection<'static>>,
}

impl OdbcHandle {
    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Open the connection unless it is already open.
    ///
    /// `redacted` is the connection string with credentials hidden.
    pub fn open(&mut self, connection_string: &str, redacted: &str) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }
        debug!("ODBC connection string (credentials hidden): {}", redacted);
        let connection = environment()?
            .connect_with_connection_string(connection_string, ConnectionOptions::default())?;
        self.connection = Some(connection);
        Ok(())
    }

    /// Drop the connection, if any.
    pub fn close(&mut self) -> bool {
        self.connection.take().is_some()
    }

    /// Run `sql` on the open connection.
    pub fn fetch_table(&self, sql: &str) -> Result<Table> {
        match &self.connection {
            Some(conn) => fetch_table(conn, sql),
            None => Err(EtlError::Config("ODBC connection is not open".to_string())),
        }
    }
}

/// Execute `sql` and collect the whole result set.
///
/// Statements that produce no cursor yield an empty table.
pub fn fetch_table(conn: &Connection<'_>, sql: &str) -> Result<Table> {
    let Some(mut cursor) = conn.execute(sql, ())? else {
        return Ok(Table::empty());
    };

    let num_cols = cursor.num_result_cols()?;
    let mut names = Vec::with_capacity(num_cols as usize);
    let mut types = Vec::with_capacity(num_cols as usize);
    for i in 1..=num_cols as u16 {
        names.push(cursor.col_name(i)?);
        types.push(null_type_for(&cursor.col_data_type(i)?));
    }

    let mut values: Vec<Vec<SqlValue>> = vec![Vec::new(); names.len()];
    let mut buffers = TextRowSet::for_cursor(FETCH_BATCH_SIZE, &mut cursor, Some(MAX_TEXT_LEN))?;
    let mut row_cursor = cursor.bind_buffer(&mut buffers)?;

    while let Some(batch) = row_cursor
        .fetch_with_truncation_check(true)
        .map_err(|e| truncation_error(e, &names))?
    {
        for row_idx in 0..batch.num_rows() {
            for (col_idx, ty) in types.iter().enumerate() {
                let text = batch.at(col_idx, row_idx).map(decode_text);
                values[col_idx].push(SqlValue::parse_text(text.as_deref(), *ty));
            }
        }
    }

    let columns = names
        .into_iter()
        .zip(values)
        .map(|(name, vals)| Column::new(name, vals))
        .collect();
    let table = Table::from_columns(columns)?;
    info!(
        "Fetched {} rows x {} columns from source",
        table.num_rows(),
        table.num_columns()
    );
    Ok(table)
}

/// Name the column when a cell did not fit its buffer; other errors pass
/// through unchanged.
fn truncation_error(err: odbc_api::Error, names: &[String]) -> EtlError {
    match err {
        odbc_api::Error::TooLargeValueForBuffer {
            indicator,
            buffer_index,
        } => {
            let column = names
                .get(buffer_index)
                .map(String::as_str)
                .unwrap_or("?");
            let size = indicator
                .map(|n| format!("{} bytes", n))
                .unwrap_or_else(|| "unknown size".to_string());
            EtlError::Conversion(format!(
                "value in column '{}' ({}) exceeds the {} byte text buffer",
                column, size, MAX_TEXT_LEN
            ))
        }
        other => EtlError::Source(other),
    }
}

/// Cells arrive in the client character set; anything that is not UTF-8 is
/// read as Latin-1.
fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
    }
}

/// Map an ODBC column type to the cell type used for parsing.
pub fn null_type_for(data_type: &DataType) -> SqlNullType {
    match data_type {
        DataType::Bit => SqlNullType::Bool,
        DataType::TinyInt | DataType::SmallInt => SqlNullType::I16,
        DataType::Integer => SqlNullType::I32,
        DataType::BigInt => SqlNullType::I64,
        DataType::Real => SqlNullType::F32,
        DataType::Float { .. } | DataType::Double => SqlNullType::F64,
        DataType::Numeric { .. } | DataType::Decimal { .. } => SqlNullType::Decimal,
        DataType::Date => SqlNullType::Date,
        DataType::Time { .. } => SqlNullType::Time,
        DataType::Timestamp { .. } => SqlNullType::DateTime,
        DataType::Binary { .. } | DataType::Varbinary { .. } | DataType::LongVarbinary { .. } => {
            SqlNullType::Bytes
        }
        DataType::Other { data_type, .. } if data_type.0 == SQL_GUID => SqlNullType::Uuid,
        DataType::Other { data_type, .. } if data_type.0 == SQL_SS_TIMESTAMPOFFSET => {
            SqlNullType::DateTimeOffset
        }
        _ => SqlNullType::String,
    }
}
