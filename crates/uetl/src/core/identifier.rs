//! Identifier quoting and warehouse naming conventions.
//!
//! Identifiers cannot be bound as statement parameters, so table and column
//! names written into generated SQL are validated and double-quoted here.

use crate::error::{EtlError, Result};

/// PostgreSQL truncates identifiers beyond this many bytes.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier before it is spliced into SQL.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(EtlError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(EtlError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(EtlError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// ```
/// use uetl::core::identifier::quote_pg;
/// assert_eq!(quote_pg("dim_date").unwrap(), "\"dim_date\"");
/// assert_eq!(quote_pg("a\"b").unwrap(), "\"a\"\"b\"");
/// ```
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Name of the surrogate key column written for an indexed load.
///
/// Warehouse tables are named `<prefix>_<suffix>` (`dim_date`, `fact_sales`);
/// the key column is the second `_`-separated token plus `_sk`. Only that
/// token is used, so `dim_sales_region` yields `sales_sk`.
pub fn surrogate_key_column(table_name: &str) -> Result<String> {
    match table_name.split('_').nth(1) {
        Some(suffix) if !suffix.is_empty() => Ok(format!("{}_sk", suffix)),
        _ => Err(EtlError::InvalidTableName(table_name.to_string())),
    }
}
