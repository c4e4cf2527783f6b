//! SQL generation for append-mode table loads.

use crate::core::identifier::quote_pg;
use crate::core::{Column, Table};
use crate::error::{EtlError, Result};

/// Column layout of one load: an optional key column followed by the
/// table's own columns.
pub struct LoadLayout<'a> {
    columns: Vec<&'a Column>,
    num_rows: usize,
}

impl<'a> LoadLayout<'a> {
    pub fn new(table: &'a Table, key: Option<&'a Column>) -> Self {
        let columns = key.into_iter().chain(table.columns()).collect();
        Self {
            columns,
            num_rows: table.num_rows(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// `CREATE TABLE IF NOT EXISTS` with column types inferred from the data.
    pub fn create_table_sql(&self, table_name: &str) -> Result<String> {
        let mut defs = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            defs.push(format!(
                "    {} {}",
                quote_pg(&col.name)?,
                col.data_type().pg_type()
            ));
        }

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            quote_pg(table_name)?,
            defs.join(",\n")
        ))
    }

    /// Multi-row INSERT statements, `chunk_size` rows each (all rows in one
    /// statement when `None`).
    pub fn insert_statements(
        &self,
        table_name: &str,
        chunk_size: Option<usize>,
    ) -> Result<Vec<String>> {
        let chunk = match chunk_size {
            Some(0) => {
                return Err(EtlError::Config(
                    "chunk_size must be greater than zero".to_string(),
                ))
            }
            Some(n) => n,
            None => self.num_rows.max(1),
        };

        if self.num_rows == 0 || self.columns.is_empty() {
            return Ok(Vec::new());
        }

        let target = quote_pg(table_name)?;
        let col_list = self
            .columns
            .iter()
            .map(|c| quote_pg(&c.name))
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        let mut statements = Vec::with_capacity(self.num_rows.div_ceil(chunk));
        let mut start = 0;
        while start < self.num_rows {
            let end = (start + chunk).min(self.num_rows);
            let value_rows: Vec<String> = (start..end)
                .map(|row| {
                    let values: Vec<String> = self
                        .columns
                        .iter()
                        .map(|c| c.values[row].to_pg_literal())
                        .collect();
                    format!("({})", values.join(", "))
                })
                .collect();

            statements.push(format!(
                "INSERT INTO {} ({}) VALUES {}",
                target,
                col_list,
                value_rows.join(", ")
            ));
            start = end;
        }

        Ok(statements)
    }
}

/// Key column for an indexed load.
pub fn key_column(name: String, table: &Table) -> Column {
    Column::new(name, table.effective_index())
}
