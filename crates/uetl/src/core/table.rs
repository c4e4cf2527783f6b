//! In-memory tabular data handed between extract and load steps.

use std::fmt;

use crate::error::{EtlError, Result};

use super::value::{SqlNullType, SqlValue};

/// A named, homogeneous sequence of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<SqlValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<SqlValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Build a column from plain Rust values.
    pub fn from_values<T: Into<SqlValue>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        Self::new(name, values.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column type: the first non-NULL cell decides, then the first NULL's
    /// hint, then text.
    pub fn data_type(&self) -> SqlNullType {
        self.values
            .iter()
            .find(|v| !v.is_null())
            .or_else(|| self.values.first())
            .map(SqlValue::null_type)
            .unwrap_or(SqlNullType::String)
    }
}

/// Ordered collection of equally long columns with an optional index.
///
/// The index is a separate sequence that is not one of the named columns;
/// when absent, rows are indexed `0..num_rows`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    index: Option<Vec<SqlValue>>,
    num_rows: usize,
}

impl Table {
    /// A table with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a table from columns, all of which must have the same length.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let num_rows = columns.first().map(Column::len).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.len() != num_rows) {
            return Err(EtlError::Conversion(format!(
                "column '{}' has {} rows, expected {}",
                bad.name,
                bad.len(),
                num_rows
            )));
        }
        Ok(Self {
            columns,
            index: None,
            num_rows,
        })
    }

    /// Attach a designated index. Its length must match the row count.
    pub fn with_index(mut self, index: Vec<SqlValue>) -> Result<Self> {
        if !self.columns.is_empty() && index.len() != self.num_rows {
            return Err(EtlError::Conversion(format!(
                "index has {} entries, table has {} rows",
                index.len(),
                self.num_rows
            )));
        }
        if self.columns.is_empty() {
            self.num_rows = index.len();
        }
        self.index = Some(index);
        Ok(self)
    }

    /// Append a column at the end.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        let has_rows = !self.columns.is_empty() || self.index.is_some();
        if has_rows && column.len() != self.num_rows {
            return Err(EtlError::Conversion(format!(
                "column '{}' has {} rows, expected {}",
                column.name,
                column.len(),
                self.num_rows
            )));
        }
        self.num_rows = column.len();
        self.columns.push(column);
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when there are no rows (columns may still be present).
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// The designated index, if one was attached.
    pub fn index(&self) -> Option<&[SqlValue]> {
        self.index.as_deref()
    }

    /// The designated index, or a `0..num_rows` range index.
    pub fn effective_index(&self) -> Vec<SqlValue> {
        match &self.index {
            Some(index) => index.clone(),
            None => (0..self.num_rows as i64).map(SqlValue::I64).collect(),
        }
    }

    /// Row-major copy of a single row.
    pub fn row(&self, idx: usize) -> Option<Vec<&SqlValue>> {
        if idx >= self.num_rows {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[idx]).collect())
    }

    /// Iterate rows in order.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&SqlValue>> + '_ {
        (0..self.num_rows).map(move |i| self.columns.iter().map(|c| &c.values[i]).collect())
    }

    /// First `n` rows as a new table (index preserved).
    pub fn head(&self, n: usize) -> Table {
        let take = n.min(self.num_rows);
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.values[..take].to_vec()))
                .collect(),
            index: self.index.as_ref().map(|i| i[..take].to_vec()),
            num_rows: take,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index: Vec<String> = self.effective_index().iter().map(|v| v.to_string()).collect();
        let cells: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|c| c.values.iter().map(|v| v.to_string()).collect())
            .collect();

        let index_width = index.iter().map(String::len).max().unwrap_or(0);
        let widths: Vec<usize> = self
            .columns
            .iter()
            .zip(&cells)
            .map(|(c, vals)| {
                vals.iter()
                    .map(String::len)
                    .chain(std::iter::once(c.name.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        write!(f, "{:width$}", "", width = index_width)?;
        for (c, w) in self.columns.iter().zip(&widths) {
            write!(f, "  {:>width$}", c.name, width = *w)?;
        }
        writeln!(f)?;

        for (row, idx) in index.iter().enumerate() {
            write!(f, "{:<width$}", idx, width = index_width)?;
            for (vals, w) in cells.iter().zip(&widths) {
                write!(f, "  {:>width$}", vals[row], width = *w)?;
            }
            writeln!(f)?;
        }

        write!(
            f,
            "[{} rows x {} columns]",
            self.num_rows,
            self.columns.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_columns(vec![
            Column::from_values("id", [1i32, 2, 3]),
            Column::from_values("name", ["a", "b", "c"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_counts_rows() {
        let t = sample();
        assert_eq!(t.num_rows(), 3);
        assert_eq!(t.num_columns(), 2);
        assert_eq!(t.column_names(), vec!["id", "name"]);
        assert!(!t.is_empty());
    }

    #[test]
    fn test_from_columns_rejects_ragged() {
        let err = Table::from_columns(vec![
            Column::from_values("id", [1i32, 2]),
            Column::from_values("name", ["a"]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_effective_index_defaults_to_range() {
        let t = sample();
        assert_eq!(
            t.effective_index(),
            vec![SqlValue::I64(0), SqlValue::I64(1), SqlValue::I64(2)]
        );
    }

    #[test]
    fn test_with_index() {
        let t = sample()
            .with_index(vec![SqlValue::I64(1), SqlValue::I64(2), SqlValue::I64(3)])
            .unwrap();
        assert_eq!(t.index().unwrap()[0], SqlValue::I64(1));
        assert!(sample().with_index(vec![SqlValue::I64(1)]).is_err());
    }

    #[test]
    fn test_rows_and_head() {
        let t = sample();
        let rows: Vec<_> = t.rows().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][1], &SqlValue::Text("b".into()));

        let h = t.head(2);
        assert_eq!(h.num_rows(), 2);
        assert_eq!(t.head(10).num_rows(), 3);
        assert!(t.row(3).is_none());
    }

    #[test]
    fn test_push_column_checks_length() {
        let mut t = sample();
        assert!(t.push_column(Column::from_values("x", [1i64])).is_err());
        t.push_column(Column::from_values("x", [1i64, 2, 3])).unwrap();
        assert_eq!(t.num_columns(), 3);

        let mut e = Table::empty();
        e.push_column(Column::from_values("y", [true, false])).unwrap();
        assert_eq!(e.num_rows(), 2);
    }

    #[test]
    fn test_column_data_type() {
        let c = Column::new(
            "v",
            vec![SqlValue::Null(SqlNullType::F64), SqlValue::F64(1.0)],
        );
        assert_eq!(c.data_type(), SqlNullType::F64);
        assert_eq!(Column::new("e", vec![]).data_type(), SqlNullType::String);
    }

    #[test]
    fn test_display_shape_footer() {
        let out = sample().to_string();
        assert!(out.contains("name"));
        assert!(out.ends_with("[3 rows x 2 columns]"));
        assert!(Table::empty().to_string().ends_with("[0 rows x 0 columns]"));
    }
}
