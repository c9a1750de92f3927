//! Query results and how rows are consumed.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::backend::DataRow;
use crate::row::{Column, ColumnIndex, Row, RowDescription};
use crate::types::Value;

/// How the rows of a query reach the caller.
pub enum RowMode<'h> {
    /// Collect every row into the returned [`ResultSet`].
    Buffered,
    /// Hand each row to the callback; the returned [`ResultSet`] holds no rows.
    ///
    /// An error from the callback stops delivery. The connection still reads
    /// the rest of the response before the error is returned.
    Streaming(&'h mut dyn FnMut(Row) -> Result<()>),
}

impl std::fmt::Debug for RowMode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowMode::Buffered => f.write_str("Buffered"),
            RowMode::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

/// Result of one statement: its columns, buffered rows and command tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    description: Option<Arc<RowDescription>>,
    rows: Vec<Row>,
    tag: Option<String>,
}

impl ResultSet {
    pub fn new(
        description: Option<Arc<RowDescription>>,
        rows: Vec<Row>,
        tag: Option<String>,
    ) -> Self {
        Self {
            description,
            rows,
            tag,
        }
    }

    /// Number of buffered rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Row at `index`; negative indices count from the end.
    pub fn row(&self, index: isize) -> Result<&Row> {
        let position = if index < 0 {
            self.rows.len().checked_sub(index.unsigned_abs())
        } else {
            Some(index.unsigned_abs())
        };
        position
            .and_then(|position| self.rows.get(position))
            .ok_or_else(|| {
                Error::NotFound(format!("row {index} (result has {} rows)", self.rows.len()))
            })
    }

    /// Value of column `column` in row `row`.
    pub fn fetch<I: ColumnIndex>(&self, row: isize, column: I) -> Result<&Value> {
        self.row(row)?.get(column)
    }

    /// First column of the first row.
    pub fn value(&self) -> Result<&Value> {
        self.fetch(0, 0usize)
    }

    pub fn description(&self) -> Option<&Arc<RowDescription>> {
        self.description.as_ref()
    }

    /// Columns of the result, empty for statements that return no rows.
    pub fn columns(&self) -> &[Column] {
        self.description
            .as_deref()
            .map(RowDescription::columns)
            .unwrap_or_default()
    }

    /// Command tag, e.g. `SELECT` or `INSERT 0 3`.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Rows affected, taken from the command tag.
    pub fn rows_affected(&self) -> Option<u64> {
        let mut parts = self.tag.as_deref()?.split_whitespace();
        let _command = parts.next()?;
        parts.last()?.parse().ok()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Assembles the [`ResultSet`] of a request cycle.
///
/// Each statement starts with `start` (or a description known up front),
/// receives rows and ends with `complete`. Only the last completed statement
/// is kept.
#[derive(Debug)]
pub struct ResultBuilder<'h> {
    mode: RowMode<'h>,
    description: Option<Arc<RowDescription>>,
    rows: Vec<Row>,
    in_statement: bool,
    last: Option<ResultSet>,
}

impl<'h> ResultBuilder<'h> {
    pub fn new(mode: RowMode<'h>) -> Self {
        Self {
            mode,
            description: None,
            rows: Vec::new(),
            in_statement: false,
            last: None,
        }
    }

    /// Begin a statement that returns rows described by `description`.
    pub fn start(&mut self, description: Arc<RowDescription>) -> Result<()> {
        if self.in_statement {
            return Err(Error::Message(
                "RowDescription received before the previous result completed".into(),
            ));
        }
        self.description = Some(description);
        self.rows.clear();
        self.in_statement = true;
        Ok(())
    }

    /// Convert a DataRow and buffer it or hand it to the callback.
    pub fn add_row(&mut self, data_row: &DataRow<'_>) -> Result<()> {
        let description = self
            .description
            .as_ref()
            .filter(|_| self.in_statement)
            .ok_or_else(|| Error::Message("DataRow received without a RowDescription".into()))?;
        let row = Row::from_data_row(description, data_row)?;
        match &mut self.mode {
            RowMode::Buffered => self.rows.push(row),
            RowMode::Streaming(callback) => (**callback)(row)?,
        }
        Ok(())
    }

    /// End the current statement.
    ///
    /// `tag` is `None` when a portal was suspended before the command finished.
    pub fn complete(&mut self, tag: Option<&str>) {
        let description = if self.in_statement {
            self.description.take()
        } else {
            None
        };
        self.in_statement = false;
        self.last = Some(ResultSet {
            description,
            rows: std::mem::take(&mut self.rows),
            tag: tag.map(str::to_string),
        });
    }

    /// The last completed statement, or an empty result if none completed.
    pub fn finish(self) -> ResultSet {
        self.last.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::tests::description;

    fn data_row(payload: &[u8]) -> DataRow<'_> {
        DataRow::parse(payload).unwrap()
    }

    #[test]
    fn test_buffered_scenario() {
        let mut builder = ResultBuilder::new(RowMode::Buffered);
        builder.start(description(&[("id", 6)])).unwrap();
        builder.add_row(&data_row(b"\x00\x01\x00\x00\x00\x0242")).unwrap();
        builder.add_row(&data_row(b"\x00\x01\xff\xff\xff\xff")).unwrap();
        builder.complete(Some("SELECT 2"));
        let result = builder.finish();

        assert_eq!(result.len(), 2);
        assert_eq!(result.fetch(0, "id").unwrap(), &Value::Integer(42));
        assert_eq!(result.value().unwrap(), &Value::Integer(42));
        assert_eq!(result.fetch(-1, 0usize).unwrap(), &Value::Null);
        assert_eq!(result.rows_affected(), Some(2));
        assert_eq!(result.columns()[0].name(), "id");
        assert!(matches!(result.row(2), Err(Error::NotFound(_))));
        assert!(matches!(result.row(-3), Err(Error::NotFound(_))));
        assert!(matches!(result.fetch(0, "nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_streaming_buffers_nothing() {
        let mut seen = Vec::new();
        let mut callback = |row: Row| -> Result<()> {
            seen.push(row.get(0usize)?.clone());
            Ok(())
        };
        let mut builder = ResultBuilder::new(RowMode::Streaming(&mut callback));
        builder.start(description(&[("n", 6)])).unwrap();
        builder.add_row(&data_row(b"\x00\x01\x00\x00\x00\x011")).unwrap();
        builder.add_row(&data_row(b"\x00\x01\x00\x00\x00\x012")).unwrap();
        builder.complete(Some("SELECT 2"));
        let result = builder.finish();
        drop(callback);

        assert!(result.is_empty());
        assert_eq!(result.tag(), Some("SELECT 2"));
        assert_eq!(seen, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_last_statement_wins() {
        let mut builder = ResultBuilder::new(RowMode::Buffered);
        builder.start(description(&[("a", 6)])).unwrap();
        builder.add_row(&data_row(b"\x00\x01\x00\x00\x00\x011")).unwrap();
        builder.complete(Some("SELECT 1"));
        builder.complete(Some("CREATE TABLE"));
        let result = builder.finish();

        assert!(result.is_empty());
        assert!(result.columns().is_empty());
        assert_eq!(result.tag(), Some("CREATE TABLE"));
        assert_eq!(result.rows_affected(), None);
    }

    #[test]
    fn test_row_without_description() {
        let mut builder = ResultBuilder::new(RowMode::Buffered);
        assert!(builder.add_row(&data_row(b"\x00\x00")).is_err());
    }

    #[test]
    fn test_description_fixed_mid_result() {
        let mut builder = ResultBuilder::new(RowMode::Buffered);
        builder.start(description(&[("a", 6)])).unwrap();
        assert!(builder.start(description(&[("b", 6)])).is_err());
    }
}
