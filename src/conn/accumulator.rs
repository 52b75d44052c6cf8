//! Result-set accumulation: column definitions and rows stream in one
//! frame at a time and come out as a single [`ResultSet`] on the
//! terminating EOF.

use crate::error::Result;
use crate::protocol::column::ColumnDefinition;
use crate::protocol::row::{decode_text_row, TextRow};
use crate::resultset::{ResultSet, Row};
use crate::value::Value;

#[derive(Debug, Default)]
pub(crate) struct ResultSetAccumulator {
    columns: Vec<ColumnDefinition>,
    rows: Vec<Row>,
}

impl ResultSetAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a fresh result set announced with `column_count` columns.
    pub fn start(&mut self, column_count: u64) {
        self.columns.clear();
        self.rows.clear();
        self.columns.reserve(column_count.min(1024) as usize);
    }

    pub fn push_column(&mut self, column: ColumnDefinition) {
        self.columns.push(column);
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Append a text-protocol row, decoding the raw cells against the
    /// accumulated column metadata.
    pub fn push_text_row(&mut self, cells: TextRow) -> Result<()> {
        let values = decode_text_row(cells, &self.columns)?;
        self.rows.push(Row(values));
        Ok(())
    }

    /// Append an already-decoded binary-protocol row.
    pub fn push_binary_row(&mut self, values: Vec<Value>) {
        self.rows.push(Row(values));
    }

    /// The terminal event: hand out the accumulated result set and leave
    /// the accumulator empty for the next query.
    pub fn finish(&mut self) -> ResultSet {
        ResultSet {
            columns: std::mem::take(&mut self.columns),
            rows: std::mem::take(&mut self.rows),
        }
    }

    /// Drop any half-assembled state on an abnormal path.
    pub fn clear(&mut self) {
        self.columns.clear();
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::ColumnType;
    use pretty_assertions::assert_eq;

    #[test]
    fn accumulates_text_rows() {
        let mut acc = ResultSetAccumulator::new();
        acc.start(1);
        acc.push_column(ColumnDefinition::named("n", ColumnType::MYSQL_TYPE_LONGLONG));
        acc.push_text_row(vec![Some(b"1".to_vec())]).unwrap();
        acc.push_text_row(vec![None]).unwrap();

        let rs = acc.finish();
        assert_eq!(rs.rows.len(), 2);
        assert_eq!(rs.rows[0][0], Value::Int(1));
        assert_eq!(rs.rows[1][0], Value::Null);
        assert_eq!(rs.column_index("n"), Some(0));

        // accumulator is reusable after finish
        assert!(acc.columns().is_empty());
    }

    #[test]
    fn clear_drops_partial_state() {
        let mut acc = ResultSetAccumulator::new();
        acc.start(1);
        acc.push_column(ColumnDefinition::named("n", ColumnType::MYSQL_TYPE_LONG));
        acc.clear();
        assert!(acc.columns().is_empty());
        assert!(acc.finish().rows.is_empty());
    }
}
