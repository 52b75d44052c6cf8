//! Caller-facing query results.

use std::ops::Index;

use crate::constant::ServerStatusFlags;
use crate::protocol::column::ColumnDefinition;
use crate::protocol::response::{EofPayload, OkPayload};
use crate::value::Value;

/// One row of a result set: a fixed-arity tuple indexed by column
/// position.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.0[index]
    }
}

/// An ordered result set with its column metadata.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: Vec<ColumnDefinition>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Position of a column by result-set name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// The value a completed query delivers.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows_affected: i64,
    pub message: Option<String>,
    /// `-1` when the completion carries a result set instead of an
    /// insert id.
    pub last_insert_id: i64,
    pub status_flags: ServerStatusFlags,
    pub warnings: u16,
    pub result_set: Option<ResultSet>,
}

impl QueryResult {
    /// Result of a query the server answered with a bare OK: the
    /// server-sent values are reported verbatim.
    pub(crate) fn from_ok(ok: &OkPayload) -> Self {
        Self {
            rows_affected: ok.affected_rows as i64,
            message: Some(ok.info.clone()).filter(|info| !info.is_empty()),
            last_insert_id: ok.last_insert_id as i64,
            status_flags: ok.status_flags,
            warnings: ok.warnings,
            result_set: None,
        }
    }

    /// Result of a query that produced a result set; `rows_affected`
    /// reports the row count and there is no insert id.
    pub(crate) fn from_result_set(result_set: ResultSet, eof: &EofPayload) -> Self {
        Self {
            rows_affected: result_set.rows.len() as i64,
            message: None,
            last_insert_id: -1,
            status_flags: eof.status_flags,
            warnings: eof.warnings,
            result_set: Some(result_set),
        }
    }
}
