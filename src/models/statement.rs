//! Statement-related data models.
//!
//! This module defines bound statements, result rows and the outcome types of
//! the table-oriented convenience operations.

use crate::models::BindValue;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// One result row: column name to value, in the order the database returned the columns.
pub type Row = serde_json::Map<String, JsonValue>;

/// Options applied to statements that return rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Stop fetching after this many rows. `None` fetches the full result set.
    pub max_rows: Option<usize>,
    /// Render binary columns as UTF-8 text when valid, base64 otherwise.
    pub decode_binary: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the row limit.
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    pub fn with_decode_binary(mut self, decode_binary: bool) -> Self {
        self.decode_binary = decode_binary;
        self
    }

    /// Effective number of rows to pull from the result stream.
    pub fn row_limit(&self) -> usize {
        self.max_rows.unwrap_or(usize::MAX)
    }
}

/// A statement together with its positional bind values.
///
/// `options` apply when the statement is run with
/// [`QueryExecutor::query_statement`](crate::QueryExecutor::query_statement);
/// transaction units return no rows and ignore them.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub binds: Vec<BindValue>,
    pub options: QueryOptions,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
            options: QueryOptions::default(),
        }
    }

    /// Append a positional bind value.
    pub fn bind(mut self, value: impl Into<BindValue>) -> Self {
        self.binds.push(value.into());
        self
    }

    /// Replace the bind values.
    pub fn with_binds(mut self, binds: Vec<BindValue>) -> Self {
        self.binds = binds;
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }
}

/// One statement of an atomic multi-statement sequence.
pub type TransactionUnit = BoundStatement;

/// Ordered column-to-value mapping used to build INSERT and UPDATE statements.
///
/// Iteration order is insertion order and determines both the column order of
/// the generated statement and the order of its binds. Setting a column twice
/// replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnValues {
    entries: Vec<(String, BindValue)>,
}

impl ColumnValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`ColumnValues::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<BindValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<BindValue>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Values in column order.
    pub fn values(&self) -> Vec<BindValue> {
        self.entries.iter().map(|(_, value)| value.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<BindValue>> FromIterator<(K, V)> for ColumnValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (column, value) in iter {
            values.set(column, value);
        }
        values
    }
}

/// Argument of a stored procedure call.
///
/// The name, when given, selects named notation on PostgreSQL and labels the
/// output value in [`ProcedureResult::outputs`] on every backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureArg {
    pub name: Option<String>,
    pub value: BindValue,
}

impl ProcedureArg {
    pub fn positional(value: impl Into<BindValue>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }

    pub fn named(name: impl Into<String>, value: impl Into<BindValue>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
        }
    }
}

/// Values produced by a stored procedure call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcedureResult {
    /// Output slots keyed by argument name, or `out<position>` for unnamed ones
    pub outputs: Row,
    /// Rows of any result set the routine returned
    pub rows: Vec<Row>,
}

impl ProcedureResult {
    pub fn output(&self, key: &str) -> Option<&JsonValue> {
        self.outputs.get(key)
    }
}

/// Result of an insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertOutcome {
    /// Value of the requested returning column
    Key(JsonValue),
    /// A returning column was requested but the database produced no value
    KeyAbsent,
    /// No returning column was requested
    RowsAffected(u64),
}

impl InsertOutcome {
    pub fn key(&self) -> Option<&JsonValue> {
        match self {
            Self::Key(value) => Some(value),
            _ => None,
        }
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            Self::RowsAffected(n) => Some(*n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_options_defaults() {
        let options = QueryOptions::default();
        assert_eq!(options.row_limit(), usize::MAX);
        assert!(!options.decode_binary);
        assert_eq!(QueryOptions::new().with_max_rows(5).row_limit(), 5);
    }

    #[test]
    fn test_bound_statement_builder() {
        let stmt = BoundStatement::new("SELECT * FROM t WHERE a = ? AND b = ?")
            .bind(1i64)
            .bind("x");
        assert_eq!(stmt.binds, vec![BindValue::Int(1), BindValue::from("x")]);
    }

    #[test]
    fn test_column_values_keep_insertion_order() {
        let values = ColumnValues::new()
            .with("name", "widget")
            .with("qty", 3i64)
            .with("price", 9.5);
        let columns: Vec<&str> = values.columns().collect();
        assert_eq!(columns, vec!["name", "qty", "price"]);
        assert_eq!(values.values()[1], BindValue::Int(3));
    }

    #[test]
    fn test_column_values_overwrite_in_place() {
        let values: ColumnValues = [("a", 1i64), ("b", 2i64), ("a", 3i64)]
            .into_iter()
            .collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values.columns().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(values.values()[0], BindValue::Int(3));
    }

    #[test]
    fn test_insert_outcome_accessors() {
        assert_eq!(
            InsertOutcome::Key(serde_json::json!(5)).key(),
            Some(&serde_json::json!(5))
        );
        assert_eq!(InsertOutcome::RowsAffected(0).rows_affected(), Some(0));
        assert_eq!(InsertOutcome::KeyAbsent.key(), None);
        assert_eq!(InsertOutcome::KeyAbsent.rows_affected(), None);
    }
}
