//! Row and column containers exchanged with the store

use serde_json::{Map, Value};
use thiserror::Error;

/// One materialized result row, keyed by column name in schema order
pub type Row = Map<String, Value>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("Columnar data has no columns")]
    Empty,

    #[error("Column '{0}' must be a list of values")]
    NotAList(String),

    #[error("Column '{column}' has {actual} values, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Key column '{0}' is not present in the data")]
    MissingKey(String),
}

/// Column-oriented batch of rows: `{column: [v0, v1, ...]}`
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnarBatch {
    columns: Vec<(String, Vec<Value>)>,
    row_count: usize,
}

impl ColumnarBatch {
    /// Validate a `{column: [values]}` object. All columns must have the
    /// same number of values.
    pub fn from_json(data: Map<String, Value>) -> Result<Self, DataError> {
        let mut columns = Vec::with_capacity(data.len());
        let mut row_count = None;

        for (name, values) in data {
            let Value::Array(values) = values else {
                return Err(DataError::NotAList(name));
            };

            match row_count {
                None => row_count = Some(values.len()),
                Some(expected) if expected != values.len() => {
                    return Err(DataError::RaggedColumn {
                        column: name,
                        expected,
                        actual: values.len(),
                    });
                }
                Some(_) => {}
            }

            columns.push((name, values));
        }

        let row_count = row_count.ok_or(DataError::Empty)?;
        Ok(Self { columns, row_count })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(c, _)| c == name)
    }

    /// Values of row `index`, in column order
    pub fn row(&self, index: usize) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(move |(name, values)| (name.as_str(), &values[index]))
    }

    pub fn value(&self, column: &str, index: usize) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .and_then(|(_, values)| values.get(index))
    }

    /// Check that every key column is present
    pub fn require_keys(&self, keys: &[String]) -> Result<(), DataError> {
        match keys.iter().find(|k| !self.has_column(k)) {
            Some(missing) => Err(DataError::MissingKey(missing.clone())),
            None => Ok(()),
        }
    }
}

/// Text form of a scalar for binding into the store.
///
/// Strings bind verbatim, everything else by its JSON text; `null` is `None`.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
