//! DuckDB-backed columnar store
//!
//! A [`DuckSession`] owns the shared connection. Work against it goes through
//! a [`Store`] scope, which hands out [`Table`]s resolved from the catalog.
//! Tables expose a small structured API (select with filters, ordering and a
//! limit; insert; keyed existence checks; update) so callers never build SQL
//! text themselves.

use thiserror::Error;

mod catalog;
mod session;
mod table;
mod value;

pub use catalog::{ColumnInfo, TableSchema};
pub use session::{DuckSession, DuckTransaction, SessionInfo, Store};
pub use table::{Select, Table};
pub use value::to_json;

use sidecar_ir::DataError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("Transaction is already closed")]
    TransactionClosed,

    #[error("Transaction aborted by an earlier failure; its changes were discarded")]
    TransactionAborted,

    #[error(transparent)]
    InvalidData(#[from] DataError),
}

/// Coarse classification used to pick a client-facing error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Store cannot be reached or is locked
    Unavailable,
    /// Input was refused (bad value, constraint, type mismatch)
    Rejected,
    NotFound,
    /// Lost to a concurrent writer, or the transaction was already aborted
    Conflict,
    Other,
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::Io(_) => StoreErrorKind::Unavailable,
            StoreError::TableNotFound(_)
            | StoreError::ColumnNotFound { .. }
            | StoreError::TransactionClosed => StoreErrorKind::NotFound,
            StoreError::TransactionAborted => StoreErrorKind::Conflict,
            StoreError::InvalidData(_) => StoreErrorKind::Rejected,
            StoreError::Database(e) => classify_database_error(e),
        }
    }
}

fn classify_database_error(error: &duckdb::Error) -> StoreErrorKind {
    use duckdb::Error;

    match error {
        Error::InvalidPath(_) => return StoreErrorKind::Unavailable,
        Error::ToSqlConversionFailure(_) | Error::FromSqlConversionFailure(..) => {
            return StoreErrorKind::Rejected
        }
        _ => {}
    }

    // DuckDB reports its error class as a message prefix
    let message = error.to_string();
    const UNAVAILABLE: &[&str] = &["IO Error", "Connection Error", "Could not set lock"];
    // Write-write conflicts and statements on an aborted transaction
    const CONFLICT: &[&str] = &["TransactionContext Error"];
    const REJECTED: &[&str] = &[
        "Conversion Error",
        "Binder Error",
        "Constraint Error",
        "Invalid Input Error",
        "Mismatch Type Error",
        "Out of Range Error",
    ];

    if UNAVAILABLE.iter().any(|p| message.contains(p)) {
        StoreErrorKind::Unavailable
    } else if CONFLICT.iter().any(|p| message.contains(p)) {
        StoreErrorKind::Conflict
    } else if REJECTED.iter().any(|p| message.contains(p)) {
        StoreErrorKind::Rejected
    } else {
        StoreErrorKind::Other
    }
}

/// Quote an identifier for DuckDB
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("status"), "\"status\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            StoreError::TableNotFound("t".into()).kind(),
            StoreErrorKind::NotFound
        );
        assert_eq!(
            StoreError::InvalidData(DataError::Empty).kind(),
            StoreErrorKind::Rejected
        );
        assert_eq!(
            StoreError::Io(std::io::Error::other("disk")).kind(),
            StoreErrorKind::Unavailable
        );
    }

    #[test]
    fn test_database_errors_classified_by_class() -> Result<(), StoreError> {
        let session = DuckSession::open_in_memory()?;
        session.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, n INTEGER)")?;
        session.execute_batch("INSERT INTO t VALUES (1, 1)")?;

        let conversion = session
            .execute_batch("SELECT CAST('abc' AS INTEGER)")
            .unwrap_err();
        assert_eq!(conversion.kind(), StoreErrorKind::Rejected);

        let constraint = session
            .execute_batch("INSERT INTO t VALUES (1, 2)")
            .unwrap_err();
        assert_eq!(constraint.kind(), StoreErrorKind::Rejected);

        Ok(())
    }

    #[test]
    fn test_concurrent_update_is_conflict() -> Result<(), StoreError> {
        let session = DuckSession::open_in_memory()?;
        session.execute_batch("CREATE TABLE t (id INTEGER, n INTEGER)")?;
        session.execute_batch("INSERT INTO t VALUES (1, 1)")?;

        let tx = session.begin()?;
        tx.run(|store| -> Result<(), StoreError> {
            store
                .table("t")?
                .update_where(&[("n", Some("2".to_string()))], &[("id", Some("1".to_string()))])?;
            Ok(())
        })?;

        let lost = session
            .execute_batch("UPDATE t SET n = 3 WHERE id = 1")
            .unwrap_err();
        assert_eq!(lost.kind(), StoreErrorKind::Conflict);
        assert!(lost.to_string().contains("Conflict"));

        tx.commit()?;
        Ok(())
    }
}
