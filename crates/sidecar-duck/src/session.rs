//! Shared session and per-transaction connections

use std::path::Path;

use duckdb::Connection;
use parking_lot::Mutex;

use crate::catalog::TableSchema;
use crate::table::Table;
use crate::StoreError;

/// Scope for store work on one connection
pub struct Store<'c> {
    conn: &'c Connection,
    schema: &'c str,
}

impl<'c> Store<'c> {
    pub(crate) fn new(conn: &'c Connection, schema: &'c str) -> Self {
        Self { conn, schema }
    }

    /// Resolve a table by name (case-insensitive)
    pub fn table(&self, name: &str) -> Result<Table<'c>, StoreError> {
        let schema = TableSchema::load(self.conn, self.schema, name)?;
        Ok(Table::new(self.conn, self.schema, schema))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub database: String,
    pub schema: String,
}

/// The process-wide store session
pub struct DuckSession {
    conn: Mutex<Connection>,
    database: String,
    schema: String,
}

impl DuckSession {
    /// Open (or create) a database file. `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: impl AsRef<Path>, schema: &str) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if path.as_os_str() == ":memory:" {
            let mut session = Self::open_in_memory()?;
            session.schema = schema.to_string();
            return Ok(session);
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        tracing::info!(database = %path.display(), schema, "store session opened");

        Ok(Self {
            conn: Mutex::new(conn),
            database: path.display().to_string(),
            schema: schema.to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            database: ":memory:".to_string(),
            schema: "main".to_string(),
        })
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            database: self.database.clone(),
            schema: self.schema.clone(),
        }
    }

    /// Run `f` on the shared connection
    pub fn run<T>(
        &self,
        f: impl FnOnce(&Store<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        f(&Store::new(&conn, &self.schema))
    }

    /// Run `f` inside its own transaction on the shared connection.
    /// Committed if `f` succeeds, rolled back otherwise.
    pub fn run_atomic<T, E: From<StoreError>>(
        &self,
        f: impl FnOnce(&Store<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN TRANSACTION")
            .map_err(StoreError::from)?;

        match f(&Store::new(&conn, &self.schema)) {
            Ok(value) => {
                conn.execute_batch("COMMIT").map_err(StoreError::from)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                    tracing::error!(error = %rollback_err, "rollback after failed write also failed");
                }
                Err(e)
            }
        }
    }

    /// Open a transaction on a dedicated connection to the same database
    pub fn begin(&self) -> Result<DuckTransaction, StoreError> {
        let conn = self.conn.lock().try_clone()?;
        conn.execute_batch("BEGIN TRANSACTION")?;

        Ok(DuckTransaction {
            state: Mutex::new(Some(OpenTransaction {
                conn,
                failed: false,
            })),
            schema: self.schema.clone(),
        })
    }

    /// Cheap liveness check. With `health_table`, also require that table
    /// to be visible in the catalog.
    pub fn ping(&self, health_table: Option<&str>) -> Result<(), StoreError> {
        self.run(|store| {
            store.conn.execute_batch("SELECT 1")?;
            if let Some(table) = health_table {
                store.table(table)?;
            }
            Ok(())
        })
    }

    /// Raw statements, for bootstrap and tests
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    pub fn close(self) -> Result<(), StoreError> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, e)| StoreError::Database(e))
    }
}

/// An open transaction on its own connection.
///
/// Commit and rollback consume the connection; any later use reports
/// [`StoreError::TransactionClosed`]. DuckDB discards a transaction as soon
/// as one of its statements fails, so the first failed unit of work marks
/// it aborted: further work is refused and commit rolls back instead.
pub struct DuckTransaction {
    state: Mutex<Option<OpenTransaction>>,
    schema: String,
}

struct OpenTransaction {
    conn: Connection,
    failed: bool,
}

impl DuckTransaction {
    pub fn run<T, E: From<StoreError>>(
        &self,
        f: impl FnOnce(&Store<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut guard = self.state.lock();
        let open = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
        if open.failed {
            return Err(StoreError::TransactionAborted.into());
        }

        let result = f(&Store::new(&open.conn, &self.schema));
        if result.is_err() {
            open.failed = true;
        }
        result
    }

    /// Commit, unless earlier work failed. An aborted transaction is rolled
    /// back and reported as [`StoreError::TransactionAborted`].
    pub fn commit(&self) -> Result<(), StoreError> {
        let open = self.take()?;
        if open.failed {
            open.conn.execute_batch("ROLLBACK")?;
            return Err(StoreError::TransactionAborted);
        }
        open.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback(&self) -> Result<(), StoreError> {
        self.take()?.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn take(&self) -> Result<OpenTransaction, StoreError> {
        self.state.lock().take().ok_or(StoreError::TransactionClosed)
    }
}
