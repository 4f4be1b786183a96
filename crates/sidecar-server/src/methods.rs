//! RPC method implementations
//!
//! Each method binds its params into a struct that rejects unknown fields,
//! then works against either the shared session or the transaction named by
//! `tx_id`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sidecar_duck::{DuckSession, DuckTransaction, Store, StoreError};
use sidecar_ir::{scalar_text, CompareOp};

use crate::config::Config;
use crate::error::RpcError;
use crate::metrics::Metrics;
use crate::query::QueryExecutor;
use crate::txn::TransactionRegistry;
use crate::write;

pub type Params = Map<String, Value>;
pub type Handler = fn(&Services, Params) -> Result<Value, RpcError>;

/// Everything a method needs
pub struct Services {
    pub session: DuckSession,
    pub transactions: TransactionRegistry<DuckTransaction>,
    pub executor: QueryExecutor,
    pub health_table: Option<String>,
    pub metrics: Metrics,
}

impl Services {
    pub fn new(session: DuckSession, config: &Config) -> Result<Self, prometheus::Error> {
        Ok(Self {
            session,
            transactions: TransactionRegistry::new(),
            executor: QueryExecutor::new(&config.execution),
            health_table: config.store.health_table.clone(),
            metrics: Metrics::new()?,
        })
    }

    /// Run `f` inside the named transaction, or on the shared session.
    /// A failure inside a transaction aborts it.
    fn with_store<T>(
        &self,
        tx_id: Option<&str>,
        f: impl FnOnce(&Store<'_>) -> Result<T, RpcError>,
    ) -> Result<T, RpcError> {
        match tx_id {
            Some(id) => self.transactions.get(id)?.run(f),
            None => self.session.run(|store| Ok(f(store)))?,
        }
    }

    /// Like [`Services::with_store`], but outside a transaction the write is
    /// committed or rolled back as a unit
    fn with_write_store<T>(
        &self,
        tx_id: Option<&str>,
        f: impl FnOnce(&Store<'_>) -> Result<T, RpcError>,
    ) -> Result<T, RpcError> {
        match tx_id {
            Some(_) => self.with_store(tx_id, f),
            None => self.session.run_atomic(f),
        }
    }

    /// Roll back transactions idle for longer than `max_idle`
    pub fn expire_idle_transactions(&self, max_idle: Duration) -> usize {
        let expired = self.transactions.expire_idle(Instant::now(), max_idle);
        self.metrics
            .set_open_transactions(self.transactions.open_count());
        expired
    }

    /// Roll back open transactions and close the session
    pub fn close(self) -> Result<(), StoreError> {
        let rolled_back = self.transactions.rollback_all();
        if rolled_back > 0 {
            tracing::warn!(count = rolled_back, "rolled back open transactions at shutdown");
        }
        self.session.close()
    }
}

/// The method table
pub fn table() -> HashMap<&'static str, Handler> {
    let mut methods: HashMap<&'static str, Handler> = HashMap::new();
    methods.insert("ping", ping);
    methods.insert("health_check", health_check);
    methods.insert("begin_transaction", begin_transaction);
    methods.insert("commit_transaction", commit_transaction);
    methods.insert("rollback_transaction", rollback_transaction);
    methods.insert("execute_query", execute_query);
    methods.insert("select_by_id", select_by_id);
    methods.insert("insert_table", insert_table);
    methods.insert("upsert_table", upsert_table);
    methods.insert("update_table", update_table);
    methods
}

fn bind<T: DeserializeOwned>(params: Params) -> Result<T, RpcError> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| RpcError::invalid_params(format!("Invalid params: {e}")))
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TxParams {
    tx_id: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecuteQueryParams {
    sql: String,
    #[serde(default)]
    args: Option<Vec<Value>>,
    #[serde(default)]
    tx_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectByIdParams {
    table_name: String,
    id_column: String,
    id_value: Value,
    #[serde(default)]
    tx_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InsertParams {
    table_name: String,
    data: Map<String, Value>,
    #[serde(default)]
    tx_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UpsertParams {
    table_name: String,
    data: Map<String, Value>,
    key_columns: Vec<String>,
    #[serde(default)]
    tx_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateParams {
    table_name: String,
    set_values: Map<String, Value>,
    where_conditions: Map<String, Value>,
    #[serde(default)]
    tx_id: Option<String>,
}

fn ping(_: &Services, params: Params) -> Result<Value, RpcError> {
    bind::<NoParams>(params)?;
    Ok(json!({"status": "ok", "timestamp": now()}))
}

fn health_check(services: &Services, params: Params) -> Result<Value, RpcError> {
    bind::<NoParams>(params)?;

    match services.session.ping(services.health_table.as_deref()) {
        Ok(()) => {
            let info = services.session.info();
            Ok(json!({
                "status": "healthy",
                "database": info.database,
                "schema": info.schema,
                "timestamp": now(),
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            Ok(json!({"status": "unhealthy", "error": e.to_string(), "timestamp": now()}))
        }
    }
}

fn begin_transaction(services: &Services, params: Params) -> Result<Value, RpcError> {
    bind::<NoParams>(params)?;
    let handle = services
        .transactions
        .begin_with(|| services.session.begin())?;
    Ok(Value::String(handle))
}

fn commit_transaction(services: &Services, params: Params) -> Result<Value, RpcError> {
    let TxParams { tx_id } = bind(params)?;
    services.transactions.commit(&tx_id)?;
    Ok(json!({"status": "committed"}))
}

fn rollback_transaction(services: &Services, params: Params) -> Result<Value, RpcError> {
    let TxParams { tx_id } = bind(params)?;
    services.transactions.rollback(&tx_id)?;
    Ok(json!({"status": "rolled_back"}))
}

/// Positional query arguments as text. Strings bind verbatim, numbers and
/// booleans by their JSON form.
fn query_args(args: Option<Vec<Value>>) -> Result<Vec<String>, RpcError> {
    args.unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, arg)| match arg {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(RpcError::invalid_params(format!(
                "args[{i}] must be a string, number or boolean, got {other}"
            ))),
        })
        .collect()
}

fn execute_query(services: &Services, params: Params) -> Result<Value, RpcError> {
    let p: ExecuteQueryParams = bind(params)?;
    let args = query_args(p.args)?;

    let rows = services.with_store(p.tx_id.as_deref(), |store| {
        services.executor.execute_sql(store, &p.sql, &args)
    })?;
    Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
}

fn select_by_id(services: &Services, params: Params) -> Result<Value, RpcError> {
    let p: SelectByIdParams = bind(params)?;

    let row = services.with_store(p.tx_id.as_deref(), |store| {
        let table = store.table(&p.table_name)?;
        let mut rows = table
            .select()
            .filter(&p.id_column, CompareOp::Eq, scalar_text(&p.id_value))?
            .limit(1)
            .to_rows()?;
        Ok(rows.pop())
    })?;
    Ok(row.map(Value::Object).unwrap_or(Value::Null))
}

fn insert_table(services: &Services, params: Params) -> Result<Value, RpcError> {
    let p: InsertParams = bind(params)?;

    let rows = services.with_write_store(p.tx_id.as_deref(), |store| {
        write::insert(store, &p.table_name, p.data)
    })?;
    Ok(json!({"status": "inserted", "rows": rows}))
}

fn upsert_table(services: &Services, params: Params) -> Result<Value, RpcError> {
    let p: UpsertParams = bind(params)?;

    let outcome = services.with_write_store(p.tx_id.as_deref(), |store| {
        write::upsert(store, &p.table_name, p.data, &p.key_columns)
    })?;
    Ok(json!({"status": "upserted", "rows": outcome.inserted, "skipped": outcome.skipped}))
}

fn update_table(services: &Services, params: Params) -> Result<Value, RpcError> {
    let p: UpdateParams = bind(params)?;

    let rows = services.with_write_store(p.tx_id.as_deref(), |store| {
        write::update(store, &p.table_name, &p.set_values, &p.where_conditions)
    })?;
    Ok(json!({"status": "updated", "rows": rows}))
}
