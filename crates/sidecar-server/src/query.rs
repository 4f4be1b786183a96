//! Query execution against the store using the sidecar IR

use std::cmp::Ordering as CmpOrdering;

use sidecar_duck::{Store, StoreError};
use sidecar_ir::{vector_from_json, Ordering, QueryRequest, Row, VectorOrdering};
use sidecar_registry::FunctionRegistry;

use crate::config::ExecutionConfig;
use crate::error::RpcError;

/// Translates query text and drives the store's table API
pub struct QueryExecutor {
    functions: FunctionRegistry,
    native_vector_ordering: bool,
    max_vector_candidates: u64,
}

impl QueryExecutor {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            functions: FunctionRegistry::new(),
            native_vector_ordering: config.native_vector_ordering,
            max_vector_candidates: config.max_vector_candidates,
        }
    }

    /// Translate `sql` with positional `args` and run it
    pub fn execute_sql(
        &self,
        store: &Store<'_>,
        sql: &str,
        args: &[String],
    ) -> Result<Vec<Row>, RpcError> {
        let request = sidecar_ast::translate(sql, args, &self.functions)?;
        tracing::debug!(
            table = %request.table,
            fingerprint = %request.fingerprint(),
            "query translated"
        );
        Ok(self.execute(store, &request)?)
    }

    pub fn execute(&self, store: &Store<'_>, request: &QueryRequest) -> Result<Vec<Row>, StoreError> {
        match request.vector_ordering() {
            Some(vector) if !self.native_vector_ordering || vector.native_function.is_none() => {
                self.execute_ranked(store, request, vector)
            }
            _ => execute_pushdown(store, request),
        }
    }

    /// Fetch a capped candidate set and rank it by distance in process
    fn execute_ranked(
        &self,
        store: &Store<'_>,
        request: &QueryRequest,
        vector: &VectorOrdering,
    ) -> Result<Vec<Row>, StoreError> {
        let table = store.table(&request.table)?;
        let vector_column = table.column(&vector.column)?.name.clone();

        let mut select = table.select();
        let mut strip_vector = false;
        if let Some(columns) = &request.columns {
            let mut columns = columns.clone();
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(&vector_column)) {
                columns.push(vector_column.clone());
                strip_vector = true;
            }
            select = select.columns(&columns)?;
        }
        for predicate in &request.predicates {
            select = select.filter(&predicate.column, predicate.op, Some(predicate.value.clone()))?;
        }

        let cap = self.max_vector_candidates;
        let mut rows = select.limit(cap.saturating_add(1)).to_rows()?;
        if rows.len() as u64 > cap {
            tracing::warn!(
                table = %table.name(),
                cap,
                "vector candidates truncated; nearest-neighbour result is approximate"
            );
            rows.truncate(cap as usize);
        }

        let mut ranked = rerank_by_distance(rows, &vector_column, vector, request.limit);
        if strip_vector {
            for row in &mut ranked {
                row.shift_remove(&vector_column);
            }
        }
        Ok(ranked)
    }
}

/// Everything handled by the store: filters, ordering (column or native
/// distance) and limit
fn execute_pushdown(store: &Store<'_>, request: &QueryRequest) -> Result<Vec<Row>, StoreError> {
    let table = store.table(&request.table)?;
    let mut select = table.select();

    if let Some(columns) = &request.columns {
        select = select.columns(columns)?;
    }
    for predicate in &request.predicates {
        select = select.filter(&predicate.column, predicate.op, Some(predicate.value.clone()))?;
    }
    match &request.ordering {
        Some(Ordering::Column { column, direction }) => {
            select = select.order_by(column, *direction)?;
        }
        Some(Ordering::Vector(vector)) => {
            if let Some(function) = &vector.native_function {
                select = select.order_by_distance(function, &vector.column, &vector.vector)?;
            }
        }
        None => {}
    }
    if let Some(limit) = request.limit {
        select = select.limit(limit);
    }

    select.to_rows()
}

/// Stable nearest-first sort by distance between `column` and the query
/// vector, then truncate to `limit`.
///
/// Rows whose vector is missing, non-numeric, of the wrong dimension or of
/// zero length rank after every comparable row, in their input order.
pub fn rerank_by_distance(
    rows: Vec<Row>,
    column: &str,
    ordering: &VectorOrdering,
    limit: Option<u64>,
) -> Vec<Row> {
    let mut scored: Vec<(Option<f64>, Row)> = rows
        .into_iter()
        .map(|row| {
            let distance = row
                .get(column)
                .and_then(vector_from_json)
                .and_then(|v| ordering.metric.distance(&v, &ordering.vector));
            (distance, row)
        })
        .collect();

    scored.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(b),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    });

    let limit = limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
    scored.into_iter().take(limit).map(|(_, row)| row).collect()
}
