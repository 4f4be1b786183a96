//! Insert, upsert and update over the store's table API

use serde_json::{Map, Value};
use sidecar_duck::Store;
use sidecar_ir::{scalar_text, ColumnarBatch};

use crate::error::RpcError;

/// Append a columnar batch. Returns rows written.
pub fn insert(store: &Store<'_>, table: &str, data: Map<String, Value>) -> Result<usize, RpcError> {
    let batch = ColumnarBatch::from_json(data)?;
    Ok(store.table(table)?.insert(&batch)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub skipped: usize,
}

/// Insert each row whose key is not present yet; rows with an existing key
/// are left alone. Keys compare null-safely, so a `null` key matches a
/// stored `NULL`.
pub fn upsert(
    store: &Store<'_>,
    table: &str,
    data: Map<String, Value>,
    key_columns: &[String],
) -> Result<UpsertOutcome, RpcError> {
    if key_columns.is_empty() {
        return Err(RpcError::invalid_params("key_columns must not be empty"));
    }

    let batch = ColumnarBatch::from_json(data)?;
    batch.require_keys(key_columns)?;
    let table = store.table(table)?;

    let mut outcome = UpsertOutcome {
        inserted: 0,
        skipped: 0,
    };
    for index in 0..batch.row_count() {
        let key: Vec<(&str, Option<String>)> = key_columns
            .iter()
            .map(|k| (k.as_str(), batch.value(k, index).and_then(scalar_text)))
            .collect();

        if table.exists_where(&key)? {
            outcome.skipped += 1;
        } else {
            outcome.inserted += table.insert_rows(&batch, [index])?;
        }
    }

    tracing::debug!(
        table = %table.name(),
        inserted = outcome.inserted,
        skipped = outcome.skipped,
        "upsert"
    );
    Ok(outcome)
}

/// Set `set_values` on every row matching all `where_conditions`.
/// Returns rows changed.
pub fn update(
    store: &Store<'_>,
    table: &str,
    set_values: &Map<String, Value>,
    where_conditions: &Map<String, Value>,
) -> Result<usize, RpcError> {
    if set_values.is_empty() {
        return Err(RpcError::invalid_params("set_values must not be empty"));
    }
    if where_conditions.is_empty() {
        return Err(RpcError::invalid_params(
            "where_conditions must not be empty; unconditional updates are not allowed",
        ));
    }

    let set = bind_pairs(set_values);
    let conditions = bind_pairs(where_conditions);
    Ok(store.table(table)?.update_where(&set, &conditions)?)
}

fn bind_pairs(map: &Map<String, Value>) -> Vec<(&str, Option<String>)> {
    map.iter().map(|(k, v)| (k.as_str(), scalar_text(v))).collect()
}
