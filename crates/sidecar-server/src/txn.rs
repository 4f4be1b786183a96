//! Transaction registry
//!
//! Maps opaque `tx_<n>` handles to open transactions. The map lock is only
//! held to insert, look up or remove an entry; store work happens on the
//! transaction itself after the lock is released.
//!
//! Every open transaction pins its own store connection. Handles a client
//! abandons are reclaimed by [`TransactionRegistry::expire_idle`], which the
//! server runs periodically; anything left is rolled back at shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sidecar_duck::{DuckTransaction, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxError {
    #[error("Transaction not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the registry needs from an open transaction
pub trait TransactionContext: Send + Sync {
    fn commit(&self) -> Result<(), StoreError>;
    fn rollback(&self) -> Result<(), StoreError>;
}

impl TransactionContext for DuckTransaction {
    fn commit(&self) -> Result<(), StoreError> {
        DuckTransaction::commit(self)
    }

    fn rollback(&self) -> Result<(), StoreError> {
        DuckTransaction::rollback(self)
    }
}

struct Entry<T> {
    tx: Arc<T>,
    last_used: Instant,
}

pub struct TransactionRegistry<T> {
    open: Mutex<HashMap<String, Entry<T>>>,
    next_id: AtomicU64,
}

impl<T: TransactionContext> TransactionRegistry<T> {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a transaction with `start` and register it under a fresh handle
    pub fn begin_with<E>(&self, start: impl FnOnce() -> Result<T, E>) -> Result<String, E> {
        let tx = start()?;
        let handle = format!("tx_{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.open.lock().insert(
            handle.clone(),
            Entry {
                tx: Arc::new(tx),
                last_used: Instant::now(),
            },
        );
        tracing::info!(tx_id = %handle, "transaction started");
        Ok(handle)
    }

    /// Look up an open transaction and mark it as used
    pub fn get(&self, handle: &str) -> Result<Arc<T>, TxError> {
        let mut open = self.open.lock();
        let entry = open
            .get_mut(handle)
            .ok_or_else(|| TxError::NotFound(handle.to_string()))?;
        entry.last_used = Instant::now();
        Ok(Arc::clone(&entry.tx))
    }

    pub fn commit(&self, handle: &str) -> Result<(), TxError> {
        let tx = self.take(handle)?;
        tx.commit()?;
        tracing::info!(tx_id = %handle, "transaction committed");
        Ok(())
    }

    pub fn rollback(&self, handle: &str) -> Result<(), TxError> {
        let tx = self.take(handle)?;
        tx.rollback()?;
        tracing::info!(tx_id = %handle, "transaction rolled back");
        Ok(())
    }

    /// Roll back everything still open. Returns how many were rolled back.
    pub fn rollback_all(&self) -> usize {
        let open: Vec<(String, Arc<T>)> = self
            .open
            .lock()
            .drain()
            .map(|(handle, entry)| (handle, entry.tx))
            .collect();
        let count = open.len();
        for (handle, tx) in open {
            if let Err(e) = tx.rollback() {
                tracing::warn!(tx_id = %handle, error = %e, "rollback at shutdown failed");
            }
        }
        count
    }

    /// Roll back transactions unused for longer than `max_idle` as of `now`.
    /// Returns how many were expired.
    pub fn expire_idle(&self, now: Instant, max_idle: Duration) -> usize {
        let expired: Vec<(String, Arc<T>)> = {
            let mut open = self.open.lock();
            let stale: Vec<String> = open
                .iter()
                .filter(|(_, entry)| now.saturating_duration_since(entry.last_used) > max_idle)
                .map(|(handle, _)| handle.clone())
                .collect();
            stale
                .into_iter()
                .filter_map(|handle| open.remove(&handle).map(|entry| (handle, entry.tx)))
                .collect()
        };

        for (handle, tx) in &expired {
            match tx.rollback() {
                Ok(()) => tracing::warn!(tx_id = %handle, "idle transaction rolled back"),
                Err(e) => tracing::warn!(tx_id = %handle, error = %e, "idle rollback failed"),
            }
        }
        expired.len()
    }

    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }

    /// Remove a handle so it can only be finished once
    fn take(&self, handle: &str) -> Result<Arc<T>, TxError> {
        self.open
            .lock()
            .remove(handle)
            .map(|entry| entry.tx)
            .ok_or_else(|| TxError::NotFound(handle.to_string()))
    }
}

impl<T: TransactionContext> Default for TransactionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
