//! Thin adapter over the embedded database.
//!
//! The node treats storage as a transactional ordered map of bytes to
//! bytes. One named tree carries the entire chain keyspace: raw block
//! hashes map to block records, `"lh"` holds the tip hash, and the
//! `"utxo-"` prefix region holds the derived UTXO index.

use crate::error::{BlockchainError, Result};
use log::warn;
use sled::transaction::{ConflictableTransactionResult, TransactionError, TransactionalTree};
use sled::{Batch, Db, IVec, Tree};
use std::path::Path;

const CHAIN_TREE: &str = "chain";

#[derive(Clone)]
pub struct KvStore {
    db: Db,
    tree: Tree,
}

impl KvStore {
    /// Open the database at `path`. A first failure (typically a stale
    /// lock left by an unclean shutdown) is retried once with a fresh
    /// reopen; a second failure surfaces as `DbLocked`.
    pub fn open(path: &Path) -> Result<KvStore> {
        let db = match sled::open(path) {
            Ok(db) => db,
            Err(first_err) => {
                warn!("database open failed ({first_err}), retrying once");
                sled::Config::new()
                    .path(path)
                    .open()
                    .map_err(|e| BlockchainError::DbLocked(format!("{path:?}: {e}")))?
            }
        };
        let tree = db
            .open_tree(CHAIN_TREE)
            .map_err(|e| BlockchainError::Database(format!("cannot open chain tree: {e}")))?;
        Ok(KvStore { db, tree })
    }

    /// Whether a database has been created at `path`
    pub fn exists(path: &Path) -> bool {
        path.join("db").exists()
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<IVec>> {
        Ok(self.tree.get(key)?)
    }

    pub fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.tree.insert(key, value)?;
        Ok(())
    }

    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.tree.remove(key)?;
        Ok(())
    }

    /// Ordered iteration over every key starting with `prefix`
    pub fn scan_prefix(&self, prefix: &[u8]) -> impl Iterator<Item = Result<(IVec, IVec)>> {
        self.tree
            .scan_prefix(prefix)
            .map(|item| item.map_err(BlockchainError::from))
    }

    pub fn apply_batch(&self, batch: Batch) -> Result<()> {
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    /// Run a read-write transaction. All writes made through the
    /// transactional tree commit atomically or not at all.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: Fn(&TransactionalTree) -> ConflictableTransactionResult<T, sled::Error>,
    {
        self.tree
            .transaction(f)
            .map_err(|e: TransactionError<sled::Error>| match e {
                TransactionError::Abort(inner) => {
                    BlockchainError::Database(format!("transaction aborted: {inner}"))
                }
                TransactionError::Storage(inner) => {
                    BlockchainError::Database(format!("transaction failed: {inner}"))
                }
            })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
