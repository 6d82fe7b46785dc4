//! RocksDB key-value layer

use crate::errors::{Pc28Result, StorageError};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

/// A single write inside an atomic batch
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

#[derive(Clone)]
pub struct KvStorage {
    db: Arc<DB>,
}

impl KvStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Pc28Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path.as_ref()).map_err(|e| {
            StorageError::DatabaseOpenFailed(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Pc28Result<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()).into())
    }

    /// Apply all ops or none
    pub fn write(&self, ops: Vec<BatchOp>) -> Pc28Result<()> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                BatchOp::Put(key, value) => batch.put(key, value),
                BatchOp::Delete(key) => batch.delete(key),
            }
        }
        self.db
            .write(batch)
            .map_err(|e| StorageError::WriteFailed(e.to_string()).into())
    }

    /// Key/value pairs under `prefix` in key order
    pub fn scan_prefix(&self, prefix: &[u8]) -> Pc28Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut rows = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }

    /// Keys under `prefix` in reverse key order, at most `limit`
    pub fn scan_prefix_rev(&self, prefix: &[u8], limit: usize) -> Pc28Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut upper = prefix.to_vec();
        upper.extend_from_slice(&[0xff; 32]);
        let mut rows = Vec::new();
        for item in self.db.iterator(IteratorMode::From(upper.as_slice(), Direction::Reverse)) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) {
                if key.as_ref() < prefix {
                    break;
                }
                continue;
            }
            rows.push((key.to_vec(), value.to_vec()));
            if rows.len() >= limit {
                break;
            }
        }
        Ok(rows)
    }
}
