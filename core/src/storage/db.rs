use anyhow::{Context, Result};
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;

use crate::storage::{Column, KeyValueStore, WriteOp, WriteSet};

/// A thread-safe wrapper around RocksDB.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
}

impl RocksDbStore {
    /// Opens the database at the specified path, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = Column::ALL
            .iter()
            .map(|c| ColumnFamilyDescriptor::new(c.name(), Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, families)
            .map_err(|e| anyhow::anyhow!("Failed to open RocksDB: {}", e))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, column: Column) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(column.name())
            .with_context(|| format!("{} CF missing", column.name()))
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(column)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf(column)?;
        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    fn remove(&self, column: Column, key: &[u8]) -> Result<()> {
        let cf = self.cf(column)?;
        self.db.delete_cf(cf, key)?;
        Ok(())
    }

    fn scan(&self, column: Column) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf(column)?;

        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    /// Atomically apply a batch of operations
    fn write(&self, batch: WriteSet) -> Result<()> {
        let mut wb = WriteBatch::default();

        for op in batch.into_ops() {
            match op {
                WriteOp::Put { column, key, value } => {
                    wb.put_cf(self.cf(column)?, key, value);
                }
                WriteOp::Remove { column, key } => {
                    wb.delete_cf(self.cf(column)?, key);
                }
            }
        }

        self.db.write(wb)?;
        Ok(())
    }
}
