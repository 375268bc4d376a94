use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{Result, anyhow};

use crate::storage::{Column, KeyValueStore, WriteOp, WriteSet};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-process store for tests and dev runs. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Column, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a column
    pub fn count(&self, column: Column) -> usize {
        self.tables
            .read()
            .map(|t| t.get(&column).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let tables = self.tables.read().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(tables.get(&column).and_then(|t| t.get(key)).cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| anyhow!("memory store poisoned"))?;
        tables
            .entry(column)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&self, column: Column, key: &[u8]) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| anyhow!("memory store poisoned"))?;
        if let Some(table) = tables.get_mut(&column) {
            table.remove(key);
        }
        Ok(())
    }

    fn scan(&self, column: Column) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let tables = self.tables.read().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(tables
            .get(&column)
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn write(&self, batch: WriteSet) -> Result<()> {
        // Single write lock for the whole set
        let mut tables = self.tables.write().map_err(|_| anyhow!("memory store poisoned"))?;
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { column, key, value } => {
                    tables.entry(column).or_default().insert(key, value);
                }
                WriteOp::Remove { column, key } => {
                    if let Some(table) = tables.get_mut(&column) {
                        table.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }
}
