//! Tracker persistence
//!
//! Everything the tracker keeps on disk goes through [`KeyValueStore`], so the
//! ledger and reconciler run unchanged against RocksDB or the in-memory store
//! used by tests.

pub mod db;
pub mod memory;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use db::RocksDbStore;
pub use memory::MemoryStore;

/// Logical key spaces, one RocksDB column family each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    /// pair_key -> 16-byte DebtEntry
    Ledger,
    /// pair_key -> latest debtor + tracker signed note
    Authorizations,
    /// on-chain note record id -> NoteRecord
    Notes,
    /// reserve id -> ReserveRecord
    Reserves,
    /// reserve id -> outstanding liability
    Liabilities,
    /// spent note record id -> ArchivedNote
    Archive,
    /// anchor time -> TrackerAnchor
    Anchors,
    /// watermark and other singletons
    Meta,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::Ledger,
        Column::Authorizations,
        Column::Notes,
        Column::Reserves,
        Column::Liabilities,
        Column::Archive,
        Column::Anchors,
        Column::Meta,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::Ledger => "ledger",
            Column::Authorizations => "authorizations",
            Column::Notes => "notes",
            Column::Reserves => "reserves",
            Column::Liabilities => "liabilities",
            Column::Archive => "archive",
            Column::Anchors => "anchors",
            Column::Meta => "meta",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        column: Column,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Remove {
        column: Column,
        key: Vec<u8>,
    },
}

/// Set of writes applied all-or-nothing
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    ops: Vec<WriteOp>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: Column, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Put {
            column,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn put_json<T: Serialize>(
        &mut self,
        column: Column,
        key: impl Into<Vec<u8>>,
        value: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value).context("failed to encode value")?;
        self.put(column, key, bytes);
        Ok(())
    }

    pub fn remove(&mut self, column: Column, key: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Remove {
            column,
            key: key.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// decoupling tracker logic from the db
pub trait KeyValueStore: Send + Sync {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<()>;

    fn remove(&self, column: Column, key: &[u8]) -> Result<()>;

    /// All entries of a column in key order
    fn scan(&self, column: Column) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply every op or none
    fn write(&self, batch: WriteSet) -> Result<()>;
}

pub type SharedStore = Arc<dyn KeyValueStore>;

/// JSON helpers over any store
pub trait StoreExt {
    fn get_json<T: DeserializeOwned>(&self, column: Column, key: &[u8]) -> Result<Option<T>>;

    fn put_json<T: Serialize>(&self, column: Column, key: &[u8], value: &T) -> Result<()>;

    fn scan_json<T: DeserializeOwned>(&self, column: Column) -> Result<Vec<(Vec<u8>, T)>>;
}

impl<S: KeyValueStore + ?Sized> StoreExt for S {
    fn get_json<T: DeserializeOwned>(&self, column: Column, key: &[u8]) -> Result<Option<T>> {
        match self.get(column, key)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .with_context(|| format!("corrupt value in {} column", column.name()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, column: Column, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).context("failed to encode value")?;
        self.put(column, key, &bytes)
    }

    fn scan_json<T: DeserializeOwned>(&self, column: Column) -> Result<Vec<(Vec<u8>, T)>> {
        self.scan(column)?
            .into_iter()
            .map(|(k, v)| {
                let value = serde_json::from_slice(&v)
                    .with_context(|| format!("corrupt value in {} column", column.name()))?;
                Ok((k, value))
            })
            .collect()
    }
}
