//! Store contract shared by the RocksDB and in-memory backends.

use std::sync::Arc;

use basis_note::DebtNote;
use basis_keypair::Keypair;

use crate::storage::{
    Column, KeyValueStore, MemoryStore, RocksDbStore, SharedStore, StoreExt, WriteSet,
};
use crate::tracker::TrackerLedger;

fn exercise(store: &dyn KeyValueStore) {
    store.put(Column::Meta, b"a", b"1").unwrap();
    store.put(Column::Notes, b"a", b"2").unwrap();
    assert_eq!(store.get(Column::Meta, b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(store.get(Column::Notes, b"a").unwrap(), Some(b"2".to_vec()));

    let mut batch = WriteSet::new();
    batch.put(Column::Meta, b"c".to_vec(), b"3".to_vec());
    batch.put(Column::Meta, b"b".to_vec(), b"2".to_vec());
    batch.remove(Column::Meta, b"a".to_vec());
    assert_eq!(batch.len(), 3);
    store.write(batch).unwrap();

    let keys: Vec<Vec<u8>> = store
        .scan(Column::Meta)
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);

    store.remove(Column::Notes, b"a").unwrap();
    assert_eq!(store.get(Column::Notes, b"a").unwrap(), None);
}

#[test]
fn memory_store_contract() {
    let store = MemoryStore::new();
    exercise(&store);
    assert_eq!(store.count(Column::Meta), 2);
}

#[test]
fn rocksdb_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksDbStore::open(dir.path()).unwrap();
    exercise(&store);
}

#[test]
fn json_helpers() {
    let store = MemoryStore::new();
    store.put_json(Column::Liabilities, &[1; 32], &500u64).unwrap();
    assert_eq!(
        store.get_json::<u64>(Column::Liabilities, &[1; 32]).unwrap(),
        Some(500)
    );

    store.put(Column::Liabilities, &[2; 32], b"not json").unwrap();
    assert!(store.scan_json::<u64>(Column::Liabilities).is_err());
}

#[test]
fn ledger_reloads_from_rocksdb() {
    let dir = tempfile::tempdir().unwrap();
    let debtor = Keypair::generate();
    let creditor = Keypair::generate().public_key();

    let root = {
        let store: SharedStore = Arc::new(RocksDbStore::open(dir.path()).unwrap());
        let mut ledger = TrackerLedger::open(store).unwrap();
        let note = DebtNote::issue(&debtor, creditor, 250, 1);
        let tracker = Keypair::generate();
        ledger.apply(&note, |_| tracker.sign(&note.message())).unwrap();
        ledger.root()
    };

    let store: SharedStore = Arc::new(RocksDbStore::open(dir.path()).unwrap());
    let ledger = TrackerLedger::open(store).unwrap();
    assert_eq!(ledger.root(), root);
    assert_eq!(ledger.len(), 1);
}
