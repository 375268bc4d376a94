//! Settled blocks through the reconciler into the persisted index.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use basis_keypair::Keypair;
use basis_pubkey::PublicKey;

use crate::reconciler::records::HISTORY_ENTRY_LEN;
use crate::reconciler::{
    BlockOutcome, ChainRecord, ChainSource, HistoryEntry, ReconcileError, Reconciler,
    ReconcilerService, RecordFilter, ServiceConfig, SettledBlock, TokenAmount,
};
use crate::storage::{Column, KeyValueStore, MemoryStore, SharedStore};

const SCRIPT: [u8; 32] = [0xaa; 32];
const TOKEN: [u8; 32] = [0xbb; 32];

fn filter() -> RecordFilter {
    RecordFilter {
        reserve_script_hash: SCRIPT,
        note_token_id: TOKEN,
    }
}

/// In-memory settlement layer with switchable fetch failures.
#[derive(Clone, Default)]
struct MemorySource {
    blocks: Arc<Mutex<BTreeMap<u64, SettledBlock>>>,
    failing: Arc<Mutex<HashSet<u64>>>,
}

impl MemorySource {
    fn push(&self, block: SettledBlock) {
        self.blocks.lock().unwrap().insert(block.height, block);
    }

    fn fail(&self, height: u64, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(height);
        } else {
            set.remove(&height);
        }
    }
}

impl ChainSource for MemorySource {
    async fn tip_height(&self) -> Result<Option<u64>> {
        Ok(self.blocks.lock().unwrap().keys().next_back().copied())
    }

    async fn fetch_block(&self, height: u64) -> Result<SettledBlock> {
        if self.failing.lock().unwrap().contains(&height) {
            return Err(anyhow!("node unavailable"));
        }
        self.blocks
            .lock()
            .unwrap()
            .get(&height)
            .cloned()
            .ok_or_else(|| anyhow!("block {height} not settled"))
    }
}

fn reserve_record(id: u8, reserve: u8, owner: &PublicKey, value: u64) -> ChainRecord {
    ChainRecord {
        id: hex::encode([id; 32]),
        value,
        script_hash: hex::encode(SCRIPT),
        tokens: vec![TokenAmount {
            id: hex::encode([reserve; 32]),
            amount: 1,
        }],
        registers: vec![
            owner.to_hex(),
            hex::encode(basis_authmap::empty_root(basis_authmap::DEPTH)),
            hex::encode([9u8; 32]),
        ],
    }
}

fn note_record(id: u8, holder: &Keypair, value: u64, reserves: &[u8]) -> ChainRecord {
    let history: Vec<u8> = reserves
        .iter()
        .flat_map(|r| {
            HistoryEntry {
                reserve_id: [*r; 32],
                amount: value,
                signature: holder.sign(b"payment"),
            }
            .to_bytes()
        })
        .collect();
    assert_eq!(history.len(), reserves.len() * HISTORY_ENTRY_LEN);

    ChainRecord {
        id: hex::encode([id; 32]),
        value: 0,
        script_hash: hex::encode([0xcc; 32]),
        tokens: vec![TokenAmount {
            id: hex::encode(TOKEN),
            amount: value,
        }],
        registers: vec![holder.public_key().to_hex(), hex::encode(history)],
    }
}

fn block(height: u64, spent: &[u8], created: Vec<ChainRecord>) -> SettledBlock {
    SettledBlock {
        height,
        timestamp: height * 1_000,
        spent: spent.iter().map(|id| hex::encode([*id; 32])).collect(),
        created,
    }
}

/// Reserve 1 backs two notes, then one note is spent.
fn seed(source: &MemorySource) -> Keypair {
    let owner = Keypair::generate().public_key();
    let holder = Keypair::generate();
    source.push(block(1, &[], vec![reserve_record(100, 1, &owner, 1_000)]));
    source.push(block(
        2,
        &[],
        vec![
            note_record(10, &holder, 300, &[1]),
            note_record(11, &holder, 200, &[1]),
        ],
    ));
    source.push(block(3, &[10], vec![]));
    holder
}

fn open(store: &SharedStore, source: &MemorySource) -> Reconciler<MemorySource> {
    Reconciler::open(store.clone(), source.clone(), filter(), 1).unwrap()
}

#[tokio::test]
async fn blocks_build_reserves_notes_and_liabilities() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let source = MemorySource::default();
    let holder = seed(&source);
    let mut reconciler = open(&store, &source);

    assert_eq!(reconciler.sync(10).await.unwrap(), 3);
    assert_eq!(reconciler.watermark(), Some(3));

    let snapshot = reconciler.snapshot();
    assert_eq!(snapshot.reserves.len(), 1);
    assert_eq!(snapshot.notes.len(), 1);
    assert_eq!(snapshot.liabilities[&[1; 32]], 200);
    assert_eq!(snapshot.notes_by_holder(&holder.public_key()).len(), 1);

    let report = snapshot.solvency_report();
    assert_eq!(report.total_balance, 1_000);
    assert_eq!(report.total_liabilities, 200);
    assert_eq!(report.insolvent, 0);

    // spent note archived
    assert!(store.get(Column::Archive, &[10; 32]).unwrap().is_some());
    assert!(store.get(Column::Notes, &[10; 32]).unwrap().is_none());
}

#[tokio::test]
async fn reprocessing_a_height_is_a_no_op() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let source = MemorySource::default();
    seed(&source);
    let mut reconciler = open(&store, &source);

    for h in 1..=2 {
        assert!(matches!(
            reconciler.process_settled_block(h).await.unwrap(),
            BlockOutcome::Applied(_)
        ));
    }
    let once = reconciler.snapshot();

    assert_eq!(
        reconciler.process_settled_block(2).await.unwrap(),
        BlockOutcome::AlreadyProcessed
    );
    assert_eq!(reconciler.snapshot(), once);
    assert_eq!(once.liabilities[&[1; 32]], 500);
}

#[tokio::test]
async fn heights_apply_in_order() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let source = MemorySource::default();
    seed(&source);
    let mut reconciler = open(&store, &source);

    assert!(matches!(
        reconciler.process_settled_block(2).await,
        Err(ReconcileError::OutOfOrder {
            expected: 1,
            got: 2
        })
    ));
    assert_eq!(reconciler.watermark(), None);
}

#[tokio::test]
async fn failed_fetch_keeps_watermark_and_retries() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let source = MemorySource::default();
    seed(&source);
    source.fail(2, true);
    let mut reconciler = open(&store, &source);

    assert!(matches!(
        reconciler.sync(10).await,
        Err(ReconcileError::Fetch { height: 2, .. })
    ));
    assert_eq!(reconciler.watermark(), Some(1));
    assert!(reconciler.snapshot().notes.is_empty());

    source.fail(2, false);
    assert_eq!(reconciler.sync(10).await.unwrap(), 2);
    assert_eq!(reconciler.watermark(), Some(3));
}

#[tokio::test]
async fn malformed_records_are_skipped() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let source = MemorySource::default();
    let owner = Keypair::generate().public_key();

    let mut broken = reserve_record(101, 2, &owner, 500);
    broken.registers.truncate(1);
    source.push(SettledBlock {
        height: 1,
        timestamp: 1,
        spent: vec!["zz".into()],
        created: vec![broken, reserve_record(100, 1, &owner, 1_000)],
    });

    let mut reconciler = open(&store, &source);
    match reconciler.process_settled_block(1).await.unwrap() {
        BlockOutcome::Applied(summary) => {
            assert_eq!(summary.new_reserves, 1);
            assert_eq!(summary.skipped, 2);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn index_survives_reopen() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let source = MemorySource::default();
    seed(&source);

    let mut reconciler = open(&store, &source);
    reconciler.sync(2).await.unwrap();
    let before = reconciler.snapshot();
    drop(reconciler);

    let mut reopened = open(&store, &source);
    assert_eq!(reopened.snapshot(), before);
    assert_eq!(reopened.next_height(), 3);
    assert_eq!(reopened.recompute_liabilities().unwrap(), 0);

    assert_eq!(reopened.sync(10).await.unwrap(), 1);
    assert_eq!(reopened.snapshot().liabilities[&[1; 32]], 200);
}

#[tokio::test]
async fn reserve_respent_in_same_block_keeps_liabilities() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let source = MemorySource::default();
    let holder = seed(&source);
    let owner = Keypair::generate().public_key();
    // reserve record 100 replaced by 101 after a top-up
    source.push(block(4, &[100], vec![reserve_record(101, 1, &owner, 2_000)]));
    source.push(block(5, &[11], vec![note_record(12, &holder, 50, &[1])]));

    let mut reconciler = open(&store, &source);
    reconciler.sync(10).await.unwrap();

    let snapshot = reconciler.snapshot();
    assert_eq!(snapshot.reserves[&[1; 32]].record_id, [101; 32]);
    assert_eq!(snapshot.reserves[&[1; 32]].state.balance, 2_000);
    assert_eq!(snapshot.liabilities[&[1; 32]], 50);
}

#[tokio::test]
async fn service_syncs_and_serves_snapshots() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let source = MemorySource::default();
    seed(&source);

    let service = ReconcilerService::start(
        open(&store, &source),
        ServiceConfig {
            poll_interval: Duration::from_secs(3_600),
            max_blocks_per_sync: 10,
        },
    );

    service.sync_now().await.unwrap();
    let snapshot = service.snapshot().await.unwrap();
    assert_eq!(snapshot.height, Some(3));
    assert_eq!(service.current(), snapshot);

    service.shutdown().await.unwrap();
}
