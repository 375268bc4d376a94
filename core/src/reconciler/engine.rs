use std::sync::Arc;

use anyhow::Context;
use arc_swap::ArcSwap;
use basis_verifier::ReserveId;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::index::IndexSnapshot;
use super::records::{
    ArchivedNote, Classified, NoteRecord, RecordFilter, ReserveRecord, classify, decode_id,
};
use super::source::ChainSource;
use crate::storage::{Column, SharedStore, StoreExt, WriteSet};

const WATERMARK_KEY: &[u8] = b"watermark";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("block {got} out of order, expected {expected}")]
    OutOfOrder { expected: u64, got: u64 },

    /// Transient. The same height is retried on the next cycle.
    #[error("failed to fetch block {height}: {reason:#}")]
    Fetch { height: u64, reason: anyhow::Error },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub height: u64,
    pub spent_notes: usize,
    pub spent_reserves: usize,
    pub new_notes: usize,
    pub new_reserves: usize,
    pub skipped: usize,
    pub liabilities_changed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Height at or below the watermark
    AlreadyProcessed,
    Applied(BlockSummary),
}

/// Single writer that folds settled blocks into the tracker's indices.
pub struct Reconciler<C> {
    store: SharedStore,
    source: C,
    filter: RecordFilter,
    start_height: u64,
    index: IndexSnapshot,
    published: Arc<ArcSwap<IndexSnapshot>>,
}

fn key32(column: Column, key: &[u8]) -> anyhow::Result<[u8; 32]> {
    key.try_into()
        .with_context(|| format!("bad key length {} in {} column", key.len(), column.name()))
}

impl<C: ChainSource> Reconciler<C> {
    /// Rebuild the index from the store and resume after its watermark.
    pub fn open(
        store: SharedStore,
        source: C,
        filter: RecordFilter,
        start_height: u64,
    ) -> anyhow::Result<Self> {
        let mut index = IndexSnapshot {
            height: store.get_json::<u64>(Column::Meta, WATERMARK_KEY)?,
            ..Default::default()
        };

        for (key, record) in store.scan_json::<ReserveRecord>(Column::Reserves)? {
            index.reserves.insert(key32(Column::Reserves, &key)?, record);
        }
        for (key, note) in store.scan_json::<NoteRecord>(Column::Notes)? {
            index.notes.insert(key32(Column::Notes, &key)?, note);
        }
        for (key, value) in store.scan_json::<u64>(Column::Liabilities)? {
            index
                .liabilities
                .insert(key32(Column::Liabilities, &key)?, value);
        }

        info!(
            "Reconciler opened: watermark={:?} reserves={} notes={}",
            index.height,
            index.reserves.len(),
            index.notes.len()
        );

        Ok(Self {
            store,
            source,
            filter,
            start_height,
            published: Arc::new(ArcSwap::from_pointee(index.clone())),
            index,
        })
    }

    pub fn watermark(&self) -> Option<u64> {
        self.index.height
    }

    pub fn next_height(&self) -> u64 {
        self.index
            .height
            .map(|h| h + 1)
            .unwrap_or(self.start_height)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.published.load_full()
    }

    /// Handle for readers on other tasks
    pub fn snapshot_handle(&self) -> Arc<ArcSwap<IndexSnapshot>> {
        Arc::clone(&self.published)
    }

    pub async fn process_settled_block(
        &mut self,
        height: u64,
    ) -> Result<BlockOutcome, ReconcileError> {
        if self.index.height.is_some_and(|done| height <= done) {
            debug!("Block {} already processed", height);
            return Ok(BlockOutcome::AlreadyProcessed);
        }

        let expected = self.next_height();
        if height != expected {
            return Err(ReconcileError::OutOfOrder {
                expected,
                got: height,
            });
        }

        let block = self
            .source
            .fetch_block(height)
            .await
            .map_err(|reason| ReconcileError::Fetch { height, reason })?;

        let mut next = self.index.clone();
        let mut batch = WriteSet::new();
        let mut summary = BlockSummary {
            height,
            ..Default::default()
        };

        for spent in &block.spent {
            let Ok(record_id) = decode_id("spent id", spent) else {
                warn!("Block {}: skipping malformed spent id {}", height, spent);
                summary.skipped += 1;
                continue;
            };

            if let Some(note) = next.notes.remove(&record_id) {
                batch.remove(Column::Notes, record_id.to_vec());
                batch.put_json(
                    Column::Archive,
                    record_id.to_vec(),
                    &ArchivedNote {
                        note,
                        spent_height: height,
                    },
                )?;
                summary.spent_notes += 1;
            } else if let Some(reserve_id) = next.reserve_by_record(&record_id) {
                next.reserves.remove(&reserve_id);
                batch.remove(Column::Reserves, reserve_id.to_vec());
                summary.spent_reserves += 1;
            }
        }

        for record in &block.created {
            match classify(record, &self.filter, height) {
                Ok(Some(Classified::Reserve(reserve))) => {
                    let id: ReserveId = reserve.state.reserve_id;
                    batch.put_json(Column::Reserves, id.to_vec(), &reserve)?;
                    next.reserves.insert(id, reserve);
                    summary.new_reserves += 1;
                }
                Ok(Some(Classified::Note(note))) => {
                    batch.put_json(Column::Notes, note.record_id.to_vec(), &note)?;
                    next.notes.insert(note.record_id, note);
                    summary.new_notes += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Block {}: skipping record {}: {}", height, record.id, e);
                    summary.skipped += 1;
                }
            }
        }

        let changes = next.recompute_liabilities();
        summary.liabilities_changed = changes.len();
        for (reserve_id, value) in changes {
            match value {
                Some(v) => batch.put_json(Column::Liabilities, reserve_id.to_vec(), &v)?,
                None => batch.remove(Column::Liabilities, reserve_id.to_vec()),
            }
        }

        next.height = Some(height);
        batch.put_json(Column::Meta, WATERMARK_KEY, &height)?;
        self.store
            .write(batch)
            .with_context(|| format!("failed to persist block {height}"))?;

        self.published.store(Arc::new(next.clone()));
        self.index = next;

        info!(
            "Block {} reconciled: +{} notes, -{} notes, +{} reserves, -{} reserves, {} skipped",
            height,
            summary.new_notes,
            summary.spent_notes,
            summary.new_reserves,
            summary.spent_reserves,
            summary.skipped
        );
        Ok(BlockOutcome::Applied(summary))
    }

    /// Recompute and persist liabilities outside block processing.
    ///
    /// Returns the number of reserves whose liability changed.
    pub fn recompute_liabilities(&mut self) -> Result<usize, ReconcileError> {
        let mut next = self.index.clone();
        let changes = next.recompute_liabilities();
        if changes.is_empty() {
            return Ok(0);
        }

        let mut batch = WriteSet::new();
        for (reserve_id, value) in &changes {
            match value {
                Some(v) => batch.put_json(Column::Liabilities, reserve_id.to_vec(), v)?,
                None => batch.remove(Column::Liabilities, reserve_id.to_vec()),
            }
        }
        self.store.write(batch)?;

        self.published.store(Arc::new(next.clone()));
        self.index = next;
        Ok(changes.len())
    }

    /// Process every available block up to the tip, at most `max_blocks`.
    ///
    /// Returns how many blocks were applied. Stops at the first failure with
    /// the watermark left at the last good height.
    pub async fn sync(&mut self, max_blocks: u64) -> Result<u64, ReconcileError> {
        let from = self.next_height();
        let tip = self
            .source
            .tip_height()
            .await
            .map_err(|reason| ReconcileError::Fetch {
                height: from,
                reason,
            })?;

        let Some(tip) = tip else {
            return Ok(0);
        };
        if tip < from {
            return Ok(0);
        }

        let to = tip.min(from.saturating_add(max_blocks.max(1) - 1));
        let mut applied = 0;
        for height in from..=to {
            if let BlockOutcome::Applied(_) = self.process_settled_block(height).await? {
                applied += 1;
            }
        }
        Ok(applied)
    }
}
