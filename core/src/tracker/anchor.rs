use anyhow::{Context, Result};
use basis_verifier::{TrackerAnchor, TrackerId};
use log::info;

use crate::storage::{Column, SharedStore, StoreExt};

/// Where ledger digests get published. The settlement layer in production,
/// the local store otherwise.
pub trait AnchorSink: Send + Sync {
    fn publish(&self, anchor: &TrackerAnchor) -> Result<()>;
}

/// Read side of the published anchors. Redemption hosts resolve the anchor
/// here instead of trusting the one a creditor submits.
pub trait AnchorRegistry: Send + Sync {
    /// Most recent anchor published by `tracker_id`
    fn latest(&self, tracker_id: &TrackerId) -> Result<Option<TrackerAnchor>>;
}

/// Records anchors in the store's anchors column.
///
/// Keys are `tracker_id || anchor_time (BE)`, so a scan yields each
/// tracker's anchors oldest first.
pub struct StoreAnchorSink {
    store: SharedStore,
}

fn anchor_key(anchor: &TrackerAnchor) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(&anchor.tracker_id);
    key.extend_from_slice(&anchor.anchor_time.to_be_bytes());
    key
}

impl StoreAnchorSink {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

impl AnchorSink for StoreAnchorSink {
    fn publish(&self, anchor: &TrackerAnchor) -> Result<()> {
        self.store
            .put_json(Column::Anchors, &anchor_key(anchor), anchor)
            .context("failed to record anchor")?;
        info!(
            "Anchor published: digest={} time={}",
            hex::encode(anchor.digest),
            anchor.anchor_time
        );
        Ok(())
    }
}

impl AnchorRegistry for StoreAnchorSink {
    fn latest(&self, tracker_id: &TrackerId) -> Result<Option<TrackerAnchor>> {
        let anchors = self.store.scan_json::<TrackerAnchor>(Column::Anchors)?;
        Ok(anchors
            .into_iter()
            .filter(|(key, _)| key.starts_with(tracker_id))
            .map(|(_, anchor)| anchor)
            .last())
    }
}
