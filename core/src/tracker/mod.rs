//! Tracker Service
//!
//! Receives debtor-signed notes, keeps the authenticated ledger, counter-signs
//! accepted updates and periodically anchors the ledger digest.
//!
//! ```text
//!   debtor ── DebtNote ──▶ accept_note ──▶ TrackerLedger (working tree)
//!                              │                   │
//!                              ▼                   │ publish_anchor(now)
//!                        tracker signature         ▼
//!                                           anchored snapshot ──▶ AnchorSink
//!                                                  │
//!   creditor ◀── Attestation ◀── attest ◀──────────┘
//! ```
//!
//! Attestations are always proven against the last *anchored* snapshot, since
//! that is the only digest a verifier will accept.

pub mod anchor;
pub mod ledger;

pub use anchor::{AnchorRegistry, AnchorSink, StoreAnchorSink};
pub use ledger::{SignedDebt, TrackerLedger};

use std::sync::Arc;

use basis_authmap::{MapProof, SparseMerkleTree};
use basis_keypair::Keypair;
use basis_note::{DebtEntry, DebtNote, authorization_message};
use basis_pubkey::{PairKey, PublicKey};
use basis_signature::Signature;
use basis_verifier::{DebtUpdate, RejectReason, TrackerAnchor, TrackerId};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("note rejected: {0}")]
    Rejected(#[from] RejectReason),

    #[error("no anchor has been published yet")]
    NotAnchored,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// What the creditor needs to redeem: the anchored entry, its proof and the
/// tracker's signature over the authorization message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub debtor: PublicKey,
    pub creditor: PublicKey,
    pub entry: DebtEntry,
    pub proof: MapProof,
    pub tracker_signature: Signature,
    pub anchor: TrackerAnchor,
}

/// Counter-signature returned for an accepted note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub update: DebtUpdate,
    pub tracker_signature: Signature,
}

struct AnchoredSnapshot {
    anchor: TrackerAnchor,
    tree: Arc<SparseMerkleTree>,
}

pub struct Tracker {
    keypair: Keypair,
    tracker_id: TrackerId,
    ledger: TrackerLedger,
    anchored: Option<AnchoredSnapshot>,
    sink: Arc<dyn AnchorSink>,
}

impl Tracker {
    pub fn new(
        keypair: Keypair,
        tracker_id: TrackerId,
        ledger: TrackerLedger,
        sink: Arc<dyn AnchorSink>,
    ) -> Self {
        info!(
            "Tracker {} ready, key={}",
            hex::encode(tracker_id),
            keypair.public_key()
        );
        Self {
            keypair,
            tracker_id,
            ledger,
            anchored: None,
            sink,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn tracker_id(&self) -> TrackerId {
        self.tracker_id
    }

    pub fn ledger(&self) -> &TrackerLedger {
        &self.ledger
    }

    /// Accept a debtor-signed note and counter-sign it.
    pub fn accept_note(&mut self, note: &DebtNote) -> Result<Receipt, LedgerError> {
        let keypair = &self.keypair;
        let (update, tracker_signature) = self
            .ledger
            .apply(note, |_| keypair.sign(&note.message()))
            .inspect_err(|e| {
                warn!("Rejected note for {:?}: {}", note.pair_key(), e);
            })?;

        info!(
            "Accepted note {:?}: amount={} ts={}",
            update.pair_key, update.entry.amount, update.entry.timestamp
        );
        Ok(Receipt {
            update,
            tracker_signature,
        })
    }

    /// Freeze the current ledger and publish its digest.
    pub fn publish_anchor(&mut self, now_ms: u64) -> Result<TrackerAnchor, LedgerError> {
        let tree = self.ledger.snapshot();
        let anchor = TrackerAnchor {
            tracker_id: self.tracker_id,
            tracker_key: self.keypair.public_key(),
            digest: tree.root(),
            anchor_time: now_ms,
        };

        self.sink.publish(&anchor)?;
        self.anchored = Some(AnchoredSnapshot {
            anchor: anchor.clone(),
            tree,
        });
        Ok(anchor)
    }

    /// Proof of the anchored entry for `debtor -> creditor`.
    ///
    /// `Ok(None)` when the pair had no debt at the last anchor.
    pub fn attest(
        &self,
        debtor: &PublicKey,
        creditor: &PublicKey,
    ) -> Result<Option<Attestation>, LedgerError> {
        let snapshot = self.anchored.as_ref().ok_or(LedgerError::NotAnchored)?;
        let pair = PairKey::derive(debtor, creditor);

        let Some(value) = snapshot.tree.get(pair.as_bytes()) else {
            return Ok(None);
        };
        let entry = DebtEntry::from_bytes(value).map_err(anyhow::Error::from)?;

        let msg = authorization_message(&pair, entry.amount, entry.timestamp);
        Ok(Some(Attestation {
            debtor: *debtor,
            creditor: *creditor,
            entry,
            proof: snapshot.tree.prove(pair.as_bytes()),
            tracker_signature: self.keypair.sign(&msg),
            anchor: snapshot.anchor.clone(),
        }))
    }
}
