//! Reserve Book
//!
//! In-process host for the redemption verifier. Holds each reserve's state
//! together with its full redeemed tree, so it can hand creditors the proofs
//! they need and apply committed transitions.
//!
//! The anchor a creditor submits is only accepted if it is the one the
//! reserve's tracker last published. Redemption is checked against that
//! published record, never against caller-supplied digests.
//!
//! Every commit runs under the reserve's exclusive map entry. Two creditors
//! racing on the same reserve are serialised; the loser's proof was built
//! against the old digest and is rejected with `ProofMismatch`.

use std::sync::Arc;

use basis_authmap::{AuthenticatedMap, MapProof, SparseMerkleMap, SparseMerkleTree, TreeMode};
use basis_note::{decode_amount, encode_amount};
use basis_pubkey::{PairKey, PublicKey};
use basis_verifier::{
    CommitEffect, RawRedemption, RedemptionAttempt, RedemptionWitness, RejectReason, ReserveId,
    ReserveState, TrackerAnchor, VerifierConfig, verify_top_up,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{info, warn};
use thiserror::Error;

use crate::tracker::AnchorRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookError {
    #[error("unknown reserve {0}")]
    UnknownReserve(String),

    #[error("reserve {0} already registered")]
    AlreadyRegistered(String),

    #[error("new reserve must start with an empty redeemed tree")]
    NotFresh,

    #[error("redemption amount must be positive and within the reserve balance")]
    InvalidAmount,

    #[error("tracker has not published an anchor")]
    NoPublishedAnchor,

    #[error("anchor is not the tracker's latest published anchor")]
    UnpublishedAnchor,

    #[error("anchor lookup failed: {0}")]
    AnchorLookup(String),

    #[error(transparent)]
    Rejected(#[from] RejectReason),
}

struct ReserveSlot {
    state: ReserveState,
    redeemed: SparseMerkleTree,
}

/// Proposal a creditor signs off on and submits with their witness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionProposal {
    pub prior: ReserveState,
    pub proposed: ReserveState,
    pub redeemed_proof: MapProof,
    pub redeemed_so_far: u64,
}

pub struct ReserveBook {
    reserves: DashMap<ReserveId, ReserveSlot>,
    config: VerifierConfig,
    anchors: Arc<dyn AnchorRegistry>,
}

impl ReserveBook {
    pub fn new(config: VerifierConfig, anchors: Arc<dyn AnchorRegistry>) -> Self {
        Self {
            reserves: DashMap::new(),
            config,
            anchors,
        }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn register(&self, state: ReserveState) -> Result<(), BookError> {
        let fresh = SparseMerkleTree::new();
        if state.redeemed_digest != fresh.root() {
            return Err(BookError::NotFresh);
        }

        match self.reserves.entry(state.reserve_id) {
            Entry::Occupied(_) => Err(BookError::AlreadyRegistered(hex::encode(state.reserve_id))),
            Entry::Vacant(slot) => {
                info!(
                    "Reserve registered: {} owner={} balance={}",
                    hex::encode(state.reserve_id),
                    state.owner,
                    state.balance
                );
                slot.insert(ReserveSlot {
                    state,
                    redeemed: fresh,
                });
                Ok(())
            }
        }
    }

    pub fn state(&self, reserve_id: &ReserveId) -> Option<ReserveState> {
        self.reserves.get(reserve_id).map(|slot| slot.state.clone())
    }

    pub fn len(&self) -> usize {
        self.reserves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reserves.is_empty()
    }

    /// Cumulative amount redeemed by `receiver` from this reserve's owner
    pub fn redeemed(&self, reserve_id: &ReserveId, receiver: &PublicKey) -> Option<u64> {
        let slot = self.reserves.get(reserve_id)?;
        let pair = PairKey::derive(&slot.state.owner, receiver);
        Some(
            slot.redeemed
                .get(pair.as_bytes())
                .and_then(|v| decode_amount(v).ok())
                .unwrap_or(0),
        )
    }

    /// Build the next reserve state for redeeming `amount` to `receiver`.
    pub fn prepare_redemption(
        &self,
        reserve_id: &ReserveId,
        receiver: &PublicKey,
        amount: u64,
    ) -> Result<RedemptionProposal, BookError> {
        let slot = self
            .reserves
            .get(reserve_id)
            .ok_or_else(|| BookError::UnknownReserve(hex::encode(reserve_id)))?;

        let prior = slot.state.clone();
        let balance = prior
            .balance
            .checked_sub(amount)
            .filter(|_| amount > 0)
            .ok_or(BookError::InvalidAmount)?;

        let pair = PairKey::derive(&prior.owner, receiver);
        let redeemed_proof = slot.redeemed.prove(pair.as_bytes());
        let redeemed_so_far = slot
            .redeemed
            .get(pair.as_bytes())
            .and_then(|v| decode_amount(v).ok())
            .unwrap_or(0);

        let total = redeemed_so_far
            .checked_add(amount)
            .ok_or(BookError::InvalidAmount)?;
        let next_digest = SparseMerkleMap::new(TreeMode::InsertOrUpdate)
            .update(
                &prior.redeemed_digest,
                pair.as_bytes(),
                &encode_amount(total),
                &redeemed_proof,
            )
            .map_err(RejectReason::from)?;

        let mut proposed = prior.clone();
        proposed.balance = balance;
        proposed.redeemed_digest = next_digest;

        Ok(RedemptionProposal {
            prior,
            proposed,
            redeemed_proof,
            redeemed_so_far,
        })
    }

    /// Verify and apply a redemption atomically.
    pub fn submit_redemption(
        &self,
        reserve_id: &ReserveId,
        proposed: &ReserveState,
        anchor: &TrackerAnchor,
        witness: &RedemptionWitness,
        now_ms: u64,
    ) -> Result<CommitEffect, BookError> {
        let mut slot = self
            .reserves
            .get_mut(reserve_id)
            .ok_or_else(|| BookError::UnknownReserve(hex::encode(reserve_id)))?;

        let published = self
            .anchors
            .latest(&slot.state.tracker_id)
            .map_err(|e| BookError::AnchorLookup(format!("{e:#}")))?
            .ok_or(BookError::NoPublishedAnchor)?;
        if published != *anchor {
            warn!(
                "Redemption on {} cites an unpublished anchor (time {})",
                hex::encode(reserve_id),
                anchor.anchor_time
            );
            return Err(BookError::UnpublishedAnchor);
        }

        let decision = RedemptionAttempt::new(&slot.state)
            .propose(proposed, witness)
            .resolve(&published, &self.config, now_ms);
        let effect = Result::<CommitEffect, RejectReason>::from(decision).inspect_err(|reason| {
            warn!(
                "Redemption rejected on {}: {}",
                hex::encode(reserve_id),
                reason
            );
        })?;

        slot.redeemed.insert(
            effect.pair_key.0,
            encode_amount(effect.redeemed_total).to_vec(),
        );
        debug_assert_eq!(slot.redeemed.root(), effect.next_state.redeemed_digest);
        slot.state = effect.next_state.clone();

        info!(
            "Redemption committed on {}: {} to {} (total {}, emergency={})",
            hex::encode(reserve_id),
            effect.payout.amount,
            effect.payout.receiver,
            effect.redeemed_total,
            effect.emergency
        );
        Ok(effect)
    }

    /// Same as [`submit_redemption`](Self::submit_redemption) for byte-level
    /// inputs. Malformed inputs are rejected before any verification.
    pub fn submit_raw_redemption(
        &self,
        reserve_id: &ReserveId,
        proposed: &ReserveState,
        anchor: &TrackerAnchor,
        raw: &RawRedemption,
        now_ms: u64,
    ) -> Result<CommitEffect, BookError> {
        let witness = raw.decode()?;
        self.submit_redemption(reserve_id, proposed, anchor, &witness, now_ms)
    }

    /// Add `amount` to a reserve. Returns the new balance.
    pub fn top_up(&self, reserve_id: &ReserveId, amount: u64) -> Result<u64, BookError> {
        let mut slot = self
            .reserves
            .get_mut(reserve_id)
            .ok_or_else(|| BookError::UnknownReserve(hex::encode(reserve_id)))?;

        let mut proposed = slot.state.clone();
        proposed.balance = proposed
            .balance
            .checked_add(amount)
            .ok_or(BookError::InvalidAmount)?;

        verify_top_up(&slot.state, &proposed, &self.config)?;
        slot.state = proposed;

        info!(
            "Reserve {} topped up by {} to {}",
            hex::encode(reserve_id),
            amount,
            slot.state.balance
        );
        Ok(slot.state.balance)
    }
}
