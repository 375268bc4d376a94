use basis_authmap::{AuthenticatedMap, SparseMerkleMap, TreeMode};
use basis_note::{DebtEntry, authorization_message, decode_amount, emergency_message, encode_amount};
use basis_pubkey::{PairKey, PublicKey};
use basis_signature::verify;
use serde::{Deserialize, Serialize};

use crate::{RedemptionWitness, RejectReason, ReserveState, Signer, TrackerAnchor, VerifierConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionPhase {
    /// Reserve as published
    Idle,
    /// A transition has been proposed and is being checked
    RedemptionPending,
    Committed,
    Rejected,
}

impl RedemptionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RedemptionPhase::Committed | RedemptionPhase::Rejected)
    }
}

/// Value released to the creditor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub receiver: PublicKey,
    pub amount: u64,
}

/// Everything a host applies after a successful redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEffect {
    pub next_state: ReserveState,
    pub pair_key: PairKey,
    /// Cumulative redeemed amount for the pair after this redemption
    pub redeemed_total: u64,
    pub payout: Payout,
    /// Committed without a live tracker signature
    pub emergency: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Committed(CommitEffect),
    Rejected(RejectReason),
}

impl Decision {
    pub fn phase(&self) -> RedemptionPhase {
        match self {
            Decision::Committed(_) => RedemptionPhase::Committed,
            Decision::Rejected(_) => RedemptionPhase::Rejected,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Decision::Committed(_))
    }
}

impl From<Decision> for Result<CommitEffect, RejectReason> {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Committed(effect) => Ok(effect),
            Decision::Rejected(reason) => Err(reason),
        }
    }
}

impl From<Result<CommitEffect, RejectReason>> for Decision {
    fn from(result: Result<CommitEffect, RejectReason>) -> Self {
        match result {
            Ok(effect) => Decision::Committed(effect),
            Err(reason) => Decision::Rejected(reason),
        }
    }
}

/// Check a proposed redemption against the prior reserve state.
///
/// The reserve owner is the debtor and `witness.receiver` the creditor.
pub fn verify_redemption(
    prior: &ReserveState,
    proposed: &ReserveState,
    anchor: &TrackerAnchor,
    witness: &RedemptionWitness,
    config: &VerifierConfig,
    now_ms: u64,
) -> Result<CommitEffect, RejectReason> {
    if anchor.tracker_id != prior.tracker_id {
        return Err(RejectReason::TrackerMismatch);
    }

    // 1. pair key
    let pair = PairKey::derive(&prior.owner, &witness.receiver);
    let redeemed_map = SparseMerkleMap::new(TreeMode::InsertOrUpdate);

    // 2. redeemed so far, absence = 0
    let redeemed_so_far = redeemed_map
        .lookup(&prior.redeemed_digest, pair.as_bytes(), &witness.redeemed_proof)?
        .map(|v| decode_amount(&v))
        .transpose()
        .map_err(|_| RejectReason::MalformedInput("redeemed value"))?
        .unwrap_or(0);

    // 3. tracker attestation against the anchored digest
    let attested = SparseMerkleMap::new(TreeMode::InsertOrUpdate)
        .lookup(&anchor.digest, pair.as_bytes(), &witness.tracker_proof)?
        .map(|v| DebtEntry::from_bytes(&v))
        .transpose()
        .map_err(|_| RejectReason::MalformedInput("ledger value"))?;

    let claimed = DebtEntry::new(witness.claimed_amount, witness.debt_timestamp);
    if attested != Some(claimed) {
        return Err(RejectReason::AttestationMismatch {
            claimed: claimed.amount,
            attested: attested.map(|e| e.amount),
        });
    }

    // 4. emergency mode
    let emergency = config.is_emergency(anchor, now_ms);
    let message = authorization_message(&pair, claimed.amount, claimed.timestamp);

    // 5. owner signature, always required
    let owner_ok = verify(&message, &prior.owner, &witness.owner_signature)
        || (emergency
            && verify(
                &emergency_message(&pair, claimed.amount, claimed.timestamp),
                &prior.owner,
                &witness.owner_signature,
            ));
    if !owner_ok {
        return Err(RejectReason::InvalidSignature(Signer::ReserveOwner));
    }

    // 6. tracker signature unless emergency
    if !emergency {
        match &witness.tracker_signature {
            None => {
                return Err(RejectReason::StaleAnchor {
                    age_ms: anchor.age_ms(now_ms),
                    window_ms: config.emergency_window_ms,
                });
            }
            Some(sig) if !verify(&message, &anchor.tracker_key, sig) => {
                return Err(RejectReason::InvalidSignature(Signer::Tracker));
            }
            Some(_) => {}
        }
    }

    // 7. headroom
    let redeem_amount = prior
        .balance
        .checked_sub(proposed.balance)
        .filter(|amount| *amount > 0)
        .ok_or(RejectReason::NothingRedeemed)?;
    let available = claimed.amount.saturating_sub(redeemed_so_far);
    if redeem_amount > available {
        return Err(RejectReason::InsufficientHeadroom {
            requested: redeem_amount,
            available,
        });
    }

    // 8. next redeemed digest
    let redeemed_total = redeemed_so_far + redeem_amount;
    let next_digest = redeemed_map.update(
        &prior.redeemed_digest,
        pair.as_bytes(),
        &encode_amount(redeemed_total),
        &witness.redeemed_proof,
    )?;
    if next_digest != proposed.redeemed_digest {
        return Err(RejectReason::ProofMismatch);
    }

    // 9. nothing else moves
    prior.check_identity_unchanged(proposed)?;

    Ok(CommitEffect {
        next_state: proposed.clone(),
        pair_key: pair,
        redeemed_total,
        payout: Payout {
            receiver: witness.receiver,
            amount: redeem_amount,
        },
        emergency,
    })
}

/// One redemption invocation against a published reserve.
///
/// ```text
/// Idle ──propose──▶ RedemptionPending ──resolve──▶ Committed | Rejected
/// ```
///
/// The reserve itself never reaches a terminal phase. Each attempt starts
/// from `Idle` against the reserve state current at that moment.
#[derive(Debug, Clone)]
pub struct RedemptionAttempt<'a> {
    prior: &'a ReserveState,
    proposal: Option<(&'a ReserveState, &'a RedemptionWitness)>,
}

impl<'a> RedemptionAttempt<'a> {
    pub fn new(prior: &'a ReserveState) -> Self {
        Self {
            prior,
            proposal: None,
        }
    }

    pub fn phase(&self) -> RedemptionPhase {
        match self.proposal {
            None => RedemptionPhase::Idle,
            Some(_) => RedemptionPhase::RedemptionPending,
        }
    }

    pub fn propose(self, proposed: &'a ReserveState, witness: &'a RedemptionWitness) -> Self {
        Self {
            prior: self.prior,
            proposal: Some((proposed, witness)),
        }
    }

    /// Run every check. Resolving an attempt with nothing proposed rejects it.
    pub fn resolve(self, anchor: &TrackerAnchor, config: &VerifierConfig, now_ms: u64) -> Decision {
        match self.proposal {
            None => Decision::Rejected(RejectReason::MalformedInput("no proposed state")),
            Some((proposed, witness)) => {
                decide(self.prior, proposed, anchor, witness, config, now_ms)
            }
        }
    }
}

/// [`verify_redemption`] as a terminal state-machine decision.
pub fn decide(
    prior: &ReserveState,
    proposed: &ReserveState,
    anchor: &TrackerAnchor,
    witness: &RedemptionWitness,
    config: &VerifierConfig,
    now_ms: u64,
) -> Decision {
    verify_redemption(prior, proposed, anchor, witness, config, now_ms).into()
}
