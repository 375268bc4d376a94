use basis_authmap::MapProof;
use basis_pubkey::PublicKey;
use basis_signature::Signature;
use serde::{Deserialize, Serialize};

use crate::RejectReason;

/// Redemption inputs as raw bytes, the way a host transaction carries them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRedemption {
    #[serde(with = "hex::serde")]
    pub receiver: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub owner_signature: Vec<u8>,
    /// Empty when the tracker did not co-sign
    #[serde(with = "hex::serde")]
    pub tracker_signature: Vec<u8>,
    pub claimed_amount: u64,
    pub debt_timestamp: u64,
    #[serde(with = "hex::serde")]
    pub redeemed_proof: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub tracker_proof: Vec<u8>,
}

/// Typed redemption inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionWitness {
    pub receiver: PublicKey,
    pub owner_signature: Signature,
    pub tracker_signature: Option<Signature>,
    /// Cumulative debt the tracker attested for this pair
    pub claimed_amount: u64,
    /// Timestamp of the attested debt entry
    pub debt_timestamp: u64,
    /// Proof into the reserve's redeemed tree
    pub redeemed_proof: MapProof,
    /// Proof into the anchored tracker ledger
    pub tracker_proof: MapProof,
}

impl RawRedemption {
    /// Length and encoding checks only. Runs before any cryptography.
    pub fn decode(&self) -> Result<RedemptionWitness, RejectReason> {
        let receiver = PublicKey::from_bytes(&self.receiver)
            .map_err(|_| RejectReason::MalformedInput("receiver key"))?;

        let owner_signature = Signature::from_bytes(&self.owner_signature)
            .map_err(|_| RejectReason::MalformedInput("owner signature"))?;

        let tracker_signature = if self.tracker_signature.is_empty() {
            None
        } else {
            Some(
                Signature::from_bytes(&self.tracker_signature)
                    .map_err(|_| RejectReason::MalformedInput("tracker signature"))?,
            )
        };

        let redeemed_proof = MapProof::from_bytes(&self.redeemed_proof)
            .map_err(|_| RejectReason::MalformedInput("redeemed proof"))?;
        let tracker_proof = MapProof::from_bytes(&self.tracker_proof)
            .map_err(|_| RejectReason::MalformedInput("tracker proof"))?;

        Ok(RedemptionWitness {
            receiver,
            owner_signature,
            tracker_signature,
            claimed_amount: self.claimed_amount,
            debt_timestamp: self.debt_timestamp,
            redeemed_proof,
            tracker_proof,
        })
    }
}

impl From<&RedemptionWitness> for RawRedemption {
    fn from(w: &RedemptionWitness) -> Self {
        Self {
            receiver: w.receiver.as_bytes().to_vec(),
            owner_signature: w.owner_signature.to_bytes().to_vec(),
            tracker_signature: w
                .tracker_signature
                .map(|s| s.to_bytes().to_vec())
                .unwrap_or_default(),
            claimed_amount: w.claimed_amount,
            debt_timestamp: w.debt_timestamp,
            redeemed_proof: w.redeemed_proof.to_bytes(),
            tracker_proof: w.tracker_proof.to_bytes(),
        }
    }
}
