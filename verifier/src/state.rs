use basis_authmap::{DEPTH, Digest, empty_root};
use basis_pubkey::PublicKey;
use serde::{Deserialize, Serialize};

use crate::RejectReason;

pub type ReserveId = [u8; 32];
pub type TrackerId = [u8; 32];

/// 7 days
pub const DEFAULT_EMERGENCY_WINDOW_MS: u64 = 7 * 24 * 60 * 60 * 1000;
pub const DEFAULT_MIN_TOP_UP: u64 = 1;

/// Externally visible reserve fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveState {
    /// Singleton identity marker
    #[serde(with = "hex::serde")]
    pub reserve_id: ReserveId,
    pub owner: PublicKey,
    /// Digest of pair_key -> cumulative redeemed amount
    #[serde(with = "hex::serde")]
    pub redeemed_digest: Digest,
    #[serde(with = "hex::serde")]
    pub tracker_id: TrackerId,
    pub balance: u64,
}

impl ReserveState {
    /// A freshly created reserve with nothing redeemed.
    pub fn new(reserve_id: ReserveId, owner: PublicKey, tracker_id: TrackerId, balance: u64) -> Self {
        Self {
            reserve_id,
            owner,
            redeemed_digest: empty_root(DEPTH),
            tracker_id,
            balance,
        }
    }

    /// Every field except balance and redeemed digest must be identical.
    pub(crate) fn check_identity_unchanged(&self, next: &ReserveState) -> Result<(), RejectReason> {
        if self.reserve_id != next.reserve_id {
            return Err(RejectReason::FieldChanged("reserve_id"));
        }
        if self.owner != next.owner {
            return Err(RejectReason::FieldChanged("owner"));
        }
        if self.tracker_id != next.tracker_id {
            return Err(RejectReason::FieldChanged("tracker_id"));
        }
        Ok(())
    }
}

/// Tracker ledger digest as published to the settlement layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerAnchor {
    #[serde(with = "hex::serde")]
    pub tracker_id: TrackerId,
    pub tracker_key: PublicKey,
    #[serde(with = "hex::serde")]
    pub digest: Digest,
    /// Milliseconds since epoch
    pub anchor_time: u64,
}

impl TrackerAnchor {
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.anchor_time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Anchor age after which the tracker signature is no longer required
    pub emergency_window_ms: u64,
    pub min_top_up: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            emergency_window_ms: DEFAULT_EMERGENCY_WINDOW_MS,
            min_top_up: DEFAULT_MIN_TOP_UP,
        }
    }
}

impl VerifierConfig {
    /// Strictly past the window
    pub fn is_emergency(&self, anchor: &TrackerAnchor, now_ms: u64) -> bool {
        anchor.age_ms(now_ms) > self.emergency_window_ms
    }
}
