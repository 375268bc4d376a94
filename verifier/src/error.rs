use std::fmt;

use basis_authmap::ProofError;
use basis_note::NoteError;
use thiserror::Error;

/// Whose signature failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signer {
    Debtor,
    ReserveOwner,
    Tracker,
}

impl fmt::Display for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signer::Debtor => f.write_str("debtor"),
            Signer::ReserveOwner => f.write_str("reserve owner"),
            Signer::Tracker => f.write_str("tracker"),
        }
    }
}

/// Why a transition was refused. Every variant is final for the given
/// inputs; retrying is the caller's decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("Malformed input: {0}")]
    MalformedInput(&'static str),

    #[error("Invalid {0} signature")]
    InvalidSignature(Signer),

    #[error("Proof does not match digest")]
    ProofMismatch,

    #[error("Claimed amount {claimed} not attested by tracker (attested: {attested:?})")]
    AttestationMismatch { claimed: u64, attested: Option<u64> },

    #[error("Redemption of {requested} exceeds available headroom {available}")]
    InsufficientHeadroom { requested: u64, available: u64 },

    #[error("Tracker signature missing; anchor age {age_ms}ms within emergency window {window_ms}ms")]
    StaleAnchor { age_ms: u64, window_ms: u64 },

    #[error("Reserve field changed: {0}")]
    FieldChanged(&'static str),

    #[error("Anchor belongs to a different tracker")]
    TrackerMismatch,

    #[error("Balance must decrease to redeem")]
    NothingRedeemed,

    #[error("Top-up of {amount} below minimum {minimum}")]
    TopUpTooSmall { amount: u64, minimum: u64 },

    #[error("Non-monotonic debt update: {0}")]
    NonMonotonic(NoteError),
}

impl From<ProofError> for RejectReason {
    fn from(err: ProofError) -> Self {
        match err {
            ProofError::Malformed(what) => RejectReason::MalformedInput(what),
            ProofError::RootMismatch | ProofError::KeyExists | ProofError::KeyMissing => {
                RejectReason::ProofMismatch
            }
        }
    }
}
