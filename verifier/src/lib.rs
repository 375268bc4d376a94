//! Basis reserve verifier
//!
//! Pure transition functions a settlement host evaluates atomically:
//!
//! ```text
//!            propose                  all checks pass
//!   Idle ───────────────▶ Pending ─────────────────────▶ Committed
//!    ▲                       │                              │
//!    │                       └──── any check fails ──▶ Rejected
//!    └──────────────────────────────────────────────────────┘
//!                 reserve state is re-entrant
//! ```
//!
//! Nothing here performs I/O. Digests, signatures and proofs arrive already
//! fetched, and the result is either a full [`CommitEffect`] or a
//! [`RejectReason`] with no partial effect.

mod debt;
mod error;
mod redemption;
mod state;
mod top_up;
mod witness;

pub use debt::{DebtUpdate, verify_debt_update};
pub use error::{RejectReason, Signer};
pub use redemption::{
    CommitEffect, Decision, Payout, RedemptionAttempt, RedemptionPhase, decide, verify_redemption,
};
pub use state::{
    DEFAULT_EMERGENCY_WINDOW_MS, DEFAULT_MIN_TOP_UP, ReserveId, ReserveState, TrackerAnchor,
    TrackerId, VerifierConfig,
};
pub use top_up::verify_top_up;
pub use witness::{RawRedemption, RedemptionWitness};
