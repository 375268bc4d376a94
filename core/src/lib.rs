//! Basis tracker node
//!
//! ```text
//!   debtor ──DebtNote──▶ Tracker ──counter-sign──▶ creditor
//!                          │
//!                          ├─ TrackerLedger (pair_key -> DebtEntry)
//!                          └─ publish_anchor ──▶ AnchorSink
//!
//!   creditor ──attestation + owner sig──▶ ReserveBook ──verify_redemption──▶ payout
//!
//!   settlement layer ──blocks──▶ Reconciler ──▶ IndexSnapshot (reserves, notes, liabilities)
//! ```

pub mod config;
pub mod reconciler;
pub mod reserves;
pub mod storage;
pub mod tracker;

#[cfg(test)]
mod tests;

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
