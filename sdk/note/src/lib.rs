//! Obligation records
//!
//! A debt note states the *cumulative* amount a debtor has ever owed a
//! creditor. Each new note for the same pair supersedes the previous one.
//!
//! Authorization message (signed by debtor, tracker and reserve owner):
//!
//! ```text
//! ┌──────────────────┬───────────────┬───────────────┐
//! │ pair_key (32)    │ amount (8 BE) │ timestamp (8) │   48 bytes
//! └──────────────────┴───────────────┴───────────────┘
//!  emergency form appends 8 zero bytes                   56 bytes
//! ```

use basis_keypair::Keypair;
use basis_pubkey::{PairKey, PublicKey};
use basis_signature::{Signature, verify};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MESSAGE_LEN: usize = 48;
pub const EMERGENCY_MESSAGE_LEN: usize = MESSAGE_LEN + 8;
pub const ENTRY_LEN: usize = 16;
pub const AMOUNT_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoteError {
    #[error("cumulative amount decreased: {prior} -> {next}")]
    AmountDecreased { prior: u64, next: u64 },

    #[error("timestamp did not increase: {prior} -> {next}")]
    TimestampNotIncreasing { prior: u64, next: u64 },

    #[error("invalid encoding: expected {expected} bytes, got {got}")]
    InvalidEncoding { expected: usize, got: usize },
}

// ============================================================================
// Wire format
// ============================================================================

pub fn authorization_message(pair: &PairKey, amount: u64, timestamp: u64) -> [u8; MESSAGE_LEN] {
    let mut msg = [0u8; MESSAGE_LEN];
    msg[..32].copy_from_slice(pair.as_bytes());
    msg[32..40].copy_from_slice(&amount.to_be_bytes());
    msg[40..48].copy_from_slice(&timestamp.to_be_bytes());
    msg
}

/// Authorization message with the explicit zero suffix used once the
/// tracker anchor has gone stale.
pub fn emergency_message(
    pair: &PairKey,
    amount: u64,
    timestamp: u64,
) -> [u8; EMERGENCY_MESSAGE_LEN] {
    let mut msg = [0u8; EMERGENCY_MESSAGE_LEN];
    msg[..MESSAGE_LEN].copy_from_slice(&authorization_message(pair, amount, timestamp));
    msg
}

/// Redeemed-tree leaf value
pub fn encode_amount(amount: u64) -> [u8; AMOUNT_LEN] {
    amount.to_be_bytes()
}

pub fn decode_amount(bytes: &[u8]) -> Result<u64, NoteError> {
    let arr: [u8; AMOUNT_LEN] = bytes.try_into().map_err(|_| NoteError::InvalidEncoding {
        expected: AMOUNT_LEN,
        got: bytes.len(),
    })?;
    Ok(u64::from_be_bytes(arr))
}

// ============================================================================
// Ledger entry
// ============================================================================

/// Tracker ledger leaf value for one pair key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtEntry {
    pub amount: u64,
    pub timestamp: u64,
}

impl DebtEntry {
    pub fn new(amount: u64, timestamp: u64) -> Self {
        Self { amount, timestamp }
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_LEN] {
        let mut out = [0u8; ENTRY_LEN];
        out[..8].copy_from_slice(&self.amount.to_be_bytes());
        out[8..].copy_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NoteError> {
        if bytes.len() != ENTRY_LEN {
            return Err(NoteError::InvalidEncoding {
                expected: ENTRY_LEN,
                got: bytes.len(),
            });
        }
        let mut amount = [0u8; 8];
        let mut timestamp = [0u8; 8];
        amount.copy_from_slice(&bytes[..8]);
        timestamp.copy_from_slice(&bytes[8..]);
        Ok(Self {
            amount: u64::from_be_bytes(amount),
            timestamp: u64::from_be_bytes(timestamp),
        })
    }

    /// Amount may stay equal but never shrink; timestamp must move forward.
    pub fn check_supersedes(&self, prior: &DebtEntry) -> Result<(), NoteError> {
        if self.amount < prior.amount {
            return Err(NoteError::AmountDecreased {
                prior: prior.amount,
                next: self.amount,
            });
        }
        if self.timestamp <= prior.timestamp {
            return Err(NoteError::TimestampNotIncreasing {
                prior: prior.timestamp,
                next: self.timestamp,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Debt note
// ============================================================================

/// A debtor-signed statement of total debt to one creditor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtNote {
    pub debtor: PublicKey,
    pub creditor: PublicKey,
    pub amount: u64,
    pub timestamp: u64,
    pub debtor_signature: Signature,
}

impl DebtNote {
    /// Sign a new cumulative amount as `debtor`.
    pub fn issue(debtor: &Keypair, creditor: PublicKey, amount: u64, timestamp: u64) -> Self {
        let debtor_pk = debtor.public_key();
        let pair = PairKey::derive(&debtor_pk, &creditor);
        let debtor_signature = debtor.sign(&authorization_message(&pair, amount, timestamp));

        Self {
            debtor: debtor_pk,
            creditor,
            amount,
            timestamp,
            debtor_signature,
        }
    }

    pub fn pair_key(&self) -> PairKey {
        PairKey::derive(&self.debtor, &self.creditor)
    }

    pub fn entry(&self) -> DebtEntry {
        DebtEntry::new(self.amount, self.timestamp)
    }

    pub fn message(&self) -> [u8; MESSAGE_LEN] {
        authorization_message(&self.pair_key(), self.amount, self.timestamp)
    }

    pub fn verify_debtor_signature(&self) -> bool {
        verify(&self.message(), &self.debtor, &self.debtor_signature)
    }
}
