//! Settlement-layer records and their classification.
//!
//! Blocks arrive as JSON with hex-encoded ids and registers. Only two record
//! shapes matter to the tracker:
//!
//! ```text
//! reserve:  script_hash == reserve script, tokens[0] = (reserve_id, 1)
//!           registers = [owner(33), redeemed_digest(32), tracker_id(32)]
//!
//! note:     carries the note token, token amount = note value
//!           registers = [holder(33), history(105 * n)]
//!           history entry = reserve_id(32) || amount(8 BE) || signature(65)
//! ```

use basis_pubkey::{KeyError, PublicKey};
use basis_signature::{SIGNATURE_LEN, Signature};
use basis_verifier::{ReserveId, ReserveState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settlement-layer record id
pub type RecordId = [u8; 32];

pub const HISTORY_ENTRY_LEN: usize = 32 + 8 + SIGNATURE_LEN;

// ============================================================================
// Wire Format
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub id: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRecord {
    pub id: String,
    pub value: u64,
    pub script_hash: String,
    #[serde(default)]
    pub tokens: Vec<TokenAmount>,
    #[serde(default)]
    pub registers: Vec<String>,
}

/// One block as delivered by the settlement layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledBlock {
    pub height: u64,
    pub timestamp: u64,
    /// Ids of records consumed by this block
    #[serde(default)]
    pub spent: Vec<String>,
    #[serde(default)]
    pub created: Vec<ChainRecord>,
}

// ============================================================================
// Typed Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFilter {
    pub reserve_script_hash: [u8; 32],
    pub note_token_id: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRecord {
    #[serde(with = "hex::serde")]
    pub record_id: RecordId,
    pub state: ReserveState,
    /// Height of the block that created this record
    pub height: u64,
}

/// A reserve-backed payment recorded in a note's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(with = "hex::serde")]
    pub reserve_id: ReserveId,
    pub amount: u64,
    pub signature: Signature,
}

impl HistoryEntry {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() != HISTORY_ENTRY_LEN {
            return Err(RecordError::HistoryLength(bytes.len()));
        }
        let mut reserve_id = [0u8; 32];
        reserve_id.copy_from_slice(&bytes[..32]);
        let mut amount = [0u8; 8];
        amount.copy_from_slice(&bytes[32..40]);
        let signature =
            Signature::from_bytes(&bytes[40..]).map_err(|_| RecordError::HistoryLength(bytes.len()))?;

        Ok(Self {
            reserve_id,
            amount: u64::from_be_bytes(amount),
            signature,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HISTORY_ENTRY_LEN);
        out.extend_from_slice(&self.reserve_id);
        out.extend_from_slice(&self.amount.to_be_bytes());
        out.extend_from_slice(&self.signature.to_bytes());
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    #[serde(with = "hex::serde")]
    pub record_id: RecordId,
    pub holder: PublicKey,
    pub value: u64,
    pub history: Vec<HistoryEntry>,
    pub height: u64,
}

impl NoteRecord {
    /// The reserve named by the most recent history entry
    pub fn backing_reserve(&self) -> Option<&ReserveId> {
        self.history.last().map(|entry| &entry.reserve_id)
    }
}

/// A spent note kept for audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedNote {
    pub note: NoteRecord,
    pub spent_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Reserve(ReserveRecord),
    Note(NoteRecord),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("invalid hex in {0}")]
    InvalidHex(&'static str),

    #[error("{field} must be {expected} bytes")]
    InvalidLength {
        field: &'static str,
        expected: usize,
    },

    #[error("missing register {0}")]
    MissingRegister(usize),

    #[error("reserve has no singleton identity token")]
    MissingIdentity,

    #[error("history length {0} is not a multiple of {HISTORY_ENTRY_LEN}")]
    HistoryLength(usize),

    #[error("invalid key: {0}")]
    Key(#[from] KeyError),
}

// ============================================================================
// Classification
// ============================================================================

pub fn decode_id(field: &'static str, s: &str) -> Result<[u8; 32], RecordError> {
    let bytes = hex::decode(s).map_err(|_| RecordError::InvalidHex(field))?;
    bytes
        .try_into()
        .map_err(|_| RecordError::InvalidLength {
            field,
            expected: 32,
        })
}

fn register<'a>(record: &'a ChainRecord, index: usize) -> Result<&'a str, RecordError> {
    record
        .registers
        .get(index)
        .map(String::as_str)
        .ok_or(RecordError::MissingRegister(index))
}

fn decode_key(record: &ChainRecord, index: usize) -> Result<PublicKey, RecordError> {
    let bytes = hex::decode(register(record, index)?).map_err(|_| RecordError::InvalidHex("key"))?;
    Ok(PublicKey::from_bytes(&bytes)?)
}

fn decode_history(hex_str: &str) -> Result<Vec<HistoryEntry>, RecordError> {
    let bytes = hex::decode(hex_str).map_err(|_| RecordError::InvalidHex("history"))?;
    if bytes.len() % HISTORY_ENTRY_LEN != 0 {
        return Err(RecordError::HistoryLength(bytes.len()));
    }
    bytes
        .chunks_exact(HISTORY_ENTRY_LEN)
        .map(HistoryEntry::from_bytes)
        .collect()
}

/// Sort a created record into reserve, note or neither.
pub fn classify(
    record: &ChainRecord,
    filter: &RecordFilter,
    height: u64,
) -> Result<Option<Classified>, RecordError> {
    let record_id = decode_id("record id", &record.id)?;

    if decode_id("script hash", &record.script_hash)? == filter.reserve_script_hash {
        let identity = record
            .tokens
            .first()
            .filter(|t| t.amount == 1)
            .ok_or(RecordError::MissingIdentity)?;
        let reserve_id = decode_id("reserve id", &identity.id)?;

        let state = ReserveState {
            reserve_id,
            owner: decode_key(record, 0)?,
            redeemed_digest: decode_id("redeemed digest", register(record, 1)?)?,
            tracker_id: decode_id("tracker id", register(record, 2)?)?,
            balance: record.value,
        };
        return Ok(Some(Classified::Reserve(ReserveRecord {
            record_id,
            state,
            height,
        })));
    }

    let note_token = record.tokens.iter().find(|t| {
        decode_id("token id", &t.id)
            .map(|id| id == filter.note_token_id)
            .unwrap_or(false)
    });

    match note_token {
        Some(token) => {
            let history = match record.registers.get(1) {
                Some(h) => decode_history(h)?,
                None => Vec::new(),
            };
            Ok(Some(Classified::Note(NoteRecord {
                record_id,
                holder: decode_key(record, 0)?,
                value: token.amount,
                history,
                height,
            })))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basis_keypair::Keypair;

    fn filter() -> RecordFilter {
        RecordFilter {
            reserve_script_hash: [0xaa; 32],
            note_token_id: [0xbb; 32],
        }
    }

    fn reserve_record(owner: &PublicKey) -> ChainRecord {
        ChainRecord {
            id: hex::encode([1u8; 32]),
            value: 1_000,
            script_hash: hex::encode([0xaa; 32]),
            tokens: vec![TokenAmount {
                id: hex::encode([7u8; 32]),
                amount: 1,
            }],
            registers: vec![owner.to_hex(), hex::encode([0u8; 32]), hex::encode([9u8; 32])],
        }
    }

    #[test]
    fn classifies_reserve() {
        let owner = Keypair::generate().public_key();
        let classified = classify(&reserve_record(&owner), &filter(), 5).unwrap();

        match classified {
            Some(Classified::Reserve(r)) => {
                assert_eq!(r.state.reserve_id, [7; 32]);
                assert_eq!(r.state.owner, owner);
                assert_eq!(r.state.tracker_id, [9; 32]);
                assert_eq!(r.state.balance, 1_000);
                assert_eq!(r.height, 5);
            }
            other => panic!("expected reserve, got {:?}", other),
        }
    }

    #[test]
    fn reserve_without_singleton_is_rejected() {
        let owner = Keypair::generate().public_key();
        let mut record = reserve_record(&owner);
        record.tokens[0].amount = 2;
        assert_eq!(
            classify(&record, &filter(), 1),
            Err(RecordError::MissingIdentity)
        );
    }

    #[test]
    fn classifies_note_with_history() {
        let holder = Keypair::generate();
        let entry = HistoryEntry {
            reserve_id: [7; 32],
            amount: 250,
            signature: holder.sign(b"payment"),
        };
        let record = ChainRecord {
            id: hex::encode([2u8; 32]),
            value: 0,
            script_hash: hex::encode([0xcc; 32]),
            tokens: vec![TokenAmount {
                id: hex::encode([0xbb; 32]),
                amount: 250,
            }],
            registers: vec![holder.public_key().to_hex(), hex::encode(entry.to_bytes())],
        };

        match classify(&record, &filter(), 3).unwrap() {
            Some(Classified::Note(note)) => {
                assert_eq!(note.value, 250);
                assert_eq!(note.history, vec![entry]);
                assert_eq!(note.backing_reserve(), Some(&[7; 32]));
            }
            other => panic!("expected note, got {:?}", other),
        }
    }

    #[test]
    fn unrelated_record_is_ignored() {
        let record = ChainRecord {
            id: hex::encode([3u8; 32]),
            value: 10,
            script_hash: hex::encode([0xcc; 32]),
            tokens: vec![],
            registers: vec![],
        };
        assert_eq!(classify(&record, &filter(), 1), Ok(None));
    }

    #[test]
    fn truncated_history_is_malformed() {
        let holder = Keypair::generate().public_key();
        let record = ChainRecord {
            id: hex::encode([4u8; 32]),
            value: 0,
            script_hash: hex::encode([0xcc; 32]),
            tokens: vec![TokenAmount {
                id: hex::encode([0xbb; 32]),
                amount: 5,
            }],
            registers: vec![holder.to_hex(), "00".repeat(HISTORY_ENTRY_LEN - 1)],
        };
        assert_eq!(
            classify(&record, &filter(), 1),
            Err(RecordError::HistoryLength(HISTORY_ENTRY_LEN - 1))
        );
    }
}
