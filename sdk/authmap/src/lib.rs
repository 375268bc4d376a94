//! Authenticated Map
//!
//! A key-value map summarised by a 32-byte digest. Holders of the digest can
//! check a single key's value (or its absence) with a compact proof, and can
//! derive the next digest after an insert or update without seeing the rest
//! of the map.
//!
//! ```text
//!   prover side                      verifier side
//!   ───────────                      ─────────────
//!   SparseMerkleTree ── prove() ──▶  MapProof ──▶ SparseMerkleMap::lookup
//!        │                                        SparseMerkleMap::update
//!        └── root() ─────────────▶  Digest (anchored externally)
//! ```

mod hash;
mod proof;
mod tree;

pub use hash::{DEPTH, EMPTY_LEAF, empty_root, leaf_hash, node_hash};
pub use proof::{MapProof, SparseMerkleMap};
pub use tree::SparseMerkleTree;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Root hash of an authenticated map
pub type Digest = [u8; 32];

/// Map keys are fixed 32-byte values
pub type Key = [u8; 32];

/// Which writes a verifier will accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeMode {
    /// Only fresh keys may be written
    InsertOnly,
    /// Only existing keys may be written
    UpdateOnly,
    InsertOrUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("malformed proof: {0}")]
    Malformed(&'static str),

    #[error("proof does not match digest")]
    RootMismatch,

    #[error("key already present in insert-only map")]
    KeyExists,

    #[error("key absent from update-only map")]
    KeyMissing,
}

/// Proof-checked access to a map held only as a digest.
///
/// Implementations are pure: the same inputs always give the same result.
pub trait AuthenticatedMap {
    type Proof;

    /// Value proven for `key`, or `None` when the proof shows absence.
    fn lookup(
        &self,
        digest: &Digest,
        key: &Key,
        proof: &Self::Proof,
    ) -> Result<Option<Vec<u8>>, ProofError>;

    /// Digest after writing `value` at `key`.
    fn update(
        &self,
        digest: &Digest,
        key: &Key,
        value: &[u8],
        proof: &Self::Proof,
    ) -> Result<Digest, ProofError>;
}
