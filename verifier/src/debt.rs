use basis_authmap::{AuthenticatedMap, Digest, MapProof, SparseMerkleMap, TreeMode};
use basis_note::{DebtEntry, DebtNote};
use basis_pubkey::PairKey;
use serde::{Deserialize, Serialize};

use crate::{RejectReason, Signer};

/// Result of applying one debtor-signed note to a ledger digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtUpdate {
    pub pair_key: PairKey,
    /// `None` on first interaction between the pair
    pub prior: Option<DebtEntry>,
    pub entry: DebtEntry,
    pub next_digest: Digest,
}

/// Ledger transition for a new note.
///
/// A pair with no entry is treated as owing 0 at time 0, so the first note
/// only needs a nonzero timestamp.
pub fn verify_debt_update(
    prior_digest: &Digest,
    note: &DebtNote,
    proof: &MapProof,
) -> Result<DebtUpdate, RejectReason> {
    if !note.verify_debtor_signature() {
        return Err(RejectReason::InvalidSignature(Signer::Debtor));
    }

    let pair_key = note.pair_key();
    let map = SparseMerkleMap::new(TreeMode::InsertOrUpdate);

    let prior = map
        .lookup(prior_digest, pair_key.as_bytes(), proof)?
        .map(|v| DebtEntry::from_bytes(&v))
        .transpose()
        .map_err(|_| RejectReason::MalformedInput("ledger value"))?;

    let entry = note.entry();
    entry
        .check_supersedes(&prior.unwrap_or_default())
        .map_err(RejectReason::NonMonotonic)?;

    let next_digest = map.update(prior_digest, pair_key.as_bytes(), &entry.to_bytes(), proof)?;

    Ok(DebtUpdate {
        pair_key,
        prior,
        entry,
        next_digest,
    })
}
