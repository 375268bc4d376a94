//! Working copy of the tracker's authenticated debt ledger.
//!
//! The tree lives behind an `Arc` so an anchored snapshot can keep serving
//! proofs while the working tree moves on; the first write after a snapshot
//! clones the tree.

use std::sync::Arc;

use anyhow::Context;
use basis_authmap::{Digest, MapProof, SparseMerkleTree};
use basis_note::{DebtEntry, DebtNote};
use basis_pubkey::PairKey;
use basis_signature::Signature;
use basis_verifier::{DebtUpdate, verify_debt_update};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::storage::{Column, SharedStore, StoreExt, WriteSet};
use crate::tracker::LedgerError;

/// Latest note for a pair with the tracker's counter-signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDebt {
    pub note: DebtNote,
    pub tracker_signature: Signature,
}

pub struct TrackerLedger {
    store: SharedStore,
    tree: Arc<SparseMerkleTree>,
}

impl TrackerLedger {
    /// Rebuild the ledger from the store's ledger column.
    pub fn open(store: SharedStore) -> Result<Self, LedgerError> {
        let mut leaves = Vec::new();
        for (key, value) in store.scan(Column::Ledger)? {
            let pair: [u8; 32] = key
                .as_slice()
                .try_into()
                .context("invalid ledger key length")?;
            DebtEntry::from_bytes(&value).context("invalid ledger entry")?;
            leaves.push((pair, value));
        }

        let tree = SparseMerkleTree::from_leaves(leaves);
        info!(
            "Ledger loaded: {} pairs, root={}",
            tree.len(),
            hex::encode(tree.root())
        );

        Ok(Self {
            store,
            tree: Arc::new(tree),
        })
    }

    pub fn root(&self) -> Digest {
        self.tree.root()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn entry(&self, pair: &PairKey) -> Option<DebtEntry> {
        self.tree
            .get(pair.as_bytes())
            .and_then(|v| DebtEntry::from_bytes(v).ok())
    }

    pub fn prove(&self, pair: &PairKey) -> MapProof {
        self.tree.prove(pair.as_bytes())
    }

    /// Shared handle to the current tree. Later writes do not affect it.
    pub fn snapshot(&self) -> Arc<SparseMerkleTree> {
        Arc::clone(&self.tree)
    }

    /// Latest counter-signed note for a pair
    pub fn authorization(&self, pair: &PairKey) -> Result<Option<SignedDebt>, LedgerError> {
        Ok(self.store.get_json(Column::Authorizations, pair.as_bytes())?)
    }

    /// Check a note against the current root and persist it with its
    /// counter-signature. `counter_sign` only runs once the note has passed
    /// the signature and monotonicity checks. The in-memory tree only moves
    /// once the write lands.
    pub fn apply<F>(
        &mut self,
        note: &DebtNote,
        counter_sign: F,
    ) -> Result<(DebtUpdate, Signature), LedgerError>
    where
        F: FnOnce(&DebtUpdate) -> Signature,
    {
        let pair = note.pair_key();
        let proof = self.tree.prove(pair.as_bytes());
        let update = verify_debt_update(&self.tree.root(), note, &proof)?;
        let tracker_signature = counter_sign(&update);

        let mut batch = WriteSet::new();
        batch.put(Column::Ledger, pair.0, update.entry.to_bytes());
        batch.put_json(
            Column::Authorizations,
            pair.0,
            &SignedDebt {
                note: note.clone(),
                tracker_signature,
            },
        )?;
        self.store.write(batch)?;

        Arc::make_mut(&mut self.tree).insert(pair.0, update.entry.to_bytes().to_vec());
        debug_assert_eq!(self.tree.root(), update.next_digest);

        debug!(
            "Ledger update {:?}: {:?} -> {:?}",
            pair, update.prior, update.entry
        );
        Ok((update, tracker_signature))
    }
}
