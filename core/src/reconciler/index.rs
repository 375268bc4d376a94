use std::collections::BTreeMap;

use basis_pubkey::PublicKey;
use basis_verifier::ReserveId;
use serde::{Deserialize, Serialize};

use super::records::{NoteRecord, RecordId, ReserveRecord};

/// Derived view of the settlement layer as of one height.
///
/// Readers hold an `Arc` to a published snapshot. The reconciler builds the
/// next one on a clone and swaps it in only after it has been persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    /// Last fully processed height
    pub height: Option<u64>,
    pub reserves: BTreeMap<ReserveId, ReserveRecord>,
    pub notes: BTreeMap<RecordId, NoteRecord>,
    /// Outstanding note value per reserve
    pub liabilities: BTreeMap<ReserveId, u64>,
}

/// Change to a reserve's stored liability. `None` means drop the entry.
pub type LiabilityChange = (ReserveId, Option<u64>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveReport {
    #[serde(with = "hex::serde")]
    pub reserve_id: ReserveId,
    pub owner: PublicKey,
    pub balance: u64,
    pub liabilities: u64,
    pub is_solvent: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolvencyReport {
    pub height: Option<u64>,
    pub reserves: Vec<ReserveReport>,
    pub total_balance: u64,
    pub total_liabilities: u64,
    pub insolvent: usize,
}

impl IndexSnapshot {
    pub fn reserve_by_record(&self, record_id: &RecordId) -> Option<ReserveId> {
        self.reserves
            .iter()
            .find(|(_, r)| &r.record_id == record_id)
            .map(|(id, _)| *id)
    }

    pub fn notes_by_holder(&self, holder: &PublicKey) -> Vec<&NoteRecord> {
        self.notes.values().filter(|n| &n.holder == holder).collect()
    }

    /// Outstanding notes whose latest history entry names `reserve_id`
    pub fn notes_by_reserve(&self, reserve_id: &ReserveId) -> Vec<&NoteRecord> {
        self.notes
            .values()
            .filter(|n| n.backing_reserve() == Some(reserve_id))
            .collect()
    }

    pub fn liability_of(&self, reserve_id: &ReserveId) -> u64 {
        self.notes_by_reserve(reserve_id)
            .iter()
            .fold(0u64, |acc, n| acc.saturating_add(n.value))
    }

    /// Bring stored liabilities in line with the current notes.
    ///
    /// Returns only the entries that changed.
    pub fn recompute_liabilities(&mut self) -> Vec<LiabilityChange> {
        let mut changes = Vec::new();

        let fresh: BTreeMap<ReserveId, u64> = self
            .reserves
            .keys()
            .map(|id| (*id, self.liability_of(id)))
            .collect();

        for (id, value) in &fresh {
            if self.liabilities.get(id) != Some(value) {
                changes.push((*id, Some(*value)));
            }
        }
        for id in self.liabilities.keys() {
            if !fresh.contains_key(id) {
                changes.push((*id, None));
            }
        }

        self.liabilities = fresh;
        changes
    }

    pub fn proof_of_reserves(&self, reserve_id: &ReserveId) -> Option<ReserveReport> {
        let record = self.reserves.get(reserve_id)?;
        let liabilities = self
            .liabilities
            .get(reserve_id)
            .copied()
            .unwrap_or_else(|| self.liability_of(reserve_id));

        Some(ReserveReport {
            reserve_id: *reserve_id,
            owner: record.state.owner,
            balance: record.state.balance,
            liabilities,
            is_solvent: record.state.balance >= liabilities,
        })
    }

    pub fn solvency_report(&self) -> SolvencyReport {
        let reserves: Vec<ReserveReport> = self
            .reserves
            .keys()
            .filter_map(|id| self.proof_of_reserves(id))
            .collect();

        SolvencyReport {
            height: self.height,
            total_balance: reserves
                .iter()
                .fold(0u64, |acc, r| acc.saturating_add(r.balance)),
            total_liabilities: reserves
                .iter()
                .fold(0u64, |acc, r| acc.saturating_add(r.liabilities)),
            insolvent: reserves.iter().filter(|r| !r.is_solvent).count(),
            reserves,
        }
    }
}
