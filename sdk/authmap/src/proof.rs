use serde::{Deserialize, Serialize};

use crate::hash::{DEPTH, EMPTY_LEAF, empty_root, fold_path, leaf_hash};
use crate::{AuthenticatedMap, Digest, Key, ProofError, TreeMode};

const BITMAP_LEN: usize = DEPTH / 8;

/// Authentication path for one key.
///
/// Only non-empty siblings are carried; `bitmap` bit `h` marks whether the
/// sibling at height `h` is present in `siblings` (ordered leaf to root) or
/// is the empty subtree root for that height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapProof {
    /// Claimed leaf value, `None` for an absence proof
    pub value: Option<Vec<u8>>,
    #[serde(with = "hex::serde")]
    pub bitmap: [u8; BITMAP_LEN],
    pub siblings: Vec<Digest>,
}

impl MapProof {
    pub(crate) fn has_sibling(&self, height: usize) -> bool {
        (self.bitmap[height / 8] >> (height % 8)) & 1 == 1
    }

    pub(crate) fn set_sibling(&mut self, height: usize) {
        self.bitmap[height / 8] |= 1 << (height % 8);
    }

    fn expected_siblings(&self) -> usize {
        self.bitmap.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Root implied by this proof with `leaf` at `key`'s slot.
    fn root_with_leaf(&self, key: &Key, leaf: Digest) -> Result<Digest, ProofError> {
        if self.siblings.len() != self.expected_siblings() {
            return Err(ProofError::Malformed("sibling count does not match bitmap"));
        }

        let mut next = self.siblings.iter();
        let root = fold_path(key, leaf, |h| {
            if self.has_sibling(h) {
                // count checked above
                next.next().copied().unwrap_or(EMPTY_LEAF)
            } else {
                empty_root(h)
            }
        });
        Ok(root)
    }

    /// Root implied by this proof as given.
    pub fn implied_root(&self, key: &Key) -> Result<Digest, ProofError> {
        let leaf = match &self.value {
            Some(v) => leaf_hash(key, v),
            None => EMPTY_LEAF,
        };
        self.root_with_leaf(key, leaf)
    }

    /// Byte form used inside transactions:
    ///
    /// ```text
    /// flag(1) [len(4 BE) value] bitmap(32) sibling(32)*
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + BITMAP_LEN + 32 * self.siblings.len() + 16);
        match &self.value {
            Some(v) => {
                out.push(1);
                out.extend_from_slice(&(v.len() as u32).to_be_bytes());
                out.extend_from_slice(v);
            }
            None => out.push(0),
        }
        out.extend_from_slice(&self.bitmap);
        for s in &self.siblings {
            out.extend_from_slice(s);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        let (&flag, mut rest) = bytes
            .split_first()
            .ok_or(ProofError::Malformed("empty proof"))?;

        let value = match flag {
            0 => None,
            1 => {
                if rest.len() < 4 {
                    return Err(ProofError::Malformed("truncated value length"));
                }
                let (len, tail) = rest.split_at(4);
                let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
                if tail.len() < len {
                    return Err(ProofError::Malformed("truncated value"));
                }
                let (v, tail) = tail.split_at(len);
                rest = tail;
                Some(v.to_vec())
            }
            _ => return Err(ProofError::Malformed("unknown value flag")),
        };

        if rest.len() < BITMAP_LEN {
            return Err(ProofError::Malformed("truncated bitmap"));
        }
        let (bm, rest) = rest.split_at(BITMAP_LEN);
        let mut bitmap = [0u8; BITMAP_LEN];
        bitmap.copy_from_slice(bm);

        if rest.len() % 32 != 0 {
            return Err(ProofError::Malformed("trailing bytes"));
        }
        let siblings: Vec<Digest> = rest
            .chunks_exact(32)
            .map(|c| {
                let mut d = [0u8; 32];
                d.copy_from_slice(c);
                d
            })
            .collect();

        let proof = Self {
            value,
            bitmap,
            siblings,
        };
        if proof.siblings.len() != proof.expected_siblings() {
            return Err(ProofError::Malformed("sibling count does not match bitmap"));
        }
        Ok(proof)
    }
}

/// Stateless verifier for sparse Merkle digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseMerkleMap {
    pub mode: TreeMode,
}

impl SparseMerkleMap {
    pub fn new(mode: TreeMode) -> Self {
        Self { mode }
    }
}

impl AuthenticatedMap for SparseMerkleMap {
    type Proof = MapProof;

    fn lookup(
        &self,
        digest: &Digest,
        key: &Key,
        proof: &MapProof,
    ) -> Result<Option<Vec<u8>>, ProofError> {
        if proof.implied_root(key)? != *digest {
            return Err(ProofError::RootMismatch);
        }
        Ok(proof.value.clone())
    }

    fn update(
        &self,
        digest: &Digest,
        key: &Key,
        value: &[u8],
        proof: &MapProof,
    ) -> Result<Digest, ProofError> {
        let current = self.lookup(digest, key, proof)?;

        match (self.mode, current.is_some()) {
            (TreeMode::InsertOnly, true) => return Err(ProofError::KeyExists),
            (TreeMode::UpdateOnly, false) => return Err(ProofError::KeyMissing),
            _ => {}
        }

        proof.root_with_leaf(key, leaf_hash(key, value))
    }
}
