//! Prover-side sparse Merkle tree.
//!
//! Keeps every leaf and every non-empty internal node, so proofs are served
//! without recomputation. Empty subtrees are never stored.

use std::collections::{BTreeMap, HashMap};

use crate::hash::{
    DEPTH, EMPTY_LEAF, empty_root, goes_right, leaf_hash, node_hash, prefix, sibling_prefix,
};
use crate::proof::MapProof;
use crate::{Digest, Key};

#[derive(Debug, Clone)]
pub struct SparseMerkleTree {
    leaves: BTreeMap<Key, Vec<u8>>,
    /// (height, prefix) -> hash, for non-empty subtrees only
    nodes: HashMap<(u16, Key), Digest>,
    root: Digest,
}

impl Default for SparseMerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseMerkleTree {
    pub fn new() -> Self {
        Self {
            leaves: BTreeMap::new(),
            nodes: HashMap::new(),
            root: empty_root(DEPTH),
        }
    }

    /// Rebuild a tree from stored leaves.
    pub fn from_leaves<I>(leaves: I) -> Self
    where
        I: IntoIterator<Item = (Key, Vec<u8>)>,
    {
        let mut tree = Self::new();
        for (key, value) in leaves {
            tree.insert(key, value);
        }
        tree
    }

    pub fn root(&self) -> Digest {
        self.root
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<&[u8]> {
        self.leaves.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.leaves.contains_key(key)
    }

    /// Leaves in key order
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &[u8])> {
        self.leaves.iter().map(|(k, v)| (k, v.as_slice()))
    }

    fn node(&self, height: usize, prefix: &Key) -> Digest {
        self.nodes
            .get(&(height as u16, *prefix))
            .copied()
            .unwrap_or_else(|| empty_root(height))
    }

    /// Write `value` at `key`, returning the previous value.
    pub fn insert(&mut self, key: Key, value: Vec<u8>) -> Option<Vec<u8>> {
        let mut acc = leaf_hash(&key, &value);
        self.nodes.insert((0, key), acc);

        for h in 0..DEPTH {
            let sib = self.node(h, &sibling_prefix(&key, h));
            acc = if goes_right(&key, h) {
                node_hash(&sib, &acc)
            } else {
                node_hash(&acc, &sib)
            };
            self.nodes.insert(((h + 1) as u16, prefix(&key, h + 1)), acc);
        }

        self.root = acc;
        self.leaves.insert(key, value)
    }

    /// Membership proof for a present key, non-membership proof otherwise.
    pub fn prove(&self, key: &Key) -> MapProof {
        let mut proof = MapProof {
            value: self.leaves.get(key).cloned(),
            bitmap: [0u8; DEPTH / 8],
            siblings: Vec::new(),
        };

        for h in 0..DEPTH {
            let sib = self.node(h, &sibling_prefix(key, h));
            if sib != empty_root(h) {
                proof.set_sibling(h);
                proof.siblings.push(sib);
            }
        }

        debug_assert!(proof.value.is_some() || self.node(0, key) == EMPTY_LEAF);
        proof
    }
}
