//! Node hashing for the 256-level sparse Merkle tree.
//!
//! Heights count up from the leaves: height 0 is a leaf, height 256 the root.

use std::sync::OnceLock;

use crate::{Digest, Key};

pub const DEPTH: usize = 256;

/// Digest of an unoccupied leaf slot
pub const EMPTY_LEAF: Digest = [0u8; 32];

const LEAF_TAG: u8 = 0x00;
const NODE_TAG: u8 = 0x01;

static EMPTY_ROOTS: OnceLock<Vec<Digest>> = OnceLock::new();

/// blake3(0x00 || key || value)
pub fn leaf_hash(key: &Key, value: &[u8]) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_TAG]);
    hasher.update(key);
    hasher.update(value);
    *hasher.finalize().as_bytes()
}

/// blake3(0x01 || left || right)
pub fn node_hash(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_TAG]);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

fn empty_roots() -> &'static [Digest] {
    EMPTY_ROOTS.get_or_init(|| {
        let mut roots = Vec::with_capacity(DEPTH + 1);
        roots.push(EMPTY_LEAF);
        for h in 0..DEPTH {
            let below = roots[h];
            roots.push(node_hash(&below, &below));
        }
        roots
    })
}

/// Root of an empty subtree of the given height. `empty_root(DEPTH)` is the
/// digest of an empty map.
pub fn empty_root(height: usize) -> Digest {
    empty_roots()[height]
}

/// Direction taken at `height` on the way down to `key`: true = right.
pub(crate) fn goes_right(key: &Key, height: usize) -> bool {
    let depth = DEPTH - 1 - height;
    (key[depth / 8] >> (7 - depth % 8)) & 1 == 1
}

/// Key with the lowest `height` bits cleared; names the subtree at `height`
/// containing `key`.
pub(crate) fn prefix(key: &Key, height: usize) -> Key {
    let mut out = *key;
    for h in 0..height {
        let depth = DEPTH - 1 - h;
        out[depth / 8] &= !(1 << (7 - depth % 8));
    }
    out
}

/// Prefix of the sibling subtree at `height`.
pub(crate) fn sibling_prefix(key: &Key, height: usize) -> Key {
    let mut out = prefix(key, height);
    let depth = DEPTH - 1 - height;
    out[depth / 8] ^= 1 << (7 - depth % 8);
    out
}

/// Fold a leaf digest up to the root, pulling siblings from `sibling`.
pub(crate) fn fold_path<F>(key: &Key, leaf: Digest, mut sibling: F) -> Digest
where
    F: FnMut(usize) -> Digest,
{
    let mut acc = leaf;
    for h in 0..DEPTH {
        let sib = sibling(h);
        acc = if goes_right(key, h) {
            node_hash(&sib, &acc)
        } else {
            node_hash(&acc, &sib)
        };
    }
    acc
}
