//! Basis public keys
//!
//! Every participant (debtor, creditor, reserve owner, tracker) is identified
//! by a secp256k1 point, carried on the wire in SEC1 compressed form:
//!
//! ```text
//! ┌────────┬──────────────────────────────────┐
//! │ prefix │        x (32 bytes, BE)          │
//! │ 02/03  │                                  │
//! └────────┴──────────────────────────────────┘
//!   prefix = 0x02 when y is even, 0x03 when y is odd
//! ```
//!
//! A [`PairKey`] is the ledger lookup key for one debtor -> creditor
//! relationship: `SHA256(debtor || creditor)`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use ark_ec::AffineRepr;
use ark_ff::{BigInteger, PrimeField};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use ark_secp256k1::{Affine, Fq, Fr, Projective};

/// Length of a compressed public key
pub const PUBKEY_LEN: usize = 33;

const PREFIX_EVEN: u8 = 0x02;
const PREFIX_ODD: u8 = 0x03;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("invalid point prefix: 0x{0:02x}")]
    InvalidPrefix(u8),

    #[error("x coordinate is not a canonical field element")]
    NonCanonical,

    #[error("point is not on the curve")]
    NotOnCurve,

    #[error("the identity point cannot be used as a key")]
    Identity,

    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

// ============================================================================
// Point codec
// ============================================================================

/// Encode a curve point in SEC1 compressed form.
///
/// Returns `None` for the identity, which has no compressed encoding.
pub fn encode_point(point: &Affine) -> Option<[u8; PUBKEY_LEN]> {
    if point.is_zero() {
        return None;
    }

    let x = point.x.into_bigint().to_bytes_be();
    let mut out = [0u8; PUBKEY_LEN];
    out[0] = if point.y.into_bigint().is_odd() {
        PREFIX_ODD
    } else {
        PREFIX_EVEN
    };
    out[PUBKEY_LEN - x.len()..].copy_from_slice(&x);
    Some(out)
}

/// Decode a SEC1 compressed point.
///
/// Rejects wrong lengths, unknown prefixes, non-canonical x coordinates and
/// x values with no matching point.
pub fn decode_point(bytes: &[u8]) -> Result<Affine, KeyError> {
    if bytes.len() != PUBKEY_LEN {
        return Err(KeyError::InvalidLength {
            expected: PUBKEY_LEN,
            got: bytes.len(),
        });
    }

    let want_odd = match bytes[0] {
        PREFIX_EVEN => false,
        PREFIX_ODD => true,
        other => return Err(KeyError::InvalidPrefix(other)),
    };

    let x_bytes = &bytes[1..];
    let x = Fq::from_be_bytes_mod_order(x_bytes);
    if x.into_bigint().to_bytes_be().as_slice() != x_bytes {
        return Err(KeyError::NonCanonical);
    }

    let point = Affine::get_point_from_x_unchecked(x, false).ok_or(KeyError::NotOnCurve)?;
    let point = if point.y.into_bigint().is_odd() == want_odd {
        point
    } else {
        -point
    };

    // secp256k1 has cofactor 1, so being on the curve is enough
    if !point.is_on_curve() {
        return Err(KeyError::NotOnCurve);
    }

    Ok(point)
}

// ============================================================================
// Public Key
// ============================================================================

/// A validated secp256k1 public key.
///
/// Holds both the compressed bytes and the decoded point, so callers never
/// pay for decompression twice.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey {
    bytes: [u8; PUBKEY_LEN],
    point: Affine,
}

impl PublicKey {
    pub const LEN: usize = PUBKEY_LEN;

    /// Parse and validate a compressed key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let point = decode_point(bytes)?;
        let mut arr = [0u8; PUBKEY_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr, point })
    }

    pub fn from_point(point: &Affine) -> Result<Self, KeyError> {
        let bytes = encode_point(point).ok_or(KeyError::Identity)?;
        Ok(Self {
            bytes,
            point: *point,
        })
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_LEN] {
        &self.bytes
    }

    pub fn point(&self) -> &Affine {
        &self.point
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PublicKey {}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for PublicKey {
    type Error = KeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_hex()
    }
}

// ============================================================================
// Pair Key
// ============================================================================

/// Directional ledger key for a debtor -> creditor obligation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey(pub [u8; 32]);

impl PairKey {
    /// Formula: SHA256( debtor_pk_bytes || creditor_pk_bytes )
    pub fn derive(debtor: &PublicKey, creditor: &PublicKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(debtor.as_bytes());
        hasher.update(creditor.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for PairKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PairKey({})", hex::encode(&self.0[..8]))
    }
}
