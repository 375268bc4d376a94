//! Schnorr signatures over secp256k1
//!
//! Signing with secret `s`, public key `P = g^s`:
//!
//! ```text
//! k  <- random nonzero scalar
//! A  = g^k
//! e  = H(A || msg || P) mod q        (H = SHA-256, big-endian)
//! z  = k + s*e mod q
//! ```
//!
//! Verification accepts iff `g^z == A * P^e`. The public key is bound into
//! the challenge, so a signature cannot be replayed under another key.
//!
//! Wire form is 65 bytes: `A` compressed (33) followed by `z` big-endian (32).

use std::fmt;

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{BigInteger, PrimeField, UniformRand, Zero};
use ark_std::rand::Rng;
use basis_pubkey::{Affine, Fr, PUBKEY_LEN, PublicKey, decode_point, encode_point};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const SCALAR_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = PUBKEY_LEN + SCALAR_LEN;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid signature length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Signature commitment is not a valid curve point")]
    MalformedCommitment,

    #[error("Signature response is not a canonical scalar")]
    MalformedResponse,

    #[error("Signature does not match message and key")]
    Mismatch,

    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

// ============================================================================
// Scalars
// ============================================================================

/// Big-endian 32-byte encoding of a scalar.
pub fn encode_scalar(s: &Fr) -> [u8; SCALAR_LEN] {
    let bytes = s.into_bigint().to_bytes_be();
    let mut out = [0u8; SCALAR_LEN];
    out[SCALAR_LEN - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// Decode a big-endian scalar, rejecting values >= q.
pub fn decode_scalar(bytes: &[u8; SCALAR_LEN]) -> Option<Fr> {
    let s = Fr::from_be_bytes_mod_order(bytes);
    (encode_scalar(&s) == *bytes).then_some(s)
}

/// Fiat-Shamir challenge `e = SHA256(A || msg || P) mod q`.
pub fn challenge(commitment: &[u8; PUBKEY_LEN], msg: &[u8], public_key: &PublicKey) -> Fr {
    let mut hasher = Sha256::new();
    hasher.update(commitment);
    hasher.update(msg);
    hasher.update(public_key.as_bytes());
    Fr::from_be_bytes_mod_order(&hasher.finalize())
}

// ============================================================================
// Signature
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signature {
    /// Commitment point `A`, compressed
    pub a: [u8; PUBKEY_LEN],
    /// Response scalar `z`, big-endian
    pub z: [u8; SCALAR_LEN],
}

impl Signature {
    pub const LEN: usize = SIGNATURE_LEN;

    /// Split a 65-byte signature. Only the length is checked here; the
    /// point and scalar are validated during verification.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(SignatureError::InvalidLength {
                expected: SIGNATURE_LEN,
                got: bytes.len(),
            });
        }

        let mut a = [0u8; PUBKEY_LEN];
        let mut z = [0u8; SCALAR_LEN];
        a.copy_from_slice(&bytes[..PUBKEY_LEN]);
        z.copy_from_slice(&bytes[PUBKEY_LEN..]);
        Ok(Self { a, z })
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        let mut out = [0u8; SIGNATURE_LEN];
        out[..PUBKEY_LEN].copy_from_slice(&self.a);
        out[PUBKEY_LEN..].copy_from_slice(&self.z);
        out
    }

    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes =
            hex::decode(s.trim()).map_err(|e| SignatureError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", &self.to_hex()[..16])
    }
}

impl TryFrom<String> for Signature {
    type Error = SignatureError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<Signature> for String {
    fn from(sig: Signature) -> Self {
        sig.to_hex()
    }
}

// ============================================================================
// Sign / Verify
// ============================================================================

/// Sign `msg` with `secret`. `public_key` must be `g^secret`.
pub fn sign<R: Rng>(secret: &Fr, public_key: &PublicKey, msg: &[u8], rng: &mut R) -> Signature {
    loop {
        let k = Fr::rand(rng);
        if k.is_zero() {
            continue;
        }

        let commitment = (Affine::generator() * k).into_affine();
        // k != 0 and the group has prime order, so A is never the identity
        let Some(a) = encode_point(&commitment) else {
            continue;
        };

        let e = challenge(&a, msg, public_key);
        let z = k + *secret * e;
        return Signature {
            a,
            z: encode_scalar(&z),
        };
    }
}

/// Check a signature, reporting why it failed.
pub fn try_verify(
    msg: &[u8],
    public_key: &PublicKey,
    signature: &Signature,
) -> Result<(), SignatureError> {
    let commitment =
        decode_point(&signature.a).map_err(|_| SignatureError::MalformedCommitment)?;
    let z = decode_scalar(&signature.z).ok_or(SignatureError::MalformedResponse)?;
    let e = challenge(&signature.a, msg, public_key);

    // g^z == A * P^e
    let lhs = (Affine::generator() * z).into_affine();
    let rhs = (*public_key.point() * e + commitment).into_affine();

    if lhs == rhs {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Accept iff the signature is well-formed and `g^z == A * P^e`.
pub fn verify(msg: &[u8], public_key: &PublicKey, signature: &Signature) -> bool {
    try_verify(msg, public_key, signature).is_ok()
}
