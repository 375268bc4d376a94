use std::fmt;

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{UniformRand, Zero};
use ark_std::rand::Rng;
use basis_pubkey::{Affine, Fr, KeyError, PublicKey};
use basis_signature::{Signature, decode_scalar, encode_scalar};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeypairError {
    #[error("secret key must be 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("secret key is not a canonical nonzero scalar")]
    InvalidSecret,

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// A participant's signing key.
/// The secret scalar never leaves this struct except through `secret_bytes`.
#[derive(Clone)]
pub struct Keypair {
    secret: Fr,
    public: PublicKey,
}

impl Keypair {
    /// Generates a fresh random key from the OS rng.
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    pub fn generate_with<R: Rng>(rng: &mut R) -> Self {
        loop {
            let secret = Fr::rand(rng);
            if let Ok(kp) = Self::from_secret(secret) {
                return kp;
            }
        }
    }

    fn from_secret(secret: Fr) -> Result<Self, KeypairError> {
        if secret.is_zero() {
            return Err(KeypairError::InvalidSecret);
        }
        let point = (Affine::generator() * secret).into_affine();
        let public = PublicKey::from_point(&point)?;
        Ok(Self { secret, public })
    }

    /// Rebuild a key from its 32-byte big-endian secret.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, KeypairError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeypairError::InvalidLength(bytes.len()))?;
        let secret = decode_scalar(&arr).ok_or(KeypairError::InvalidSecret)?;
        Self::from_secret(secret)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeypairError> {
        let bytes = hex::decode(s.trim()).map_err(|e| KeypairError::InvalidHex(e.to_string()))?;
        Self::from_secret_bytes(&bytes)
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        encode_scalar(&self.secret)
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn sign(&self, msg: &[u8]) -> Signature {
        self.sign_with(msg, &mut OsRng)
    }

    pub fn sign_with<R: Rng>(&self, msg: &[u8], rng: &mut R) -> Signature {
        basis_signature::sign(&self.secret, &self.public, msg, rng)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
