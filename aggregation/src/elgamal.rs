//! Lifted ElGamal over the BN254 G1 group.
//!
//! `Enc(m) = (rG, mG + rPK)`. Ciphertexts add component-wise, so the sum of ciphertexts decrypts
//! to `(Σm)G`; the scalar is then recovered with a bounded discrete log (see [`crate::dlog`]).

use std::ops::{Add, AddAssign};

use ark_bn254::{Fr, G1Affine, G1Projective};
use ark_ec::{CurveGroup, PrimeGroup};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::{UniformRand, Zero};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AggregationError;

/// Compressed size of one G1 point.
const POINT_BYTES: usize = 32;

fn encoding(e: impl std::fmt::Display) -> AggregationError {
    AggregationError::Encoding(e.to_string())
}

fn point_to_bytes(p: &G1Projective, out: &mut Vec<u8>) -> Result<(), AggregationError> {
    p.into_affine().serialize_compressed(out).map_err(encoding)
}

fn point_from_bytes(bytes: &[u8]) -> Result<G1Projective, AggregationError> {
    // Validating decode: rejects points off the curve or outside the prime-order subgroup.
    let p = G1Affine::deserialize_compressed(bytes).map_err(encoding)?;
    Ok(p.into())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(G1Affine);

impl PublicKey {
    pub fn to_bytes(&self) -> Result<Vec<u8>, AggregationError> {
        let mut out = Vec::with_capacity(POINT_BYTES);
        self.0.serialize_compressed(&mut out).map_err(encoding)?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AggregationError> {
        let p = G1Affine::deserialize_compressed(bytes).map_err(encoding)?;
        if p == G1Affine::identity() {
            return Err(AggregationError::Encoding("public key is the identity".into()));
        }
        Ok(Self(p))
    }

    pub fn to_hex(&self) -> Result<String, AggregationError> {
        Ok(hex::encode(self.to_bytes()?))
    }

    pub fn from_hex(s: &str) -> Result<Self, AggregationError> {
        Self::from_bytes(&hex::decode(s).map_err(encoding)?)
    }

    /// Short stable identifier: first 16 bytes of BLAKE3 over the compressed key.
    pub fn key_id(&self) -> Result<String, AggregationError> {
        let hash = blake3::hash(&self.to_bytes()?);
        Ok(hex::encode(&hash.as_bytes()[..16]))
    }

    pub fn encrypt<R: RngCore + CryptoRng>(&self, m: u32, rng: &mut R) -> Ciphertext {
        let r = Fr::rand(rng);
        let g = G1Projective::generator();
        Ciphertext {
            c1: g * r,
            c2: g * Fr::from(m) + self.0 * r,
        }
    }
}

pub struct SecretKey(Fr);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

impl SecretKey {
    /// `c2 - sk·c1 = mG`.
    pub fn decrypt_point(&self, ct: &Ciphertext) -> G1Projective {
        ct.c2 - ct.c1 * self.0
    }
}

/// An aggregation keypair. The secret half never leaves the engine that owns it.
#[derive(Debug)]
pub struct Keypair {
    pub public: PublicKey,
    secret: SecretKey,
}

impl Keypair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let sk = Fr::rand(rng);
            if !sk.is_zero() {
                return Self::from_scalar(sk);
            }
        }
    }

    fn from_scalar(sk: Fr) -> Self {
        let public = PublicKey((G1Projective::generator() * sk).into_affine());
        Self { public, secret: SecretKey(sk) }
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn secret_to_bytes(&self) -> Result<Vec<u8>, AggregationError> {
        let mut out = Vec::with_capacity(32);
        self.secret.0.serialize_compressed(&mut out).map_err(encoding)?;
        Ok(out)
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, AggregationError> {
        let sk = Fr::deserialize_compressed(bytes).map_err(encoding)?;
        if sk.is_zero() {
            return Err(AggregationError::Encoding("secret key is zero".into()));
        }
        Ok(Self::from_scalar(sk))
    }
}

/// One lifted-ElGamal ciphertext. Serialized as hex of `compress(c1) || compress(c2)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ciphertext {
    c1: G1Projective,
    c2: G1Projective,
}

impl Ciphertext {
    /// Encryption of zero with zero randomness; the neutral element of `+`.
    pub fn zero() -> Self {
        Self { c1: G1Projective::zero(), c2: G1Projective::zero() }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, AggregationError> {
        let mut out = Vec::with_capacity(2 * POINT_BYTES);
        point_to_bytes(&self.c1, &mut out)?;
        point_to_bytes(&self.c2, &mut out)?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AggregationError> {
        if bytes.len() != 2 * POINT_BYTES {
            return Err(AggregationError::Encoding(format!(
                "ciphertext must be {} bytes, got {}",
                2 * POINT_BYTES,
                bytes.len()
            )));
        }
        let (c1, c2) = bytes.split_at(POINT_BYTES);
        Ok(Self { c1: point_from_bytes(c1)?, c2: point_from_bytes(c2)? })
    }

    pub fn to_hex(&self) -> Result<String, AggregationError> {
        Ok(hex::encode(self.to_bytes()?))
    }

    pub fn from_hex(s: &str) -> Result<Self, AggregationError> {
        Self::from_bytes(&hex::decode(s).map_err(encoding)?)
    }
}

impl Add for Ciphertext {
    type Output = Ciphertext;

    fn add(self, rhs: Self) -> Self::Output {
        Self { c1: self.c1 + rhs.c1, c2: self.c2 + rhs.c2 }
    }
}

impl AddAssign<&Ciphertext> for Ciphertext {
    fn add_assign(&mut self, rhs: &Ciphertext) {
        self.c1 += rhs.c1;
        self.c2 += rhs.c2;
    }
}

impl Serialize for Ciphertext {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let hex = self.to_hex().map_err(serde::ser::Error::custom)?;
        s.serialize_str(&hex)
    }
}

impl<'de> Deserialize<'de> for Ciphertext {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ciphertext::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
