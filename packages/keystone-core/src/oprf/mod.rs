//! # Oblivious Pseudo-Random Function
//!
//! The capability BrainKey is built on. A client blinds a password, a remote
//! service transforms the blinded value under its secret key, and the client
//! removes the blinding. The service never sees the password; the client never
//! learns the key.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          OPRF ROUND TRIP                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  CLIENT                                 TRANSFORMATION SERVICE          │
//! │                                                                         │
//! │  blind(pw)                                                             │
//! │    → (blinded, secret)                                                 │
//! │            │                                                            │
//! │            └──── blinded, tweak ───────►  transform(blinded, tweak, sk)│
//! │                                             → (transformed, t)         │
//! │                                           prove(transformed, blinded,  │
//! │                                                 t, sk, pk)             │
//! │            ┌──── transformed, proof ◄───── → (c, u)                    │
//! │            │                                                            │
//! │  verify(transformed, blinded, tweak, pk, c, u)                         │
//! │  deblind(transformed, secret)                                          │
//! │    → PRF(pw, tweak, sk)                                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The deblinded output is a fixed function of `(password, tweak, sk)` no
//! matter which blinding was used. Every internal failure surfaces as
//! [`Error::CryptoFailure`](crate::Error::CryptoFailure).

mod ristretto;

pub use ristretto::RistrettoOprf;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encoding::base64_bytes;
use crate::error::Result;

/// Secret scalar that removes the blinding from a transformed password.
///
/// Consumed once by [`Oprf::deblind`] and zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BlindingSecret(Vec<u8>);

impl BlindingSecret {
    /// Wrap raw secret bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw secret bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for BlindingSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BlindingSecret(..)")
    }
}

/// Output of [`Oprf::blind`]
#[derive(Debug, Clone)]
pub struct BlindResult {
    /// Value sent to the transformation service
    pub blinded_password: Vec<u8>,
    /// Kept locally until the transformed value comes back
    pub blinding_secret: BlindingSecret,
}

/// Transformation key pair derived from the service's secrets
#[derive(Clone, ZeroizeOnDrop)]
pub struct TransformationKeyPair {
    /// Secret transformation key
    pub private_key: Vec<u8>,
    /// Public key clients use to verify proofs
    #[zeroize(skip)]
    pub public_key: Vec<u8>,
}

impl std::fmt::Debug for TransformationKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformationKeyPair")
            .field("public_key", &hex::encode(&self.public_key))
            .finish_non_exhaustive()
    }
}

/// Output of [`Oprf::transform`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    /// The blinded password under the transformation key
    pub transformed_password: Vec<u8>,
    /// The tweak hashed to a scalar, needed for the proof
    pub transformed_tweak: Vec<u8>,
}

/// Proof that a transform used the key behind a published public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfCorrectTransform {
    /// Challenge scalar
    #[serde(with = "base64_bytes")]
    pub value_c: Vec<u8>,
    /// Response scalar
    #[serde(with = "base64_bytes")]
    pub value_u: Vec<u8>,
}

/// The five OPRF operations
///
/// Implementations are pure functions over byte strings. Only `blind` (and
/// the nonce inside `prove`) may be randomized.
pub trait Oprf: Send + Sync {
    /// Blind a password
    fn blind(&self, password: &[u8]) -> Result<BlindResult>;

    /// Remove the blinding from a transformed password
    ///
    /// A secret from a different `blind` call yields an unrelated value,
    /// not an error.
    fn deblind(&self, transformed_password: &[u8], blinding_secret: &BlindingSecret)
        -> Result<Vec<u8>>;

    /// Derive the transformation key pair for a key id
    fn compute_transformation_key_pair(
        &self,
        transformation_key_id: &[u8],
        pythia_secret: &[u8],
        pythia_scope_secret: &[u8],
    ) -> Result<TransformationKeyPair>;

    /// Apply the transformation key to a blinded password under a tweak
    fn transform(
        &self,
        blinded_password: &[u8],
        tweak: &[u8],
        transformation_private_key: &[u8],
    ) -> Result<TransformResult>;

    /// Prove that `transformed_password` was produced with `key_pair`
    fn prove(
        &self,
        transformed_password: &[u8],
        blinded_password: &[u8],
        transformed_tweak: &[u8],
        key_pair: &TransformationKeyPair,
    ) -> Result<ProofOfCorrectTransform>;

    /// Check a proof of correct transform
    ///
    /// `Ok(false)` means the proof is well formed but does not hold.
    fn verify(
        &self,
        transformed_password: &[u8],
        blinded_password: &[u8],
        tweak: &[u8],
        transformation_public_key: &[u8],
        proof: &ProofOfCorrectTransform,
    ) -> Result<bool>;
}

// ============================================================================
// DETERMINISTIC DOUBLE
// ============================================================================

/// OPRF whose blinding is derived from the password
///
/// Same group and math as [`RistrettoOprf`], so outputs are interchangeable,
/// but `blind` is reproducible. Never use it outside tests: it leaks equality
/// of passwords to the transformation service.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct DeterministicOprf {
    inner: RistrettoOprf,
}

#[cfg(any(test, feature = "test-utils"))]
impl DeterministicOprf {
    /// Create the double
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Oprf for DeterministicOprf {
    fn blind(&self, password: &[u8]) -> Result<BlindResult> {
        let r = ristretto::hash_to_scalar(b"keystone-oprf-test-blind-v1", password);
        ristretto::blind_with(password, r)
    }

    fn deblind(
        &self,
        transformed_password: &[u8],
        blinding_secret: &BlindingSecret,
    ) -> Result<Vec<u8>> {
        self.inner.deblind(transformed_password, blinding_secret)
    }

    fn compute_transformation_key_pair(
        &self,
        transformation_key_id: &[u8],
        pythia_secret: &[u8],
        pythia_scope_secret: &[u8],
    ) -> Result<TransformationKeyPair> {
        self.inner.compute_transformation_key_pair(
            transformation_key_id,
            pythia_secret,
            pythia_scope_secret,
        )
    }

    fn transform(
        &self,
        blinded_password: &[u8],
        tweak: &[u8],
        transformation_private_key: &[u8],
    ) -> Result<TransformResult> {
        self.inner
            .transform(blinded_password, tweak, transformation_private_key)
    }

    fn prove(
        &self,
        transformed_password: &[u8],
        blinded_password: &[u8],
        transformed_tweak: &[u8],
        key_pair: &TransformationKeyPair,
    ) -> Result<ProofOfCorrectTransform> {
        self.inner
            .prove(transformed_password, blinded_password, transformed_tweak, key_pair)
    }

    fn verify(
        &self,
        transformed_password: &[u8],
        blinded_password: &[u8],
        tweak: &[u8],
        transformation_public_key: &[u8],
        proof: &ProofOfCorrectTransform,
    ) -> Result<bool> {
        self.inner.verify(
            transformed_password,
            blinded_password,
            tweak,
            transformation_public_key,
            proof,
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_blind_reproducible() {
        let oprf = DeterministicOprf::new();

        let a = oprf.blind(b"password").unwrap();
        let b = oprf.blind(b"password").unwrap();
        let c = oprf.blind(b"other").unwrap();

        assert_eq!(a.blinded_password, b.blinded_password);
        assert_ne!(a.blinded_password, c.blinded_password);
    }

    #[test]
    fn test_double_matches_real_output() {
        let real = RistrettoOprf::new();
        let double = DeterministicOprf::new();
        let kp = real
            .compute_transformation_key_pair(b"key-1", b"secret", b"scope")
            .unwrap();

        let run = |oprf: &dyn Oprf| {
            let blinded = oprf.blind(b"hunter2").unwrap();
            let t = oprf
                .transform(&blinded.blinded_password, b"alice", &kp.private_key)
                .unwrap();
            oprf.deblind(&t.transformed_password, &blinded.blinding_secret)
                .unwrap()
        };

        assert_eq!(run(&real), run(&double));
    }

    #[test]
    fn test_proof_json_shape() {
        let proof = ProofOfCorrectTransform {
            value_c: vec![1, 2, 3],
            value_u: vec![4, 5, 6],
        };

        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["value_c"], "AQID");
        assert_eq!(json["value_u"], "BAUG");
    }

    #[test]
    fn test_blinding_secret_debug_redacted() {
        let secret = BlindingSecret::from_bytes(vec![9; 32]);
        assert_eq!(format!("{:?}", secret), "BlindingSecret(..)");
    }
}
