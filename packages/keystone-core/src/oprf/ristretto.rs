//! OPRF over the Ristretto255 group.
//!
//! ```text
//! P   = map(SHA-512("keystone-oprf-input-v1" ‖ pw))       password point
//! B   = r·P                                                blinded password
//! k   = HKDF-SHA512(pythiaSecret, scopeSecret, keyId)      transformation key
//! pk  = k·G
//! t   = H("keystone-oprf-tweak-v1" ‖ tweak)                transformed tweak
//! s   = k + t                                              tweaked key
//! pk_t = pk + t·G = s·G
//! Y   = s⁻¹·B                                              transformed password
//! out = r⁻¹·Y = s⁻¹·P                                      deblinded value
//! ```
//!
//! The tweak enters the key before inversion, so outputs under two tweaks
//! differ by the unknown factor `(k + t₁)/(k + t₂)` and cannot be related
//! without `k`. The proof is a Chaum-Pedersen proof that
//! `log_G(pk_t) = log_Y(B)`. The identity point is never accepted as input.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha512};

use super::{
    BlindResult, BlindingSecret, Oprf, ProofOfCorrectTransform, TransformResult,
    TransformationKeyPair,
};
use crate::error::{Error, Result};

const INPUT_DOMAIN: &[u8] = b"keystone-oprf-input-v1";
const TWEAK_DOMAIN: &[u8] = b"keystone-oprf-tweak-v1";
const PROOF_DOMAIN: &[u8] = b"keystone-oprf-proof-v1";

/// Production OPRF backend
#[derive(Debug, Default, Clone, Copy)]
pub struct RistrettoOprf;

impl RistrettoOprf {
    /// Create the backend
    pub fn new() -> Self {
        Self
    }
}

impl Oprf for RistrettoOprf {
    fn blind(&self, password: &[u8]) -> Result<BlindResult> {
        blind_with(password, random_scalar())
    }

    fn deblind(
        &self,
        transformed_password: &[u8],
        blinding_secret: &BlindingSecret,
    ) -> Result<Vec<u8>> {
        let y = decode_point(transformed_password, "transformed password")?;
        let r = decode_scalar(blinding_secret.as_bytes(), "blinding secret")?;
        if r == Scalar::ZERO {
            return Err(Error::CryptoFailure("zero blinding secret".into()));
        }

        Ok((r.invert() * y).compress().to_bytes().to_vec())
    }

    fn compute_transformation_key_pair(
        &self,
        transformation_key_id: &[u8],
        pythia_secret: &[u8],
        pythia_scope_secret: &[u8],
    ) -> Result<TransformationKeyPair> {
        let hkdf = Hkdf::<Sha512>::new(Some(pythia_scope_secret), pythia_secret);
        let mut wide = [0u8; 64];
        hkdf.expand(transformation_key_id, &mut wide)
            .map_err(|_| Error::CryptoFailure("transformation key expansion failed".into()))?;

        let k = Scalar::from_bytes_mod_order_wide(&wide);
        if k == Scalar::ZERO {
            return Err(Error::CryptoFailure("degenerate transformation key".into()));
        }
        let pk = k * RISTRETTO_BASEPOINT_POINT;

        Ok(TransformationKeyPair {
            private_key: k.to_bytes().to_vec(),
            public_key: pk.compress().to_bytes().to_vec(),
        })
    }

    fn transform(
        &self,
        blinded_password: &[u8],
        tweak: &[u8],
        transformation_private_key: &[u8],
    ) -> Result<TransformResult> {
        let b = decode_point(blinded_password, "blinded password")?;
        let k = decode_scalar(transformation_private_key, "transformation key")?;

        let t = hash_to_scalar(TWEAK_DOMAIN, tweak);
        let y = tweaked_key(k, t)?.invert() * b;

        Ok(TransformResult {
            transformed_password: y.compress().to_bytes().to_vec(),
            transformed_tweak: t.to_bytes().to_vec(),
        })
    }

    fn prove(
        &self,
        transformed_password: &[u8],
        blinded_password: &[u8],
        transformed_tweak: &[u8],
        key_pair: &TransformationKeyPair,
    ) -> Result<ProofOfCorrectTransform> {
        let y = decode_point(transformed_password, "transformed password")?;
        let b = decode_point(blinded_password, "blinded password")?;
        let t = decode_scalar(transformed_tweak, "transformed tweak")?;
        let k = decode_scalar(&key_pair.private_key, "transformation key")?;

        let s = tweaked_key(k, t)?;
        let pk_t = s * RISTRETTO_BASEPOINT_POINT;

        let v = random_scalar();
        let a1 = v * RISTRETTO_BASEPOINT_POINT;
        let a2 = v * y;

        let c = challenge(&pk_t, &b, &y, &a1, &a2);
        let u = v - c * s;

        Ok(ProofOfCorrectTransform {
            value_c: c.to_bytes().to_vec(),
            value_u: u.to_bytes().to_vec(),
        })
    }

    fn verify(
        &self,
        transformed_password: &[u8],
        blinded_password: &[u8],
        tweak: &[u8],
        transformation_public_key: &[u8],
        proof: &ProofOfCorrectTransform,
    ) -> Result<bool> {
        let y = decode_point(transformed_password, "transformed password")?;
        let b = decode_point(blinded_password, "blinded password")?;
        let pk = decode_point(transformation_public_key, "transformation public key")?;
        let c = decode_scalar(&proof.value_c, "proof challenge")?;
        let u = decode_scalar(&proof.value_u, "proof response")?;

        let pk_t = pk + hash_to_scalar(TWEAK_DOMAIN, tweak) * RISTRETTO_BASEPOINT_POINT;

        // A1 = u·G + c·pk_t = v·G and A2 = u·Y + c·B = v·Y when B = s·Y
        let a1 = u * RISTRETTO_BASEPOINT_POINT + c * pk_t;
        let a2 = u * y + c * b;

        Ok(challenge(&pk_t, &b, &y, &a1, &a2) == c)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

pub(super) fn blind_with(password: &[u8], r: Scalar) -> Result<BlindResult> {
    if r == Scalar::ZERO {
        return Err(Error::CryptoFailure("zero blinding scalar".into()));
    }

    let blinded = r * password_point(password);

    Ok(BlindResult {
        blinded_password: blinded.compress().to_bytes().to_vec(),
        blinding_secret: BlindingSecret::from_bytes(r.to_bytes().to_vec()),
    })
}

pub(super) fn hash_to_scalar(domain: &[u8], input: &[u8]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(domain);
    hasher.update(input);
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&hasher.finalize());
    Scalar::from_bytes_mod_order_wide(&wide)
}

fn tweaked_key(k: Scalar, t: Scalar) -> Result<Scalar> {
    let s = k + t;
    if s == Scalar::ZERO {
        return Err(Error::CryptoFailure("degenerate tweaked key".into()));
    }
    Ok(s)
}

fn password_point(password: &[u8]) -> RistrettoPoint {
    let mut hasher = Sha512::new();
    hasher.update(INPUT_DOMAIN);
    hasher.update(password);
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&hasher.finalize());
    RistrettoPoint::from_uniform_bytes(&wide)
}

fn random_scalar() -> Scalar {
    let mut wide = [0u8; 64];
    rand::rngs::OsRng.fill_bytes(&mut wide);
    Scalar::from_bytes_mod_order_wide(&wide)
}

fn challenge(
    pk_t: &RistrettoPoint,
    b: &RistrettoPoint,
    y: &RistrettoPoint,
    a1: &RistrettoPoint,
    a2: &RistrettoPoint,
) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(PROOF_DOMAIN);
    for point in [&RISTRETTO_BASEPOINT_POINT, pk_t, b, y, a1, a2] {
        hasher.update(point.compress().as_bytes());
    }
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&hasher.finalize());
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// Decode a group element, rejecting the identity
///
/// An identity seed would deblind to the same value for every password.
fn decode_point(bytes: &[u8], what: &str) -> Result<RistrettoPoint> {
    let point = CompressedRistretto::from_slice(bytes)
        .ok()
        .and_then(|c| c.decompress())
        .ok_or_else(|| Error::CryptoFailure(format!("invalid {} encoding", what)))?;

    if point == RistrettoPoint::identity() {
        return Err(Error::CryptoFailure(format!("{} is the identity", what)));
    }
    Ok(point)
}

fn decode_scalar(bytes: &[u8], what: &str) -> Result<Scalar> {
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::CryptoFailure(format!("invalid {} length", what)))?;
    Option::from(Scalar::from_canonical_bytes(bytes))
        .ok_or_else(|| Error::CryptoFailure(format!("non-canonical {}", what)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key_pair(oprf: &RistrettoOprf, id: &[u8]) -> TransformationKeyPair {
        oprf.compute_transformation_key_pair(id, b"pythia-secret", b"scope-secret")
            .unwrap()
    }

    fn evaluate(oprf: &RistrettoOprf, pw: &[u8], tweak: &[u8], kp: &TransformationKeyPair) -> Vec<u8> {
        let blinded = oprf.blind(pw).unwrap();
        let t = oprf
            .transform(&blinded.blinded_password, tweak, &kp.private_key)
            .unwrap();
        oprf.deblind(&t.transformed_password, &blinded.blinding_secret)
            .unwrap()
    }

    #[test]
    fn test_round_trip_stable_across_blindings() {
        let oprf = RistrettoOprf::new();
        let kp = key_pair(&oprf, b"brainkey");

        let first = oprf.blind(b"correct horse").unwrap();
        let second = oprf.blind(b"correct horse").unwrap();
        assert_ne!(first.blinded_password, second.blinded_password);

        assert_eq!(
            evaluate(&oprf, b"correct horse", b"alice", &kp),
            evaluate(&oprf, b"correct horse", b"alice", &kp)
        );
    }

    #[test]
    fn test_tweak_and_password_separation() {
        let oprf = RistrettoOprf::new();
        let kp = key_pair(&oprf, b"brainkey");

        let base = evaluate(&oprf, b"pw", b"alice", &kp);
        assert_ne!(base, evaluate(&oprf, b"pw", b"bob", &kp));
        assert_ne!(base, evaluate(&oprf, b"pw2", b"alice", &kp));
    }

    #[test]
    fn test_outputs_not_related_by_public_tweak_ratio() {
        let oprf = RistrettoOprf::new();
        let kp = key_pair(&oprf, b"brainkey");

        let decode = |bytes: Vec<u8>| decode_point(&bytes, "output").unwrap();
        let alice = decode(evaluate(&oprf, b"hunter2", b"alice", &kp));
        let bob = decode(evaluate(&oprf, b"hunter2", b"bob", &kp));

        let t_alice = hash_to_scalar(TWEAK_DOMAIN, b"alice");
        let t_bob = hash_to_scalar(TWEAK_DOMAIN, b"bob");

        assert_ne!((t_bob * t_alice.invert()) * alice, bob);
        assert_ne!((t_alice * t_bob.invert()) * alice, bob);
        assert_ne!(alice, bob);
    }

    #[test]
    fn test_identity_point_rejected() {
        let oprf = RistrettoOprf::new();
        let kp = key_pair(&oprf, b"brainkey");
        let identity = RistrettoPoint::identity().compress().to_bytes();
        let blinded = oprf.blind(b"pw").unwrap();

        let err = oprf
            .deblind(&identity, &blinded.blinding_secret)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CryptoFailure);

        let err = oprf.transform(&identity, b"", &kp.private_key).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CryptoFailure);
    }

    #[test]
    fn test_key_pair_deterministic() {
        let oprf = RistrettoOprf::new();

        let a = key_pair(&oprf, b"k1");
        let b = key_pair(&oprf, b"k1");
        let c = key_pair(&oprf, b"k2");

        assert_eq!(a.private_key, b.private_key);
        assert_eq!(a.public_key, b.public_key);
        assert_ne!(a.public_key, c.public_key);
    }

    #[test]
    fn test_mismatched_blinding_gives_garbage() {
        let oprf = RistrettoOprf::new();
        let kp = key_pair(&oprf, b"brainkey");

        let first = oprf.blind(b"pw").unwrap();
        let other = oprf.blind(b"pw").unwrap();
        let t = oprf
            .transform(&first.blinded_password, b"", &kp.private_key)
            .unwrap();

        let wrong = oprf
            .deblind(&t.transformed_password, &other.blinding_secret)
            .unwrap();
        assert_ne!(wrong, evaluate(&oprf, b"pw", b"", &kp));
    }

    #[test]
    fn test_proof_verifies() {
        let oprf = RistrettoOprf::new();
        let kp = key_pair(&oprf, b"brainkey");
        let blinded = oprf.blind(b"pw").unwrap();
        let t = oprf
            .transform(&blinded.blinded_password, b"alice", &kp.private_key)
            .unwrap();

        let proof = oprf
            .prove(
                &t.transformed_password,
                &blinded.blinded_password,
                &t.transformed_tweak,
                &kp,
            )
            .unwrap();

        assert!(oprf
            .verify(
                &t.transformed_password,
                &blinded.blinded_password,
                b"alice",
                &kp.public_key,
                &proof
            )
            .unwrap());
    }

    #[test]
    fn test_proof_rejects_wrong_key_and_forgery() {
        let oprf = RistrettoOprf::new();
        let kp = key_pair(&oprf, b"brainkey");
        let other = key_pair(&oprf, b"other");
        let blinded = oprf.blind(b"pw").unwrap();
        let t = oprf
            .transform(&blinded.blinded_password, b"alice", &kp.private_key)
            .unwrap();
        let proof = oprf
            .prove(
                &t.transformed_password,
                &blinded.blinded_password,
                &t.transformed_tweak,
                &kp,
            )
            .unwrap();

        // Wrong public key
        assert!(!oprf
            .verify(
                &t.transformed_password,
                &blinded.blinded_password,
                b"alice",
                &other.public_key,
                &proof
            )
            .unwrap());

        // Wrong tweak
        assert!(!oprf
            .verify(
                &t.transformed_password,
                &blinded.blinded_password,
                b"bob",
                &kp.public_key,
                &proof
            )
            .unwrap());

        // Transform under a different key, proof from the real one
        let forged = oprf
            .transform(&blinded.blinded_password, b"alice", &other.private_key)
            .unwrap();
        assert!(!oprf
            .verify(
                &forged.transformed_password,
                &blinded.blinded_password,
                b"alice",
                &kp.public_key,
                &proof
            )
            .unwrap());
    }

    #[test]
    fn test_malformed_inputs_are_crypto_failures() {
        let oprf = RistrettoOprf::new();
        let kp = key_pair(&oprf, b"brainkey");

        let err = oprf.transform(&[0xffu8; 32], b"", &kp.private_key).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CryptoFailure);

        let err = oprf
            .deblind(&[1u8; 5], &BlindingSecret::from_bytes(vec![1; 32]))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CryptoFailure);

        let bad_proof = ProofOfCorrectTransform {
            value_c: vec![0xff; 32],
            value_u: vec![0; 32],
        };
        let blinded = oprf.blind(b"pw").unwrap();
        let result = oprf.verify(
            &blinded.blinded_password,
            &blinded.blinded_password,
            b"",
            &kp.public_key,
            &bad_proof,
        );
        assert!(result.is_err());
    }
}
