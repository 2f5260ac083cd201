//! Adds signatures to raw card models.

use super::model::{CardSignature, RawSignedModel};
use crate::crypto::{sign, SigningKeyPair};
use crate::error::{Error, Result};

/// Signer id of the card owner
pub const SELF_SIGNER: &str = "self";

/// Signer id of the card service
pub const VIRGIL_SIGNER: &str = "virgil";

/// Appends signatures over `content_snapshot ‖ additional_data`
#[derive(Debug, Default, Clone, Copy)]
pub struct ModelSigner;

impl ModelSigner {
    /// Create a signer
    pub fn new() -> Self {
        Self
    }

    /// Sign `model` as `signer`
    ///
    /// Fails with [`Error::EmptySigner`] or [`Error::DuplicateSigner`]
    /// without touching the model.
    pub fn sign(
        &self,
        model: &mut RawSignedModel,
        signer: &str,
        key: &SigningKeyPair,
        additional_data: Option<Vec<u8>>,
    ) -> Result<()> {
        if signer.is_empty() {
            return Err(Error::EmptySigner);
        }
        if model.signature_by(signer).is_some() {
            return Err(Error::DuplicateSigner(signer.to_string()));
        }

        let mut signature = CardSignature {
            signer: signer.to_string(),
            signature: Vec::new(),
            snapshot: additional_data,
        };
        let data = signature.signed_data(&model.content_snapshot);
        signature.signature = sign(key, &data).as_bytes().to_vec();

        model.signatures.push(signature);
        Ok(())
    }

    /// Sign `model` as its owner
    pub fn self_sign(
        &self,
        model: &mut RawSignedModel,
        key: &SigningKeyPair,
        additional_data: Option<Vec<u8>>,
    ) -> Result<()> {
        self.sign(model, SELF_SIGNER, key, additional_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{verify_slice, KeyPair};

    #[test]
    fn test_self_sign_verifies() {
        let kp = KeyPair::generate();
        let mut model = RawSignedModel::new(b"snapshot".to_vec());

        ModelSigner::new()
            .self_sign(&mut model, &kp.signing, Some(b"extra".to_vec()))
            .unwrap();

        let sig = model.signature_by(SELF_SIGNER).unwrap();
        assert!(verify_slice(
            &kp.signing.public_bytes(),
            b"snapshotextra",
            &sig.signature
        )
        .is_ok());
    }

    #[test]
    fn test_duplicate_signer_rejected() {
        let kp = KeyPair::generate();
        let signer = ModelSigner::new();
        let mut model = RawSignedModel::new(b"snapshot".to_vec());

        signer.sign(&mut model, "app", &kp.signing, None).unwrap();
        let err = signer.sign(&mut model, "app", &kp.signing, None).unwrap_err();

        assert!(matches!(err, Error::DuplicateSigner(_)));
        assert_eq!(model.signatures.len(), 1);
    }

    #[test]
    fn test_empty_signer_rejected() {
        let kp = KeyPair::generate();
        let mut model = RawSignedModel::new(b"snapshot".to_vec());

        let err = ModelSigner::new()
            .sign(&mut model, "", &kp.signing, None)
            .unwrap_err();
        assert!(matches!(err, Error::EmptySigner));
    }
}
