//! # Keyknox Envelope
//!
//! Sign-then-encrypt for one or more recipients.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         ENVELOPE LAYOUT                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  value = AES-256-GCM(content_key, data)                                │
//! │                                                                         │
//! │  meta  = bincode(EnvelopeHeader {                                      │
//! │            version,                                                    │
//! │            ephemeral_public,              X25519, fresh per envelope   │
//! │            recipients: [{ key_id,         SHA-512(pub)[0..8]           │
//! │                           nonce,                                       │
//! │                           wrapped_key }], AES-GCM(KEK, content_key)    │
//! │            data_nonce,                                                 │
//! │            params_nonce,                                               │
//! │            encrypted_params,              AES-GCM(content_key,         │
//! │          })                                 { signer_id, signature })  │
//! │                                                                         │
//! │  KEK = HKDF(X25519(ephemeral, recipient),                              │
//! │             salt = ephemeral_public ‖ key_id)                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Decryption checks run in a fixed order so callers can tell failures
//! apart: anything that prevents reading the plaintext is
//! [`Error::DecryptionFailed`], an unknown signer is
//! [`Error::SignerNotFound`], and a bad signature is
//! [`Error::VerificationFailed`].

use serde::{Deserialize, Serialize};

use super::{DecryptedKeyknoxValue, EncryptedKeyknoxValue};
use crate::crypto::{
    decrypt, derive_wrapping_key, encrypt, sign, verify_slice, EncryptionKey, EncryptionKeyPair,
    KeyIdentifier, KeyPair, Nonce, PublicKey,
};
use crate::error::{Error, Result};

/// Envelope format version
pub const ENVELOPE_VERSION: u8 = 1;

const DATA_AAD: &[u8] = b"keystone-keyknox-data";
const PARAMS_AAD: &[u8] = b"keystone-keyknox-params";

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeHeader {
    version: u8,
    ephemeral_public: [u8; 32],
    recipients: Vec<RecipientEntry>,
    data_nonce: [u8; 12],
    params_nonce: [u8; 12],
    encrypted_params: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecipientEntry {
    key_id: KeyIdentifier,
    nonce: [u8; 12],
    wrapped_key: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SignerParams {
    signer_id: KeyIdentifier,
    signature: Vec<u8>,
}

/// Encrypts and decrypts Keyknox values
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyknoxCrypto;

impl KeyknoxCrypto {
    /// Create the envelope codec
    pub fn new() -> Self {
        Self
    }

    /// Sign `data` with `private_key` and encrypt it for `public_keys`
    ///
    /// Returns `(meta, value)`.
    pub fn encrypt(
        &self,
        data: &[u8],
        private_key: &KeyPair,
        public_keys: &[PublicKey],
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        if public_keys.is_empty() {
            return Err(Error::EmptyPublicKeysList);
        }
        if data.is_empty() {
            return Err(Error::EmptyData);
        }

        let params = SignerParams {
            signer_id: private_key.key_identifier(),
            signature: sign(&private_key.signing, data).as_bytes().to_vec(),
        };
        seal(data, &params, public_keys)
    }

    /// Decrypt `encrypted` and verify its signer is among `public_keys`
    ///
    /// An empty meta and value decode to an empty result without any
    /// cryptography.
    pub fn decrypt(
        &self,
        encrypted: &EncryptedKeyknoxValue,
        private_key: &KeyPair,
        public_keys: &[PublicKey],
    ) -> Result<DecryptedKeyknoxValue> {
        if encrypted.meta.is_empty() && encrypted.value.is_empty() {
            return Ok(DecryptedKeyknoxValue {
                meta: Vec::new(),
                value: Vec::new(),
                version: encrypted.version,
                keyknox_hash: encrypted.keyknox_hash.clone(),
            });
        }

        let (data, params) = open(encrypted, private_key)?;

        let signer = public_keys
            .iter()
            .find(|pk| pk.key_identifier() == params.signer_id)
            .ok_or(Error::SignerNotFound)?;

        verify_slice(&signer.signing, &data, &params.signature)
            .map_err(|_| Error::VerificationFailed)?;

        Ok(DecryptedKeyknoxValue {
            meta: encrypted.meta.clone(),
            value: data,
            version: encrypted.version,
            keyknox_hash: encrypted.keyknox_hash.clone(),
        })
    }
}

fn seal(data: &[u8], params: &SignerParams, public_keys: &[PublicKey]) -> Result<(Vec<u8>, Vec<u8>)> {
    let params = bincode::serialize(params)?;

    let content_key = EncryptionKey::random();
    let (data_nonce, value) = encrypt(&content_key, data, DATA_AAD)?;
    let (params_nonce, encrypted_params) = encrypt(&content_key, &params, PARAMS_AAD)?;

    let ephemeral = EncryptionKeyPair::generate();
    let ephemeral_public = ephemeral.public_bytes();

    let recipients = public_keys
        .iter()
        .map(|recipient| {
            let key_id = recipient.key_identifier();
            let dh = ephemeral.diffie_hellman(&recipient.encryption);
            let kek = EncryptionKey::from_bytes(derive_wrapping_key(&dh, &ephemeral_public, &key_id)?);
            let (nonce, wrapped_key) = encrypt(&kek, content_key.as_bytes(), &key_id)?;
            Ok(RecipientEntry {
                key_id,
                nonce: *nonce.as_bytes(),
                wrapped_key,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let header = EnvelopeHeader {
        version: ENVELOPE_VERSION,
        ephemeral_public,
        recipients,
        data_nonce: *data_nonce.as_bytes(),
        params_nonce: *params_nonce.as_bytes(),
        encrypted_params,
    };

    Ok((bincode::serialize(&header)?, value))
}

fn open(encrypted: &EncryptedKeyknoxValue, private_key: &KeyPair) -> Result<(Vec<u8>, SignerParams)> {
    let failed = |what: &str| Error::DecryptionFailed(what.to_string());

    let header: EnvelopeHeader =
        bincode::deserialize(&encrypted.meta).map_err(|_| failed("malformed envelope header"))?;
    if header.version != ENVELOPE_VERSION {
        return Err(failed("unsupported envelope version"));
    }

    let my_id = private_key.key_identifier();
    let entry = header
        .recipients
        .iter()
        .find(|r| r.key_id == my_id)
        .ok_or_else(|| failed("not a recipient of this envelope"))?;

    let dh = private_key.encryption.diffie_hellman(&header.ephemeral_public);
    let kek = EncryptionKey::from_bytes(derive_wrapping_key(
        &dh,
        &header.ephemeral_public,
        &my_id,
    )?);
    let content_key = decrypt(&kek, &Nonce::from_bytes(entry.nonce), &entry.wrapped_key, &my_id)
        .map_err(|_| failed("content key unwrap failed"))?;
    let content_key = EncryptionKey::from_slice(&content_key)
        .map_err(|_| failed("content key has the wrong length"))?;

    let data = decrypt(
        &content_key,
        &Nonce::from_bytes(header.data_nonce),
        &encrypted.value,
        DATA_AAD,
    )
    .map_err(|_| failed("value authentication failed"))?;

    let params = decrypt(
        &content_key,
        &Nonce::from_bytes(header.params_nonce),
        &header.encrypted_params,
        PARAMS_AAD,
    )
    .map_err(|_| failed("parameter authentication failed"))?;
    let params: SignerParams =
        bincode::deserialize(&params).map_err(|_| failed("malformed signer parameters"))?;

    Ok((data, params))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyknox::KeyknoxVersion;

    fn wrap(meta: Vec<u8>, value: Vec<u8>) -> EncryptedKeyknoxValue {
        EncryptedKeyknoxValue {
            meta,
            value,
            version: KeyknoxVersion::INITIAL,
            keyknox_hash: vec![0; 32],
        }
    }

    #[test]
    fn test_round_trip_multiple_recipients() {
        let crypto = KeyknoxCrypto::new();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let recipients = [alice.public_keys(), bob.public_keys()];

        let (meta, value) = crypto.encrypt(b"secret keys", &alice, &recipients).unwrap();
        let encrypted = wrap(meta, value);

        let for_alice = crypto.decrypt(&encrypted, &alice, &recipients).unwrap();
        let for_bob = crypto
            .decrypt(&encrypted, &bob, &[alice.public_keys()])
            .unwrap();

        assert_eq!(for_alice.value, b"secret keys");
        assert_eq!(for_bob.value, b"secret keys");
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let crypto = KeyknoxCrypto::new();
        let kp = KeyPair::generate();

        assert!(matches!(
            crypto.encrypt(b"data", &kp, &[]),
            Err(Error::EmptyPublicKeysList)
        ));
        assert!(matches!(
            crypto.encrypt(b"", &kp, &[kp.public_keys()]),
            Err(Error::EmptyData)
        ));
    }

    #[test]
    fn test_empty_value_decrypts_without_crypto() {
        let crypto = KeyknoxCrypto::new();
        let kp = KeyPair::generate();

        let result = crypto
            .decrypt(&wrap(Vec::new(), Vec::new()), &kp, &[])
            .unwrap();
        assert!(result.meta.is_empty());
        assert!(result.value.is_empty());
        assert_eq!(result.version, KeyknoxVersion::INITIAL);
    }

    #[test]
    fn test_tampered_value_fails_decryption() {
        let crypto = KeyknoxCrypto::new();
        let kp = KeyPair::generate();
        let (meta, mut value) = crypto.encrypt(b"data", &kp, &[kp.public_keys()]).unwrap();
        value[0] ^= 1;

        let err = crypto
            .decrypt(&wrap(meta, value), &kp, &[kp.public_keys()])
            .unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed(_)));
    }

    #[test]
    fn test_tampered_meta_fails_decryption() {
        let crypto = KeyknoxCrypto::new();
        let kp = KeyPair::generate();
        let (mut meta, value) = crypto.encrypt(b"data", &kp, &[kp.public_keys()]).unwrap();
        let last = meta.len() - 1;
        meta[last] ^= 1;

        let err = crypto
            .decrypt(&wrap(meta, value), &kp, &[kp.public_keys()])
            .unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed(_)));
    }

    #[test]
    fn test_non_recipient_fails_decryption() {
        let crypto = KeyknoxCrypto::new();
        let alice = KeyPair::generate();
        let eve = KeyPair::generate();
        let (meta, value) = crypto
            .encrypt(b"data", &alice, &[alice.public_keys()])
            .unwrap();

        let err = crypto
            .decrypt(&wrap(meta, value), &eve, &[alice.public_keys()])
            .unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed(_)));
    }

    #[test]
    fn test_signer_not_found_distinct_from_bad_signature() {
        let crypto = KeyknoxCrypto::new();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        // Bob signs, Alice only trusts herself
        let (meta, value) = crypto
            .encrypt(b"data", &bob, &[alice.public_keys()])
            .unwrap();
        let err = crypto
            .decrypt(&wrap(meta, value), &alice, &[alice.public_keys()])
            .unwrap_err();
        assert!(matches!(err, Error::SignerNotFound));

        // Claims Alice as signer, carries Bob's signature
        let forged = SignerParams {
            signer_id: alice.key_identifier(),
            signature: sign(&bob.signing, b"data").as_bytes().to_vec(),
        };
        let (meta, value) = seal(b"data", &forged, &[alice.public_keys()]).unwrap();
        let err = crypto
            .decrypt(&wrap(meta, value), &alice, &[alice.public_keys()])
            .unwrap_err();
        assert!(matches!(err, Error::VerificationFailed));
    }

    #[test]
    fn test_envelopes_are_randomized() {
        let crypto = KeyknoxCrypto::new();
        let kp = KeyPair::generate();

        let (m1, v1) = crypto.encrypt(b"data", &kp, &[kp.public_keys()]).unwrap();
        let (m2, v2) = crypto.encrypt(b"data", &kp, &[kp.public_keys()]).unwrap();
        assert_ne!(m1, m2);
        assert_ne!(v1, v2);
    }
}
