//! # Error Handling
//!
//! This module provides the error types for Keystone Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Crypto Errors (CryptoFailure)                                     │
//! │  │   ├── CryptoFailure         - Opaque primitive failed               │
//! │  │   ├── EncryptionFailed      - Envelope/AEAD encryption failed       │
//! │  │   ├── DecryptionFailed      - Envelope/AEAD decryption failed       │
//! │  │   ├── InvalidKey            - Invalid key format/length             │
//! │  │   └── KeyDerivationFailed   - HKDF expansion failed                 │
//! │  │                                                                      │
//! │  ├── Input Errors (MalformedInput)                                     │
//! │  │   ├── EmptyPassword         - Password must not be empty            │
//! │  │   ├── EmptyData             - Data to encrypt must not be empty     │
//! │  │   ├── EmptyPublicKeysList   - No envelope recipients                │
//! │  │   ├── EmptySigner           - Signer identifier is empty            │
//! │  │   ├── DuplicateSigner       - Signer already present                │
//! │  │   ├── InvalidInput          - Any other caller error                │
//! │  │   └── InvalidConfig         - Unusable configuration value          │
//! │  │                                                                      │
//! │  ├── Trust Errors (TrustViolation)                                     │
//! │  │   ├── VerificationFailed    - Signature verification failed         │
//! │  │   ├── SignerNotFound        - Envelope signer not trusted           │
//! │  │   ├── ProofMissing          - Transform came without a proof        │
//! │  │   ├── ProofVerificationFailed - Transform proof rejected            │
//! │  │   ├── CardVerificationFailed - Card rejected by verifier            │
//! │  │   └── CardMismatch          - Service returned a different card     │
//! │  │                                                                      │
//! │  ├── Conflict Errors (ConcurrencyConflict)                             │
//! │  │   └── KeyknoxConflict       - Stale previous hash on push           │
//! │  │                                                                      │
//! │  ├── Protocol Errors (ProtocolViolation)                               │
//! │  │   ├── InvalidPreviousHashHeader - Response lacks hash header        │
//! │  │   ├── InvalidUrl            - Malformed endpoint URL                │
//! │  │   └── ProtocolError         - Unexpected response shape             │
//! │  │                                                                      │
//! │  ├── Transport Errors (collaborator)                                   │
//! │  │   ├── TransportError        - Request could not be sent             │
//! │  │   ├── ServiceError          - Service answered with an error        │
//! │  │   └── Unauthorized          - Missing or rejected token             │
//! │  │                                                                      │
//! │  ├── Card / Cloud / Lifecycle Errors                                   │
//! │  │   ├── CardNotFound          - No such card                          │
//! │  │   ├── EntryNotFound         - No such cloud entry                   │
//! │  │   ├── EntryAlreadyExists    - Cloud entry name taken                │
//! │  │   ├── KeyNotFound           - No local key for identity             │
//! │  │   ├── KeyAlreadyExists      - Local key already present             │
//! │  │   ├── IdentityNotPublished  - Card not accepted yet                 │
//! │  │   └── BackupIdentityMismatch - Backup belongs to another identity   │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      ├── SerializationError    - Encoding failed                       │
//! │      └── DeserializationError  - Decoding failed                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation
//!
//! Cryptographic and trust failures are never retried here. Card verification
//! degrades to a boolean inside the verifier; the card manager turns a `false`
//! into [`Error::CardVerificationFailed`] so an untrusted card never reaches a
//! caller as if it were valid.

use thiserror::Error;

/// Result type alias for Keystone Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An opaque cryptographic primitive failed
    CryptoFailure,
    /// Caller error, rejected before any network or crypto work
    MalformedInput,
    /// Signature, signer or proof could not be trusted
    TrustViolation,
    /// Optimistic concurrency check failed on the server
    ConcurrencyConflict,
    /// Client and server disagree about the wire protocol
    ProtocolViolation,
    /// The network collaborator failed
    Transport,
    /// Local or cloud storage lookups
    Storage,
    /// Serialization and other internal failures
    Internal,
}

/// Main error type for Keystone Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Crypto Errors (100-199)
    // ========================================================================
    /// An opaque cryptographic primitive failed
    #[error("Crypto failure: {0}")]
    CryptoFailure(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Invalid key format or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    // ========================================================================
    // Input Errors (200-299)
    // ========================================================================
    /// Password is empty
    #[error("Password must not be empty.")]
    EmptyPassword,

    /// Data to encrypt is empty
    #[error("Data must not be empty.")]
    EmptyData,

    /// No recipients for an envelope
    #[error("Public keys list must not be empty.")]
    EmptyPublicKeysList,

    /// Signer identifier is empty
    #[error("Signer identifier must not be empty.")]
    EmptySigner,

    /// Signer appears twice on one model or whitelist
    #[error("Duplicate signer: {0}")]
    DuplicateSigner(String),

    /// Any other malformed argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration value present but unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Trust Errors (300-399)
    // ========================================================================
    /// Signature verification failed
    #[error("Signature verification failed")]
    VerificationFailed,

    /// Envelope signer is not among the trusted public keys
    #[error("Signer not found among trusted public keys.")]
    SignerNotFound,

    /// Transform response lacked a proof the policy requires
    #[error("Transformation proof missing from seed response.")]
    ProofMissing,

    /// Transform proof did not verify
    #[error("Transformation proof verification failed.")]
    ProofVerificationFailed,

    /// Card did not pass the verifier
    #[error("Card verification failed: {0}")]
    CardVerificationFailed(String),

    /// Service returned a card different from the one requested
    #[error("Card mismatch: {0}")]
    CardMismatch(String),

    // ========================================================================
    // Conflict Errors (400-499)
    // ========================================================================
    /// Stale previous hash on push
    #[error("Keyknox value was modified concurrently; pull and retry.")]
    KeyknoxConflict,

    // ========================================================================
    // Protocol Errors (500-599)
    // ========================================================================
    /// Response did not carry the keyknox hash header
    #[error("Response is missing a valid keyknox hash header.")]
    InvalidPreviousHashHeader,

    /// Endpoint URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Unexpected response shape
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    // ========================================================================
    // Transport Errors (600-699)
    // ========================================================================
    /// Request could not be sent or the response could not be read
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Service answered with a non-success status
    #[error("Service error ({status}): {message}")]
    ServiceError {
        /// HTTP status code
        status: u16,
        /// Service message
        message: String,
    },

    /// Missing or rejected access token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // ========================================================================
    // Card / Cloud / Lifecycle Errors (700-799)
    // ========================================================================
    /// Card not found
    #[error("Card not found: {0}")]
    CardNotFound(String),

    /// Cloud entry not found
    #[error("Cloud entry not found: {0}")]
    EntryNotFound(String),

    /// Cloud entry already exists
    #[error("Cloud entry already exists: {0}")]
    EntryAlreadyExists(String),

    /// No local key pair for an identity
    #[error("No key found for identity: {0}")]
    KeyNotFound(String),

    /// A local key pair already exists for an identity
    #[error("A key already exists for identity: {0}")]
    KeyAlreadyExists(String),

    /// The identity's card has not been accepted by the card service
    #[error("Identity has not been published: {0}")]
    IdentityNotPublished(String),

    /// Storage read or write failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A decrypted backup names a different identity than the one asked for
    #[error("Backup for {found} was found where {expected} was expected")]
    BackupIdentityMismatch {
        /// Identity whose backup was requested
        expected: String,
        /// Identity recorded inside the backup
        found: String,
    },

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================
    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Crypto
    /// - 200-299: Input
    /// - 300-399: Trust
    /// - 400-499: Conflict
    /// - 500-599: Protocol
    /// - 600-699: Transport
    /// - 700-799: Cards, cloud entries, lifecycle
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::CryptoFailure(_) => 100,
            Error::EncryptionFailed(_) => 101,
            Error::DecryptionFailed(_) => 102,
            Error::InvalidKey(_) => 103,
            Error::KeyDerivationFailed(_) => 104,

            Error::EmptyPassword => 200,
            Error::EmptyData => 201,
            Error::EmptyPublicKeysList => 202,
            Error::EmptySigner => 203,
            Error::DuplicateSigner(_) => 204,
            Error::InvalidInput(_) => 205,
            Error::InvalidConfig(_) => 206,

            Error::VerificationFailed => 300,
            Error::SignerNotFound => 301,
            Error::ProofMissing => 302,
            Error::ProofVerificationFailed => 303,
            Error::CardVerificationFailed(_) => 304,
            Error::CardMismatch(_) => 305,

            Error::KeyknoxConflict => 400,

            Error::InvalidPreviousHashHeader => 500,
            Error::InvalidUrl(_) => 501,
            Error::ProtocolError(_) => 502,

            Error::TransportError(_) => 600,
            Error::ServiceError { .. } => 601,
            Error::Unauthorized(_) => 602,

            Error::CardNotFound(_) => 700,
            Error::EntryNotFound(_) => 701,
            Error::EntryAlreadyExists(_) => 702,
            Error::KeyNotFound(_) => 703,
            Error::KeyAlreadyExists(_) => 704,
            Error::IdentityNotPublished(_) => 705,
            Error::StorageError(_) => 706,
            Error::BackupIdentityMismatch { .. } => 707,

            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
            Error::DeserializationError(_) => 902,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CryptoFailure(_)
            | Error::EncryptionFailed(_)
            | Error::DecryptionFailed(_)
            | Error::InvalidKey(_)
            | Error::KeyDerivationFailed(_) => ErrorKind::CryptoFailure,

            Error::EmptyPassword
            | Error::EmptyData
            | Error::EmptyPublicKeysList
            | Error::EmptySigner
            | Error::DuplicateSigner(_)
            | Error::InvalidInput(_)
            | Error::InvalidConfig(_) => ErrorKind::MalformedInput,

            Error::VerificationFailed
            | Error::SignerNotFound
            | Error::ProofMissing
            | Error::ProofVerificationFailed
            | Error::CardVerificationFailed(_)
            | Error::CardMismatch(_) => ErrorKind::TrustViolation,

            Error::KeyknoxConflict => ErrorKind::ConcurrencyConflict,

            Error::InvalidPreviousHashHeader | Error::InvalidUrl(_) | Error::ProtocolError(_) => {
                ErrorKind::ProtocolViolation
            }

            Error::TransportError(_) | Error::ServiceError { .. } | Error::Unauthorized(_) => {
                ErrorKind::Transport
            }

            Error::CardNotFound(_)
            | Error::EntryNotFound(_)
            | Error::EntryAlreadyExists(_)
            | Error::KeyNotFound(_)
            | Error::KeyAlreadyExists(_)
            | Error::IdentityNotPublished(_)
            | Error::StorageError(_)
            | Error::BackupIdentityMismatch { .. } => ErrorKind::Storage,

            Error::Internal(_) | Error::SerializationError(_) | Error::DeserializationError(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Check if this error is recoverable
    ///
    /// A conflict is resolved by pulling the fresh value and pushing again;
    /// transport failures may succeed on a later attempt. Nothing here is
    /// retried automatically.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::KeyknoxConflict | Error::TransportError(_)
        ) || matches!(self, Error::ServiceError { status, .. } if *status >= 500)
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::DeserializationError(format!("Invalid base64: {}", err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::TransportError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::CryptoFailure("test".into()).code(), 100);
        assert_eq!(Error::EmptyPassword.code(), 200);
        assert_eq!(Error::VerificationFailed.code(), 300);
        assert_eq!(Error::KeyknoxConflict.code(), 400);
        assert_eq!(Error::InvalidPreviousHashHeader.code(), 500);
        assert_eq!(Error::TransportError("test".into()).code(), 600);
        assert_eq!(Error::CardNotFound("id".into()).code(), 700);
        assert_eq!(Error::InvalidConfig("key".into()).code(), 206);
        assert_eq!(
            Error::BackupIdentityMismatch {
                expected: "alice".into(),
                found: "bob".into()
            }
            .code(),
            707
        );
        assert_eq!(Error::Internal("test".into()).code(), 900);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::EmptyPublicKeysList.kind(), ErrorKind::MalformedInput);
        assert_eq!(Error::SignerNotFound.kind(), ErrorKind::TrustViolation);
        assert_eq!(Error::ProofVerificationFailed.kind(), ErrorKind::TrustViolation);
        assert_eq!(Error::KeyknoxConflict.kind(), ErrorKind::ConcurrencyConflict);
        assert_eq!(
            Error::InvalidPreviousHashHeader.kind(),
            ErrorKind::ProtocolViolation
        );
        assert_eq!(
            Error::DecryptionFailed("tag".into()).kind(),
            ErrorKind::CryptoFailure
        );
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::KeyknoxConflict.is_recoverable());
        assert!(Error::TransportError("reset".into()).is_recoverable());
        assert!(Error::ServiceError {
            status: 503,
            message: "busy".into()
        }
        .is_recoverable());
        assert!(!Error::ServiceError {
            status: 400,
            message: "bad".into()
        }
        .is_recoverable());
        assert!(!Error::VerificationFailed.is_recoverable());
        assert!(!Error::InvalidPreviousHashHeader.is_recoverable());
    }
}
