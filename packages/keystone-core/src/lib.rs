//! # Keystone Core
//!
//! Password-hardened key derivation, signed identity cards and end-to-end
//! encrypted key backup.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        KEYSTONE CORE MODULES                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │                         Lifecycle                                 │ │
//! │  │   bootstrap · backup · restore · rotate · change password         │ │
//! │  └───────┬──────────────────────┬──────────────────────┬─────────────┘ │
//! │          │                      │                      │               │
//! │  ┌───────▼───────┐     ┌────────▼───────┐     ┌────────▼───────┐       │
//! │  │   BrainKey    │     │     Cards      │     │    Keyknox     │       │
//! │  │               │     │                │     │                │       │
//! │  │ - Blind       │     │ - Snapshot/id  │     │ - Envelope     │       │
//! │  │ - Transform   │     │ - Signatures   │     │ - Push/pull    │       │
//! │  │ - Proof check │     │ - Verifier     │     │ - Hash CAS     │       │
//! │  └───────┬───────┘     └────────┬───────┘     └────────┬───────┘       │
//! │          │                      │                      │               │
//! │  ┌───────▼───────┐     ┌────────▼──────────────────────▼───────┐       │
//! │  │     OPRF      │     │               Crypto                  │       │
//! │  │ Ristretto255  │     │ Ed25519 · X25519 · AES-GCM · HKDF     │       │
//! │  └───────────────┘     └───────────────────────────────────────┘       │
//! │                                                                         │
//! │  Storage: encrypted local key store   Auth: access token providers      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`crypto`] - Keys, signing, symmetric encryption, key derivation
//! - [`oprf`] - Blind / transform / deblind with proofs of correct transform
//! - [`brainkey`] - Key pairs from passwords via a transformation service
//! - [`cards`] - Signed identity documents and their verification
//! - [`keyknox`] - Encrypted blob sync and multi-entry cloud key storage
//! - [`storage`] - Encrypted local key store
//! - [`lifecycle`] - Bootstrap, backup, restore and rotation flows
//! - [`auth`] - Access tokens for the services
//! - [`config`] - Service endpoints and pinned keys
//!
//! Every component takes its collaborators in its constructor. There is no
//! global state.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod auth;
pub mod brainkey;
pub mod cards;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod keyknox;
pub mod lifecycle;
pub mod oprf;
pub mod storage;
/// Time helpers.
pub mod time;

mod http;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use auth::{AccessToken, AccessTokenProvider};
pub use brainkey::{BrainKey, ProofPolicy};
pub use cards::{Card, CardManager, CardVerifier, VirgilCardVerifier};
pub use config::ServiceConfig;
pub use crypto::{KeyPair, PublicKey};
pub use error::{Error, ErrorKind, Result};
pub use keyknox::{CloudKeyStorage, KeyknoxManager};
pub use lifecycle::{KeyLifecycle, PasswordBackup};
pub use storage::{IdentityKeyPair, KeyStore};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Keystone Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        #[cfg(target_os = "macos")]
        target: "macos",
        #[cfg(target_os = "linux")]
        target: "linux",
        #[cfg(target_os = "windows")]
        target: "windows",
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        target: "unknown",
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
        test_utils: cfg!(feature = "test-utils"),
    }
}

/// Build information for debugging
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Target OS
    pub target: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
    /// Whether the deterministic OPRF double is compiled in
    pub test_utils: bool,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = build_info();
        assert_eq!(info.version, version());
        assert!(matches!(info.profile, "debug" | "release"));
    }
}
