//! # Storage Module
//!
//! Encrypted local storage for identity key pairs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Device secret                                                         │
//! │         │                                                               │
//! │         └──► HKDF("keystone-storage-encryption-v1") ──► Storage Key     │
//! │                                                       │                 │
//! │                                                       ▼                 │
//! │                                            ┌──────────────────┐         │
//! │                                            │ KeyStore         │         │
//! │                                            │ name ──► record  │         │
//! │                                            └──────────────────┘         │
//! │                                                                         │
//! │  The cloud copy of a private key lives in Keyknox, encrypted under a   │
//! │  BrainKey-derived key. See the lifecycle module.                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod key_store;

pub use key_store::{IdentityKeyPair, KeyStore};
