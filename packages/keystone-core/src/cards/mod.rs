//! # Cards
//!
//! Self-describing identity documents. A card binds an identity to a public
//! key and carries signatures from its owner, from the card service and from
//! any application signers.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              CARD                                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  content_snapshot (JSON bytes)                                         │
//! │  { identity, public_key, previous_card_id?, version, created_at }      │
//! │           │                                                             │
//! │           ├──► id = hex(SHA-512(snapshot)[0..32])                      │
//! │           │                                                             │
//! │           └──► signatures[]                                            │
//! │                 "self"    Ed25519(owner,   snapshot ‖ extra?)          │
//! │                 "virgil"  Ed25519(service, snapshot ‖ extra?)          │
//! │                 "<app>"   Ed25519(app,     snapshot ‖ extra?)          │
//! │                                                                         │
//! │  Rotation: a new card names the old one in previous_card_id; the old   │
//! │  card becomes outdated.                                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`CardManager`] is the client side: it generates and publishes cards and
//! only ever returns cards its [`CardVerifier`] accepted. [`CardRegistry`] is
//! the service side.

mod client;
mod manager;
mod model;
mod registry;
mod signer;
mod verifier;

pub use client::{CardClient, HttpCardClient, LocalCardClient, SearchRequest, CARDS_PATH, SUPERSEEDED_HEADER};
pub use manager::{CardManager, ResolvedCards};
pub use model::{card_id, Card, CardSignature, RawCardContent, RawSignedModel, CARD_VERSION};
pub use registry::{CardLookup, CardRegistry};
pub use signer::{ModelSigner, SELF_SIGNER, VIRGIL_SIGNER};
pub use verifier::{
    AcceptAllVerifier, CardVerifier, VerifierCredentials, VirgilCardVerifier, Whitelist,
};
