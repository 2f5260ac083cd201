//! # Card Verification Demo
//!
//! This example walks through the card trust model:
//! 1. Publish a self-signed card and get it countersigned
//! 2. Verify it with the default policy
//! 3. Require an application signature through a whitelist
//! 4. Rotate the card and resolve the chain
//!
//! ## Run
//!
//! ```bash
//! cargo run --example card_verification_demo
//! ```

use std::sync::Arc;

use keystone_core::auth::{AccessToken, ConstAccessTokenProvider};
use keystone_core::cards::{
    Card, CardManager, CardRegistry, CardVerifier, LocalCardClient, ModelSigner,
    VerifierCredentials, VirgilCardVerifier, Whitelist,
};
use keystone_core::crypto::{KeyPair, SigningKeyPair};

#[tokio::main]
async fn main() -> keystone_core::Result<()> {
    println!("=================================================");
    println!("        KEYSTONE CARD VERIFICATION DEMO");
    println!("=================================================\n");

    let registry = Arc::new(CardRegistry::new(SigningKeyPair::generate()));
    let service_key = registry.service_public_key();
    let manager = CardManager::new(
        Arc::new(LocalCardClient::new(registry.clone())),
        Arc::new(VirgilCardVerifier::new(Some(service_key))),
        Arc::new(ConstAccessTokenProvider::new(AccessToken::new("alice"))),
    );

    // =========================================================================
    // STEP 1: Publish
    // =========================================================================
    println!("1. Publishing a card for alice...\n");

    let key = KeyPair::generate();
    let card = manager
        .publish_card(manager.generate_raw_card(&key, "alice", None)?)
        .await?;
    print_card(&card);

    // =========================================================================
    // STEP 2: Default policy
    // =========================================================================
    println!("2. Verifying with self + service signatures...\n");

    let default_policy = VirgilCardVerifier::new(Some(service_key));
    println!("   Verified: {}", default_policy.verify_card(&card));

    let wrong_service = VirgilCardVerifier::new(Some(SigningKeyPair::generate().public_bytes()));
    println!("   Verified against another service key: {}", wrong_service.verify_card(&card));
    println!();

    // =========================================================================
    // STEP 3: Whitelist
    // =========================================================================
    println!("3. Requiring a signature from \"my-app\"...\n");

    let app_key = SigningKeyPair::generate();
    let whitelist = Whitelist::new(vec![VerifierCredentials::new("my-app", app_key.public_bytes())])?;
    let strict = VirgilCardVerifier::new(Some(service_key)).with_whitelists(vec![whitelist]);
    println!("   Without app signature: {}", strict.verify_card(&card));

    let mut model = card.raw_card();
    ModelSigner::new().sign(&mut model, "my-app", &app_key, None)?;
    let signed = Card::parse(&model)?;
    println!("   With app signature:    {}", strict.verify_card(&signed));
    println!();

    // =========================================================================
    // STEP 4: Rotation
    // =========================================================================
    println!("4. Rotating alice's key...\n");

    let new_key = KeyPair::generate();
    let rotated = manager
        .publish_card(manager.generate_raw_card(&new_key, "alice", Some(&card.id))?)
        .await?;
    print_card(&rotated);

    let resolved = manager.search_cards("alice").await?;
    println!("   Current cards: {}", resolved.len());
    for head in resolved.heads() {
        let previous = resolved.previous_of(head);
        println!(
            "   {} replaces {}",
            head.id,
            previous.map(|c| c.id.as_str()).unwrap_or("nothing")
        );
        if let Some(previous) = previous {
            println!("   Previous outdated: {}", previous.is_outdated);
        }
    }
    println!();

    println!("=================================================");
    println!("                  DEMO COMPLETE");
    println!("=================================================");
    Ok(())
}

fn print_card(card: &Card) {
    println!("   Id:         {}", card.id);
    println!("   Identity:   {}", card.identity);
    println!("   Public key: {}", card.public_key.to_hex());
    println!(
        "   Signers:    {}",
        card.signatures
            .iter()
            .map(|s| s.signer.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();
}
