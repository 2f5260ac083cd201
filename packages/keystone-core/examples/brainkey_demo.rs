//! # BrainKey Demo
//!
//! This example derives key pairs from passwords:
//! 1. Stand up an in-process transformation service, or use a running
//!    relay when `KEYSTONE_PYTHIA_URL` is set
//! 2. Derive a key pair with proof verification
//! 3. Show that the same password gives the same key
//! 4. Show that ids and passwords separate keys
//!
//! ## Run
//!
//! ```bash
//! cargo run --example brainkey_demo
//!
//! # Against a relay; pin its key from GET /info
//! KEYSTONE_PYTHIA_URL=http://localhost:8080 \
//! KEYSTONE_BRAINKEY_PUBLIC_KEY=<brainkey_public_key> \
//! cargo run --example brainkey_demo
//! ```

use std::sync::Arc;

use keystone_core::auth::{AccessToken, ConstAccessTokenProvider};
use keystone_core::brainkey::{
    BrainKey, HttpPythiaClient, LocalPythiaClient, ProofPolicy, PythiaClient, SeedService,
    SeedServiceSecrets,
};
use keystone_core::oprf::RistrettoOprf;
use keystone_core::ServiceConfig;

#[tokio::main]
async fn main() -> keystone_core::Result<()> {
    println!("=================================================");
    println!("            KEYSTONE BRAINKEY DEMO");
    println!("=================================================\n");

    // =========================================================================
    // STEP 1: Transformation service
    // =========================================================================
    let config = ServiceConfig::from_env()?;

    let (client, policy): (Arc<dyn PythiaClient>, ProofPolicy) =
        if std::env::var("KEYSTONE_PYTHIA_URL").is_ok() {
            println!("1. Using transformation service at {}...\n", config.pythia_url);
            (
                Arc::new(HttpPythiaClient::from_config(&config)),
                ProofPolicy::from_config(&config),
            )
        } else {
            println!("1. Starting transformation service...\n");
            let service = Arc::new(SeedService::new(
                Arc::new(RistrettoOprf::new()),
                &SeedServiceSecrets {
                    key_id: b"demo-key".to_vec(),
                    pythia_secret: b"demo pythia secret".to_vec(),
                    scope_secret: b"demo scope".to_vec(),
                },
            )?);
            let policy = ProofPolicy::Verify {
                transformation_public_key: service.transformation_public_key().to_vec(),
            };
            (Arc::new(LocalPythiaClient::new(service)), policy)
        };

    match &policy {
        ProofPolicy::Verify {
            transformation_public_key,
        } => println!(
            "   Transformation public key: {}",
            hex::encode(transformation_public_key)
        ),
        ProofPolicy::TrustChannel => println!("   Proofs disabled: no key pinned"),
    }
    println!();

    let brainkey = BrainKey::new(
        Arc::new(RistrettoOprf::new()),
        client,
        Arc::new(ConstAccessTokenProvider::new(AccessToken::new("alice"))),
        policy,
    );

    // =========================================================================
    // STEP 2: Derive
    // =========================================================================
    println!("2. Deriving key pair for \"correct horse\"...\n");

    let first = brainkey
        .generate_key_pair("correct horse", Some("alice"))
        .await?;
    println!("   Public key: {}", first.public_keys().to_hex());
    println!("   Key id:     {}", hex::encode(first.key_identifier()));
    println!();

    // =========================================================================
    // STEP 3: Determinism
    // =========================================================================
    println!("3. Deriving again with the same password...\n");

    let second = brainkey
        .generate_key_pair("correct horse", Some("alice"))
        .await?;
    println!(
        "   Same key: {}",
        first.public_keys() == second.public_keys()
    );
    println!();

    // =========================================================================
    // STEP 4: Separation
    // =========================================================================
    println!("4. Changing the password or the id...\n");

    let other_password = brainkey
        .generate_key_pair("battery staple", Some("alice"))
        .await?;
    let other_id = brainkey
        .generate_key_pair("correct horse", Some("bob"))
        .await?;
    println!(
        "   Different password, same key: {}",
        first.public_keys() == other_password.public_keys()
    );
    println!(
        "   Different id, same key:       {}",
        first.public_keys() == other_id.public_keys()
    );
    println!();

    println!("=================================================");
    println!("                  DEMO COMPLETE");
    println!("=================================================");
    Ok(())
}
