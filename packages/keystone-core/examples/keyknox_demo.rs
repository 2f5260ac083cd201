//! # Keyknox Demo
//!
//! This example syncs encrypted keys through Keyknox:
//! 1. Push and pull a value with optimistic concurrency
//! 2. Watch a stale push get rejected
//! 3. Keep named entries in cloud key storage
//! 4. Back up a key under a password and change the password
//!
//! ## Run
//!
//! ```bash
//! cargo run --example keyknox_demo
//! ```

use std::sync::Arc;

use keystone_core::auth::{AccessToken, AccessTokenProvider, ConstAccessTokenProvider};
use keystone_core::brainkey::{
    BrainKey, LocalPythiaClient, ProofPolicy, SeedService, SeedServiceSecrets,
};
use keystone_core::crypto::KeyPair;
use keystone_core::keyknox::{
    CloudKeyStorage, KeyknoxManager, KeyknoxStore, MemoryKeyknoxClient,
};
use keystone_core::lifecycle::PasswordBackup;
use keystone_core::oprf::RistrettoOprf;
use keystone_core::Error;

#[tokio::main]
async fn main() -> keystone_core::Result<()> {
    println!("=================================================");
    println!("             KEYSTONE KEYKNOX DEMO");
    println!("=================================================\n");

    let store = Arc::new(KeyknoxStore::new());
    let tokens: Arc<dyn AccessTokenProvider> =
        Arc::new(ConstAccessTokenProvider::new(AccessToken::new("alice")));
    let key = KeyPair::generate();

    // =========================================================================
    // STEP 1: Push and pull
    // =========================================================================
    println!("1. Pushing a value...\n");

    let manager = KeyknoxManager::for_self(
        Arc::new(MemoryKeyknoxClient::new(store.clone())),
        tokens.clone(),
        key.clone(),
    );

    let pushed = manager.push_value(b"my private keys", None).await?;
    println!("   Version: {}", pushed.version);
    println!("   Hash:    {}", hex::encode(&pushed.keyknox_hash));

    let pulled = manager.pull_value().await?;
    println!("   Pulled:  {}", String::from_utf8_lossy(&pulled.value));
    println!();

    // =========================================================================
    // STEP 2: Stale push
    // =========================================================================
    println!("2. Two writers start from the same hash...\n");

    let winner = manager
        .push_value(b"first writer", Some(&pulled.keyknox_hash))
        .await?;
    println!("   First writer wins at {}", winner.version);

    match manager
        .push_value(b"second writer", Some(&pulled.keyknox_hash))
        .await
    {
        Err(Error::KeyknoxConflict) => println!("   Second writer rejected: stale hash"),
        other => println!("   Unexpected: {:?}", other.map(|v| v.version)),
    }
    manager.reset_value().await?;
    println!();

    // =========================================================================
    // STEP 3: Cloud key storage
    // =========================================================================
    println!("3. Storing named entries...\n");

    let cloud = CloudKeyStorage::new(KeyknoxManager::for_self(
        Arc::new(MemoryKeyknoxClient::new(store.clone())),
        tokens.clone(),
        key,
    ));
    cloud.store_entry("laptop", b"laptop key", None).await?;
    cloud.store_entry("phone", b"phone key", None).await?;

    for entry in cloud.retrieve_cloud_entries().await? {
        println!("   {} ({} bytes)", entry.name, entry.data.len());
    }
    if let Err(e) = cloud.store_entry("phone", b"again", None).await {
        println!("   Duplicate rejected: {}", e);
    }
    cloud.delete_all_entries().await?;
    println!();

    // =========================================================================
    // STEP 4: Password backup
    // =========================================================================
    println!("4. Backing up a key under a password...\n");

    let seeds = Arc::new(SeedService::new(
        Arc::new(RistrettoOprf::new()),
        &SeedServiceSecrets {
            key_id: b"demo-key".to_vec(),
            pythia_secret: b"demo pythia secret".to_vec(),
            scope_secret: b"demo scope".to_vec(),
        },
    )?);
    let brainkey = BrainKey::new(
        Arc::new(RistrettoOprf::new()),
        Arc::new(LocalPythiaClient::new(seeds.clone())),
        tokens.clone(),
        ProofPolicy::Verify {
            transformation_public_key: seeds.transformation_public_key().to_vec(),
        },
    );
    let backup = PasswordBackup::new(
        Arc::new(brainkey),
        Arc::new(MemoryKeyknoxClient::new(store)),
        tokens,
    );

    let identity_key = KeyPair::generate();
    backup
        .store_private_key("alice", &identity_key, "old password")
        .await?;
    backup
        .change_password("alice", "old password", "new password")
        .await?;

    let restored = backup.retrieve_private_key("alice", "new password").await?;
    println!(
        "   Restored with new password: {}",
        restored.public_keys() == identity_key.public_keys()
    );
    println!(
        "   Old password still works:   {}",
        backup
            .retrieve_private_key("alice", "old password")
            .await
            .is_ok()
    );
    println!();

    println!("=================================================");
    println!("                  DEMO COMPLETE");
    println!("=================================================");
    Ok(())
}
