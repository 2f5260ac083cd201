//! Server state management.
//!
//! Holds the service half of each Keystone protocol. The seed service,
//! card registry and Keyknox store synchronize internally; the relay only
//! shares them.

use std::sync::Arc;

use dashmap::DashMap;
use keystone_core::brainkey::{SeedService, SeedServiceSecrets};
use keystone_core::cards::CardRegistry;
use keystone_core::crypto::SigningKeyPair;
use keystone_core::keyknox::KeyknoxStore;
use keystone_core::oprf::RistrettoOprf;

/// Default transformation key id.
pub const DEFAULT_PYTHIA_KEY_ID: &str = "keystone-default";

/// Default scope secret.
pub const DEFAULT_PYTHIA_SCOPE: &str = "keystone";

/// Server configuration.
#[derive(Clone)]
pub struct RelayConfig {
    pub port: u16,
    /// Human-readable region label (e.g. "US East", "EU West")
    pub region: String,
    /// Identifier of the transformation key
    pub pythia_key_id: String,
    /// Deployment secret for the transformation key
    pub pythia_secret: Vec<u8>,
    /// Scope secret for the transformation key
    pub pythia_scope_secret: Vec<u8>,
    /// Seed of the key that countersigns cards
    pub service_signing_seed: [u8; 32],
}

impl Default for RelayConfig {
    /// Random secrets; seeds and service signatures change on every start.
    fn default() -> Self {
        Self {
            port: 8080,
            region: "local".to_string(),
            pythia_key_id: DEFAULT_PYTHIA_KEY_ID.to_string(),
            pythia_secret: rand::random::<[u8; 32]>().to_vec(),
            pythia_scope_secret: DEFAULT_PYTHIA_SCOPE.as_bytes().to_vec(),
            service_signing_seed: rand::random(),
        }
    }
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("port", &self.port)
            .field("region", &self.region)
            .field("pythia_key_id", &self.pythia_key_id)
            .finish_non_exhaustive()
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct RelayState {
    /// Pythia transformation service.
    pub seeds: Arc<SeedService>,

    /// Published cards.
    pub cards: Arc<CardRegistry>,

    /// Keyknox values, one per caller.
    pub keyknox: Arc<KeyknoxStore>,

    /// Operation name → number of successful calls.
    pub stats: Arc<DashMap<&'static str, u64>>,

    /// Server configuration.
    pub config: Arc<RelayConfig>,
}

impl RelayState {
    /// Create a new relay state with the given configuration.
    pub fn new(config: RelayConfig) -> keystone_core::Result<Self> {
        let seeds = SeedService::new(
            Arc::new(RistrettoOprf::new()),
            &SeedServiceSecrets {
                key_id: config.pythia_key_id.as_bytes().to_vec(),
                pythia_secret: config.pythia_secret.clone(),
                scope_secret: config.pythia_scope_secret.clone(),
            },
        )?;
        let cards = CardRegistry::new(SigningKeyPair::from_bytes(&config.service_signing_seed));

        tracing::info!(
            service_key = hex::encode(cards.service_public_key()).as_str(),
            "Card service key ready"
        );

        Ok(Self {
            seeds: Arc::new(seeds),
            cards: Arc::new(cards),
            keyknox: Arc::new(KeyknoxStore::new()),
            stats: Arc::new(DashMap::new()),
            config: Arc::new(config),
        })
    }

    /// Count a successful operation.
    pub fn record(&self, operation: &'static str) {
        *self.stats.entry(operation).or_insert(0) += 1;
    }

    /// Successful calls of one operation so far.
    pub fn count(&self, operation: &'static str) -> u64 {
        self.stats.get(operation).map(|c| *c).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_fixed_secrets_is_stable() {
        let config = RelayConfig {
            pythia_secret: b"secret".to_vec(),
            service_signing_seed: [7; 32],
            ..RelayConfig::default()
        };

        let a = RelayState::new(config.clone()).unwrap();
        let b = RelayState::new(config).unwrap();

        assert_eq!(
            a.seeds.transformation_public_key(),
            b.seeds.transformation_public_key()
        );
        assert_eq!(a.cards.service_public_key(), b.cards.service_public_key());
    }

    #[test]
    fn test_stats() {
        let state = RelayState::new(RelayConfig::default()).unwrap();
        assert_eq!(state.count("keyknox.push"), 0);
        state.record("keyknox.push");
        state.record("keyknox.push");
        assert_eq!(state.count("keyknox.push"), 2);
    }

    #[test]
    fn test_empty_secret_rejected() {
        let config = RelayConfig {
            pythia_secret: Vec::new(),
            ..RelayConfig::default()
        };
        assert!(RelayState::new(config).is_err());
    }
}
